//! The client's narrow view of the server intake contract (§4.4, §6), wrapped the
//! way `wallet::daemon_api::DaemonAPI` wraps its RPC endpoint behind a small
//! `call`-shaped surface rather than exposing the transport to callers.

use async_trait::async_trait;
use blob_common::Usd;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    pub user_id: String,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub epochs: u32,
    pub folder_id: Option<String>,
    pub payment_amount: Option<Usd>,
    pub quote_id: Option<String>,
    pub client_side_encrypted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub file_id: String,
    pub temp_blob_id: String,
    pub staged_key: String,
    pub upload_mode: String,
}

/// Result of a single POST attempt: either a receipt, or enough of the failure to
/// feed `retry::is_retryable`.
pub enum UploadOutcome {
    Receipt(UploadReceipt),
    Failed { status: u16, message: String },
}

#[async_trait]
pub trait UploadHttpClient: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> UploadOutcome;
}

/// Production client: a single multipart POST to `/api/upload`.
pub struct ReqwestUploadClient {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestUploadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UploadHttpClient for ReqwestUploadClient {
    async fn upload(&self, request: UploadRequest) -> UploadOutcome {
        let timeout = crate::retry::xhr_timeout(request.bytes.len() as u64);

        let mut form = reqwest::multipart::Form::new()
            .text("userId", request.user_id.clone())
            .text("epochs", request.epochs.to_string())
            .text("clientSideEncrypted", request.client_side_encrypted.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(request.bytes)
                    .file_name(request.filename.clone())
                    .mime_str(&request.mime)
                    .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new())),
            );

        if let Some(folder_id) = &request.folder_id {
            form = form.text("folderId", folder_id.clone());
        }
        if let Some(amount) = request.payment_amount {
            form = form.text("paymentAmount", amount.to_f64().to_string());
        }
        if let Some(quote_id) = &request.quote_id {
            form = form.text("quoteId", quote_id.clone());
        }

        let response = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .timeout(timeout)
            .multipart(form)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if resp.status().is_success() {
                    match resp.json::<UploadReceipt>().await {
                        Ok(receipt) => UploadOutcome::Receipt(receipt),
                        Err(err) => UploadOutcome::Failed {
                            status,
                            message: format!("malformed receipt: {err}"),
                        },
                    }
                } else {
                    let message = resp.text().await.unwrap_or_default();
                    UploadOutcome::Failed { status, message }
                }
            }
            Err(err) => {
                let status = if err.is_timeout() { 408 } else { 0 };
                UploadOutcome::Failed { status, message: err.to_string() }
            }
        }
    }
}

#[cfg(test)]
pub mod test_double {
    use super::*;
    use std::sync::Mutex;

    /// A scriptable double: each call to `upload` pops the next scripted outcome,
    /// repeating the last one once the script is exhausted.
    pub struct ScriptedUploadClient {
        script: Mutex<Vec<UploadOutcome>>,
    }

    impl ScriptedUploadClient {
        pub fn new(script: Vec<UploadOutcome>) -> Self {
            Self { script: Mutex::new(script) }
        }
    }

    #[async_trait]
    impl UploadHttpClient for ScriptedUploadClient {
        async fn upload(&self, _request: UploadRequest) -> UploadOutcome {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(UploadOutcome::Receipt(r)) => UploadOutcome::Receipt(r.clone()),
                    Some(UploadOutcome::Failed { status, message }) => {
                        UploadOutcome::Failed { status: *status, message: message.clone() }
                    }
                    None => UploadOutcome::Failed { status: 0, message: "no script left".into() },
                }
            }
        }
    }
}
