//! Production wiring for `registry::ChainRpcClient` (§4.7): paged event queries,
//! `create_registry`, and `register_file` as plain `reqwest` JSON-RPC calls, in the
//! shape of `wallet::daemon_api::DaemonAPI`'s thin `call`-then-typed-helper wrapper.

use async_trait::async_trait;
use blob_common::{BlobObjectId, WalletAddress};
use serde::Deserialize;

use crate::registry::{ChainRpcClient, FileRegistration, RegisteredFile, RegistryError, RegistryEvent};

pub struct ReqwestChainRpcClient {
    rpc_url: String,
    client: reqwest::Client,
}

impl ReqwestChainRpcClient {
    pub fn new(rpc_url: String) -> Self {
        Self { rpc_url, client: reqwest::Client::new() }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    registry_id: String,
    owner: String,
}

#[derive(Deserialize)]
struct CreateRegistryResponse {
    registry_id: String,
}

#[derive(Deserialize)]
struct RegisterFileResponse {
    object_id: String,
}

#[async_trait]
impl ChainRpcClient for ReqwestChainRpcClient {
    async fn query_registry_created_events(
        &self,
        owner: &WalletAddress,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RegistryEvent>, RegistryError> {
        let response = self
            .client
            .get(format!("{}/v1/events/RegistryCreated", self.rpc_url))
            .query(&[("owner", owner.0.as_str()), ("page", &page.to_string()), ("pageSize", &page_size.to_string())])
            .send()
            .await
            .map_err(|e| RegistryError::Rpc(e.to_string()))?;

        let raw: Vec<RawEvent> = response.json().await.map_err(|e| RegistryError::Rpc(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|e| RegistryEvent { registry_object_id: BlobObjectId(e.registry_id), owner: WalletAddress(e.owner) })
            .collect())
    }

    async fn create_registry(&self, owner: &WalletAddress) -> Result<BlobObjectId, RegistryError> {
        let response = self
            .client
            .post(format!("{}/v1/create_registry", self.rpc_url))
            .json(&serde_json::json!({ "owner": owner.0 }))
            .send()
            .await
            .map_err(|e| RegistryError::Execution(e.to_string()))?;

        let parsed: CreateRegistryResponse = response.json().await.map_err(|e| RegistryError::Execution(e.to_string()))?;
        Ok(BlobObjectId(parsed.registry_id))
    }

    async fn register_file_object(
        &self,
        registry_id: &BlobObjectId,
        owner: &WalletAddress,
        registration: &FileRegistration,
    ) -> Result<RegisteredFile, RegistryError> {
        let response = self
            .client
            .post(format!("{}/v1/register_file", self.rpc_url))
            .json(&serde_json::json!({
                "registry": registry_id.0,
                "owner": owner.0,
                "fileId": hex::encode(&registration.file_id_bytes),
                "blobId": hex::encode(&registration.blob_id_bytes),
                "encrypted": registration.encrypted,
                "expirationEpoch": registration.expiration_epoch,
            }))
            .send()
            .await
            .map_err(|e| RegistryError::Execution(e.to_string()))?;

        let parsed: RegisterFileResponse = response.json().await.map_err(|e| RegistryError::Execution(e.to_string()))?;
        Ok(RegisteredFile { object_id: BlobObjectId(parsed.object_id) })
    }
}
