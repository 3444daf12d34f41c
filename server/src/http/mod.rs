//! HTTP handlers for every endpoint in §6's external-interfaces table. Each handler
//! is a thin function over `web::Data<AppState>`, the same shape the teacher's
//! `daemon::rpc` handlers take `Data<DaemonRpcServer<S>>` — no handler talks to
//! `sled`/`reqwest`/`object_store` directly, only through the component APIs.

use actix_multipart::Multipart;
use actix_web::web::{Data, Json, Query};
use actix_web::HttpResponse;
use blob_common::config::{is_allowed_extension, MAX_SYNC_INTAKE_BYTES};
use blob_common::ids::{QuoteId, TempBlobId};
use blob_common::{BlobId, FileId, UserId};
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::files::File;
use crate::orchestrate;
use crate::quoter::{mint_quote, price_one, QuoteInput};
use crate::staging::{pending_key, StagedMetadata};
use crate::state::AppState;

async fn read_field_text(field: &mut actix_multipart::Field) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| ApiError::InputInvalid(e.to_string()))? {
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|e| ApiError::InputInvalid(e.to_string()))
}

/// `POST /api/upload` (§4.4): decodes the multipart form, checks the extension
/// allow-list and size ceiling, stages the bytes, charges the user (via an existing
/// quote or a just-in-time one), and inserts the `File` row.
pub async fn upload(state: Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type = String::from("application/octet-stream");
    let mut user_id: Option<String> = None;
    let mut client_side_encrypted = false;
    let mut epochs = state.default_epochs();
    let mut quote_id: Option<String> = None;
    let mut folder_id: Option<String> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| ApiError::InputInvalid(e.to_string()))? {
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();
        match name.as_str() {
            "file" => {
                filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|s| s.to_string());
                if let Some(mime) = field.content_type() {
                    content_type = mime.to_string();
                }
                let mut buf = Vec::new();
                while let Some(chunk) = field.try_next().await.map_err(|e| ApiError::InputInvalid(e.to_string()))? {
                    buf.extend_from_slice(&chunk);
                }
                bytes = Some(buf);
            }
            "userId" => user_id = Some(read_field_text(&mut field).await?),
            "clientSideEncrypted" => client_side_encrypted = read_field_text(&mut field).await? == "true",
            "epochs" => {
                if let Ok(parsed) = read_field_text(&mut field).await?.parse() {
                    epochs = parsed;
                }
            }
            "quoteId" => quote_id = Some(read_field_text(&mut field).await?),
            "folderId" => folder_id = Some(read_field_text(&mut field).await?),
            // userPrivateKey, paymentAmount, fileId: accepted per §6's wire
            // contract but not used by this core (wallet signing is an
            // external-collaborator concern, §1).
            _ => {
                while field.try_next().await.map_err(|e| ApiError::InputInvalid(e.to_string()))?.is_some() {}
            }
        }
    }

    let filename = filename.ok_or_else(|| ApiError::InputInvalid("missing file field".into()))?;
    let bytes = bytes.ok_or_else(|| ApiError::InputInvalid("missing file field".into()))?;
    let user_id = UserId(user_id.ok_or_else(|| ApiError::InputInvalid("missing userId field".into()))?);

    if !is_allowed_extension(&filename) {
        return Err(ApiError::DisallowedExtension(filename));
    }
    if bytes.len() as u64 > MAX_SYNC_INTAKE_BYTES {
        return Err(ApiError::TooLarge { max: MAX_SYNC_INTAKE_BYTES });
    }

    // §4.4 step 1: resolving the wallet is enough at intake time; the registry
    // object itself is ensured lazily at dispatch (§4.5 step 7) so intake never
    // pays for a chain round trip it doesn't need yet.
    let _wallet = state.users.wallet_for(&user_id)?;

    let size_bytes = bytes.len() as u64;

    // §4.4/§5's per-file ordering guarantee is staging `put` -> ledger `deduct` ->
    // ... . Staging first means a `StagingUnavailable` failure (boundary scenario
    // #6) never touches the quote or the balance: the quote stays unconsumed and
    // within its TTL, and the retry that follows charges exactly once.
    let temp_blob_id = TempBlobId::generate();
    let staging_key = pending_key(&user_id.0, &temp_blob_id.0, &filename);
    let metadata = StagedMetadata::new(content_type.clone(), filename.clone(), client_side_encrypted, Utc::now());
    state.staging.put(&staging_key, bytes, metadata).await?;

    let cost = match quote_id {
        Some(quote_id) => state.quotes.consume(&quote_id, &user_id.0)?.total_cost_usd,
        None => {
            let prices = state.price_feed.spot_prices().await.unwrap_or(crate::quoter::PriceSnapshot {
                sui_usd: blob_common::config::DEFAULT_SUI_PRICE_USD,
                wal_usd: blob_common::config::DEFAULT_WAL_PRICE_USD,
                fallback: true,
            });
            price_one(QuoteInput { size_bytes, epochs }, prices).cost_usd
        }
    };
    state.ledger.deduct(&user_id.0, cost, &format!("upload charge for {filename}")).await?;

    let file_id = FileId::generate();
    let file = File::new_pending(
        file_id.0.clone(),
        user_id,
        filename,
        content_type,
        size_bytes,
        epochs,
        staging_key.clone(),
        client_side_encrypted,
        folder_id,
        Utc::now(),
    );
    state.files.put(&file)?;

    Ok(HttpResponse::Ok().json(json!({
        "fileId": file_id.0,
        "blobId": serde_json::Value::Null,
        "tempBlobId": temp_blob_id.0,
        "s3Key": staging_key,
        "uploadMode": "async",
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAsyncRequest {
    pub file_id: String,
    #[allow(dead_code)]
    pub s3_key: Option<String>,
    #[allow(dead_code)]
    pub temp_blob_id: Option<String>,
    #[allow(dead_code)]
    pub user_id: Option<String>,
    #[allow(dead_code)]
    pub epochs: Option<u32>,
}

/// `POST /api/upload/process-async` (§4.4/§4.5): dispatches a single pending file.
/// The receipt fields beyond `fileId` are accepted for wire-contract compatibility
/// but the `File` row is already authoritative for all of them.
pub async fn process_async(state: Data<AppState>, body: Json<ProcessAsyncRequest>) -> Result<HttpResponse, ApiError> {
    let outcome = orchestrate::dispatch_file(&state, &body.file_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "blobId": outcome.blob_id.0,
        "blobObjectId": outcome.blob_object_id.0,
    })))
}

/// `POST /api/upload/trigger-pending` (§4.4): sweeps all dispatchable files oldest
/// first, dispatching one at a time.
pub async fn trigger_pending(state: Data<AppState>) -> Result<HttpResponse, ApiError> {
    let (processed, failed) = orchestrate::trigger_pending(&state).await?;
    Ok(HttpResponse::Ok().json(json!({ "processed": processed, "failed": failed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    pub kind: String,
    pub filename: Option<String>,
    pub duration_ms: Option<u64>,
    pub bytes: Option<u64>,
    pub ts: Option<i64>,
    pub lazy: Option<bool>,
    pub encrypted: Option<bool>,
}

/// `POST /api/metrics` (§6): a fire-and-forget client telemetry sink. No backing
/// store is built for this per §1; the event is simply logged.
pub async fn metrics(body: Json<MetricsEvent>) -> HttpResponse {
    log::info!(
        "client metric: kind={} filename={:?} duration_ms={:?} bytes={:?} lazy={:?} encrypted={:?}",
        body.kind,
        body.filename,
        body.duration_ms,
        body.bytes,
        body.lazy,
        body.encrypted
    );
    HttpResponse::Ok().json(json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub blob_id: String,
    #[allow(dead_code)]
    pub filename: Option<String>,
}

/// `POST /api/download` (§6): streams the staged bytes back for a completed blob.
pub async fn download(state: Data<AppState>, body: Json<DownloadRequest>) -> Result<HttpResponse, ApiError> {
    let blob_id = BlobId(body.blob_id.clone());
    let mut file = state.files.find_by_blob_id(&blob_id)?.ok_or_else(|| ApiError::FileNotFound(body.blob_id.clone()))?;
    let bytes = crate::staging::get_and_refresh(&state.staging, &file.staging_key).await?;

    file.touch_accessed(Utc::now());
    state.files.put(&file)?;

    Ok(HttpResponse::Ok().content_type(file.content_type.clone()).body(bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub blob_id: String,
}

/// `GET /api/verify?blobId=` (§6).
pub async fn verify(state: Data<AppState>, query: Query<VerifyQuery>) -> Result<HttpResponse, ApiError> {
    let blob_id = BlobId(query.blob_id.clone());
    let exists = state.files.find_by_blob_id(&blob_id)?.is_some();
    let message = if exists { "blob is registered" } else { "blob not found" };
    Ok(HttpResponse::Ok().json(json!({ "exists": exists, "blobId": blob_id.0, "message": message })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub user_id: String,
}

/// `GET /api/balance` (§6). `sui`/`wal` on-chain coin balances are the chain
/// client's concern (§1's external-collaborator framing); only the ledger's USD
/// balance is something this core actually tracks.
pub async fn balance(state: Data<AppState>, query: Query<BalanceQuery>) -> Result<HttpResponse, ApiError> {
    let user_id = UserId(query.user_id.clone());
    let wallet = state.users.wallet_for(&user_id)?;
    let usd_balance = state.ledger.balance(&user_id.0)?;

    Ok(HttpResponse::Ok().json(json!({
        "address": wallet.0,
        "network": state.config.network,
        "balances": {
            "sui": serde_json::Value::Null,
            "wal": serde_json::Value::Null,
            "total": usd_balance.to_f64(),
        }
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFileRequest {
    pub temp_id: String,
    pub size_bytes: u64,
    pub epochs: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub user_id: String,
    pub files: Vec<QuoteFileRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteLineResponse {
    temp_id: String,
    cost_usd: f64,
    cost_sui: f64,
}

/// `POST /api/quote` (§4.1): mints a short-lived, single-use quote covering every
/// file in the batch.
pub async fn quote(state: Data<AppState>, body: Json<QuoteRequest>) -> Result<HttpResponse, ApiError> {
    let quote_id = QuoteId::generate();
    let inputs = body
        .files
        .iter()
        .map(|f| (f.temp_id.clone(), QuoteInput { size_bytes: f.size_bytes, epochs: f.epochs }))
        .collect();

    let minted = mint_quote(quote_id.0, body.user_id.clone(), inputs, state.price_feed.as_ref(), Utc::now()).await;

    let per_file: Vec<QuoteLineResponse> = minted
        .line_items
        .iter()
        .map(|item| QuoteLineResponse { temp_id: item.temp_id.clone(), cost_usd: item.cost_usd.to_f64(), cost_sui: item.cost_sui })
        .collect();

    let response = json!({
        "quoteId": minted.quote_id,
        "expiresAt": minted.expires_at,
        "perFile": per_file,
        "totalCostUSD": minted.total_cost_usd.to_f64(),
        "totalCostSUI": minted.total_cost_sui,
    });

    state.quotes.insert(minted);
    Ok(HttpResponse::Ok().json(response))
}

/// `GET /healthz`: process liveness only, not deep dependency health (§6).
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
