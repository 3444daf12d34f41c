//! Glues the dispatcher, staging, files repository and registry client into the
//! end-to-end per-file flow (§4.5 steps 1-7, §5's per-file ordering guarantee):
//! staging `get` → dispatcher `run` → staging `rename` → `File::mark_completed` →
//! `ensure_registry` → `register_file`, all ordered after `certify` by running
//! sequentially in this function rather than fanning out.

use blob_common::config::expiration_epoch_for;
use chrono::Utc;

use crate::dispatcher::{DispatchJob, DispatchOutcome};
use crate::error::ApiError;
use crate::registry::FileRegistration;
use crate::staging::{completed_key, StagedMetadata};
use crate::state::AppState;

/// Drives one pending (or retriable-failed) file through dispatch and on-chain
/// registration, leaving the `File` row `completed` on success or `pending`/`failed`
/// on the error paths §4.5 describes.
pub async fn dispatch_file(state: &AppState, file_id: &str) -> Result<DispatchOutcome, ApiError> {
    let mut file = state.files.get(file_id)?;

    if file.status == blob_common::FileStatus::Completed {
        return Err(ApiError::AlreadyCompleted(file_id.to_string()));
    }
    if !file.status.is_dispatchable() {
        return Err(ApiError::InputInvalid(format!("file {file_id} is not dispatchable in its current state")));
    }

    let wallet = state.users.wallet_for(&file.user_id)?;
    let bytes = crate::staging::get_and_refresh(&state.staging, &file.staging_key).await?;

    file.mark_processing(Utc::now());
    state.files.put(&file)?;

    let job = DispatchJob {
        file_id: file.file_id.clone(),
        user_id: file.user_id.clone(),
        owner: wallet.clone(),
        bytes,
        epochs: file.epochs,
    };

    let outcome = match state.dispatcher.run(&state.relay, &state.signer, job).await {
        Ok(outcome) => outcome,
        Err(err) => {
            handle_dispatch_failure(state, &mut file, &err)?;
            return Err(err.into());
        }
    };

    finish_dispatch(state, &mut file, &outcome, &wallet).await?;
    Ok(outcome)
}

/// On a retriable failure the file stays `pending` so a later sweep retries it
/// (§4.5's "relay transport errors ... File stays pending" rule); on a terminal
/// failure it is marked `failed` with the error recorded, and no balance refund
/// is issued (refund policy is explicitly out of scope, §4.5).
fn handle_dispatch_failure(
    state: &AppState,
    file: &mut crate::files::File,
    err: &crate::dispatcher::DispatchError,
) -> Result<(), ApiError> {
    use crate::dispatcher::DispatchError;

    let now = Utc::now();
    match err {
        DispatchError::Relay(_) | DispatchError::Timeout(_) => {
            file.status = blob_common::FileStatus::Pending;
            file.updated_at = now;
        }
        DispatchError::Signing(_) | DispatchError::RelayTipTooHigh { .. } => {
            file.mark_failed(err.to_string(), now);
        }
    }
    state.files.put(file)?;
    Ok(())
}

async fn finish_dispatch(
    state: &AppState,
    file: &mut crate::files::File,
    outcome: &DispatchOutcome,
    wallet: &blob_common::WalletAddress,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let new_key = completed_key(&file.user_id.0, &outcome.blob_id.0, &file.filename);

    state.staging.rename(&file.staging_key, &new_key).await?;

    file.staging_key = new_key;
    file.mark_completed(outcome.blob_id.clone(), outcome.blob_object_id.clone(), now);
    state.files.put(file)?;

    register_on_chain(state, file, wallet).await?;
    Ok(())
}

/// §4.5 step 7: ensures the user's registry object exists, then registers the
/// file under it, ordered after the file row is already marked completed.
async fn register_on_chain(
    state: &AppState,
    file: &crate::files::File,
    wallet: &blob_common::WalletAddress,
) -> Result<(), ApiError> {
    let registry_id = state.registry.ensure_registry(wallet).await?;

    let blob_id = file.blob_id.as_ref().expect("file.mark_completed always sets blob_id");
    let registration = FileRegistration {
        file_id_bytes: file.file_id.as_bytes().to_vec(),
        blob_id_bytes: blob_id.0.as_bytes().to_vec(),
        encrypted: file.encrypted,
        expiration_epoch: expiration_epoch_for(0, file.epochs),
    };

    state.registry.register_file(&registry_id, wallet, &registration).await?;
    Ok(())
}

/// Selects the oldest dispatchable files and runs them one at a time (§4.4's
/// `/upload/trigger-pending` sweep), returning counts rather than failing fast so
/// one bad file doesn't block the rest of the sweep.
pub async fn trigger_pending(state: &AppState) -> Result<(u32, u32), ApiError> {
    let mut files = state.files.list_dispatchable()?;
    files.sort_by_key(|f| f.created_at);

    let mut processed = 0;
    let mut failed = 0;

    for file in files {
        match dispatch_file(state, &file.file_id).await {
            Ok(_) => processed += 1,
            Err(_) => failed += 1,
        }
    }

    Ok((processed, failed))
}
