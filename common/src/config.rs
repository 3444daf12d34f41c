//! Constants shared between the client queue and the server, matching the way
//! `daemon::config` centralizes protocol-wide constants for this workspace.

use std::time::Duration;

/// Erasure-coding inflation factor used by the cost quoter. Documented to hold for
/// files up to 5 GiB (see SPEC_FULL.md open questions); behavior beyond that is undefined.
pub const ENCODED_SIZE_MULTIPLIER: u64 = 7;

pub const BYTES_PER_MIB: u64 = 1024 * 1024;
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;
pub const FROST_PER_WAL: u64 = 1_000_000_000;

pub const METADATA_WAL_PER_EPOCH: f64 = 0.0007;
pub const WRITE_FEE_FROST_PER_EPOCH: u64 = 20_000;
pub const MARGINAL_FROST_PER_MIB_PER_EPOCH: u64 = 66_000;
pub const UPLOAD_OVERHEAD_WAL_PER_GIB: f64 = 0.02;
pub const GAS_COST_SUI: f64 = 0.005;
pub const QUOTE_MARKUP: f64 = 1.25;

pub const DEFAULT_SUI_PRICE_USD: f64 = 1.85;
pub const DEFAULT_WAL_PRICE_USD: f64 = 0.15;

pub const DEFAULT_EPOCHS: u32 = 3;
pub const MIN_EPOCHS: u32 = 1;

/// Quotes are single-use and strictly expire after this window.
pub const QUOTE_TTL: Duration = Duration::from_secs(5 * 60);

/// Staged objects in the `pending` namespace and freshly completed blobs both carry
/// this lifecycle window; `get`/`touch` refresh it.
pub const STAGING_LIFETIME: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Dispatcher admission bounds (§4.5). Overridable per-process for tests that need to
/// exercise backpressure deterministically with tighter bounds.
pub const MAX_GLOBAL_CONCURRENT: usize = 6;
pub const MAX_PER_USER_CONCURRENT: usize = 2;

pub const DISPATCH_ADMISSION_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DISPATCH_INTER_ITEM_DELAY: Duration = Duration::from_millis(100);
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);
pub const RELAY_TIP_MAX_MIST: u64 = 50_000;

/// Client queue constants (§4.3).
pub const QUEUE_MAX_ATTEMPTS: u32 = 3;
pub const QUEUE_INTER_ITEM_DELAY: Duration = Duration::from_secs(5);
pub const QUEUE_STUCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const QUEUE_BASE_BACKOFF: Duration = Duration::from_secs(10);
pub const QUEUE_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Balance ledger retry policy (§4.6).
pub const LEDGER_MAX_RETRIES: u32 = 3;
pub const LEDGER_RETRY_BACKOFF_UNIT: Duration = Duration::from_millis(500);
pub const LEDGER_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Default value for `WALRUS_RELAY_TIP_MAX_MIST`.
pub fn relay_tip_max_mist() -> u64 {
    RELAY_TIP_MAX_MIST
}

/// Maximum bytes intake accepts synchronously before a presigned staging path
/// would be required (§4.4); larger uploads are out of scope here.
pub const MAX_SYNC_INTAKE_BYTES: u64 = 100 * 1024 * 1024;

/// Extensions intake accepts, grouped by the families §4.4 names. Matched
/// case-insensitively against the filename's extension, including the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    // documents
    ".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".csv",
    // images
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp", ".tiff",
    // video
    ".mp4", ".mov", ".avi", ".mkv", ".webm",
    // audio
    ".mp3", ".wav", ".ogg", ".flac", ".m4a",
    // archives
    ".zip", ".tar", ".gz", ".7z", ".rar",
    // office
    ".xls", ".xlsx", ".ppt", ".pptx", ".odp", ".ods",
    // markup
    ".html", ".htm", ".xml", ".json", ".md", ".yaml", ".yml",
];

/// True when `filename`'s extension is in [`ALLOWED_EXTENSIONS`] (§4.4).
pub fn is_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Default registry expiration horizon in epochs beyond the file's own `epochs`
/// setting, used when computing `expirationEpoch` for `register_file` (§6). The
/// spec leaves the chain's epoch/calendar conversion to the external chain client
/// (§4.1's `storage_days: None`); here we simply mirror the file's own epoch count.
pub fn expiration_epoch_for(current_epoch: u64, epochs: u32) -> u64 {
    current_epoch + epochs as u64
}
