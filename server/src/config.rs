//! Server configuration (§2.1, §6): a layered `clap::Parser` derive over env vars,
//! the same shape `daemon::config` and `wallet::config` use for this workspace's
//! other binaries, with `serde`-deserializable defaults for everything §6 lists.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "blob-server", about = "Upload broker intake, dispatcher and ledger server")]
pub struct Config {
    /// Chain network the registry/relay clients target.
    #[arg(long, env = "NETWORK", value_enum, default_value = "testnet")]
    pub network: Network,

    /// 32-byte hex wallet signing key, optional `0x` prefix. Never logged.
    #[arg(long, env = "SUI_PRIVATE_KEY")]
    pub sui_private_key: Option<String>,

    /// Chain JSON-RPC endpoint.
    #[arg(long, env = "VITE_SUI_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Upload relay endpoint the dispatcher POSTs slivers to.
    #[arg(long, env = "WALRUS_UPLOAD_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Upper bound on the relay's tip, in the chain's smallest unit (§4.5).
    #[arg(long, env = "WALRUS_RELAY_TIP_MAX_MIST", default_value_t = blob_common::config::RELAY_TIP_MAX_MIST)]
    pub relay_tip_max_mist: u64,

    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    #[arg(long, env = "AWS_S3_BUCKET")]
    pub aws_s3_bucket: Option<String>,

    /// 64-char hex key used only for user-id hashing (§6); unrelated to envelope
    /// cryptography, which this core treats as opaque.
    #[arg(long, env = "MASTER_ENCRYPTION_KEY")]
    pub master_encryption_key: Option<String>,

    #[arg(long, env = "LEDGER_DB_PATH", default_value = "data/ledger")]
    pub ledger_db_path: String,

    #[arg(long, env = "QUEUE_DB_PATH", default_value = "data/files")]
    pub files_db_path: String,

    #[arg(long, env = "DISPATCH_MAX_GLOBAL_CONCURRENT", default_value_t = blob_common::config::MAX_GLOBAL_CONCURRENT)]
    pub dispatch_max_global_concurrent: usize,

    #[arg(long, env = "DISPATCH_MAX_PER_USER_CONCURRENT", default_value_t = blob_common::config::MAX_PER_USER_CONCURRENT)]
    pub dispatch_max_per_user_concurrent: usize,

    #[arg(long, env = "DISPATCH_TIMEOUT_SECS", default_value_t = blob_common::config::DISPATCH_TIMEOUT.as_secs())]
    pub dispatch_timeout_secs: u64,

    #[arg(long, env = "INTAKE_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// True when staging credentials are configured; without them the staging
    /// client runs in `disabled` mode and `put` fails with `StagingUnavailable` (§4.2).
    pub fn staging_configured(&self) -> bool {
        self.aws_region.is_some() && self.aws_s3_bucket.is_some()
    }
}
