//! Application state (§4.4's "thin handler holding `Arc` handles"): one struct built
//! once at startup and injected into every handler via `actix_web::web::Data`, the
//! same shape `DaemonRpcServer` holds its `Arc<Blockchain<S>>` and friends in.

use std::sync::Arc;

use blob_common::config::{DEFAULT_EPOCHS, DEFAULT_SUI_PRICE_USD, DEFAULT_WAL_PRICE_USD};
use sled::Db;

use crate::chain::ReqwestChainRpcClient;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherBounds};
use crate::files::FileRepository;
use crate::ledger::BalanceLedger;
use crate::quoter::{FixedPriceFeed, PriceFeed, PriceSnapshot, QuoteStore, ReqwestPriceFeed};
use crate::registry::RegistryClient;
use crate::relay::{ReqwestWalrusRelayClient, RpcChainSigner};
use crate::staging::{InMemoryStagingClient, ObjectStoreStagingClient, StagingClient};
use crate::users::UserDirectory;

pub struct AppState {
    pub config: Config,
    pub files: FileRepository,
    pub ledger: BalanceLedger,
    pub quotes: QuoteStore,
    pub staging: Arc<dyn StagingClient>,
    pub price_feed: Arc<dyn PriceFeed>,
    pub users: UserDirectory,
    pub dispatcher: Dispatcher,
    pub relay: ReqwestWalrusRelayClient,
    pub signer: RpcChainSigner,
    pub registry: RegistryClient<ReqwestChainRpcClient>,
}

impl AppState {
    /// Wires every component from `config`: two `sled` databases (ledger, files),
    /// an object-store or in-memory staging client depending on whether AWS
    /// credentials are configured (§4.2's "disabled mode" fallback), and the
    /// production relay/chain/price-feed clients pointed at their configured URLs.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let ledger_db: Db = sled::open(&config.ledger_db_path)?;
        let files_db: Db = sled::open(&config.files_db_path)?;

        let staging: Arc<dyn StagingClient> = if config.staging_configured() {
            Arc::new(ObjectStoreStagingClient::new(
                config.aws_s3_bucket.as_deref().expect("checked by staging_configured"),
                config.aws_region.as_deref().expect("checked by staging_configured"),
            )?)
        } else {
            log::warn!("AWS_REGION/AWS_S3_BUCKET not set; staging runs in-memory only");
            Arc::new(InMemoryStagingClient::new())
        };

        let price_feed: Arc<dyn PriceFeed> = match &config.rpc_url {
            Some(url) => Arc::new(ReqwestPriceFeed::new(format!("{url}/v1/prices"))),
            None => Arc::new(FixedPriceFeed(PriceSnapshot {
                sui_usd: DEFAULT_SUI_PRICE_USD,
                wal_usd: DEFAULT_WAL_PRICE_USD,
                fallback: true,
            })),
        };

        let rpc_url = config.rpc_url.clone().unwrap_or_else(|| "http://127.0.0.1:9000".to_string());
        let relay_url = config.relay_url.clone().unwrap_or_else(|| "http://127.0.0.1:9001".to_string());

        let dispatcher_bounds = DispatcherBounds {
            max_global_concurrent: config.dispatch_max_global_concurrent as u32,
            max_per_user_concurrent: config.dispatch_max_per_user_concurrent as u32,
            dispatch_timeout: config.dispatch_timeout(),
            relay_tip_max_mist: config.relay_tip_max_mist,
        };

        Ok(Self {
            files: FileRepository::open(&files_db)?,
            ledger: BalanceLedger::open(&ledger_db)?,
            quotes: QuoteStore::new(),
            staging,
            price_feed,
            users: UserDirectory::open(&files_db)?,
            dispatcher: Dispatcher::with_bounds(dispatcher_bounds),
            relay: ReqwestWalrusRelayClient::new(relay_url, rpc_url.clone()),
            signer: RpcChainSigner::new(rpc_url.clone()),
            registry: RegistryClient::new(ReqwestChainRpcClient::new(rpc_url)),
            config,
        })
    }

    pub fn default_epochs(&self) -> u32 {
        DEFAULT_EPOCHS
    }
}
