//! Upload broker server library: intake, dispatch, ledger and on-chain registration
//! behind a small `actix-web` surface. `run` wires an `AppState` and starts the
//! `HttpServer` the way `daemon::rpc::DaemonRpcServer::new` wires its own app data
//! and route table, minus the websocket/getwork machinery this service has no use for.

#[macro_use]
extern crate log;

pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod files;
pub mod http;
pub mod ledger;
pub mod orchestrate;
pub mod quoter;
pub mod registry;
pub mod relay;
pub mod staging;
pub mod state;
pub mod users;

use actix_web::{web, App, HttpServer};

pub use config::Config;
pub use state::AppState;

/// Builds the `AppState` from `config` and serves every endpoint in SPEC_FULL.md's
/// §6 table until the process receives a shutdown signal.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = web::Data::new(AppState::build(config)?);

    info!("starting upload broker on {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/api/upload", web::post().to(http::upload))
            .route("/api/upload/process-async", web::post().to(http::process_async))
            .route("/api/upload/trigger-pending", web::post().to(http::trigger_pending))
            .route("/api/metrics", web::post().to(http::metrics))
            .route("/api/download", web::post().to(http::download))
            .route("/api/verify", web::get().to(http::verify))
            .route("/api/balance", web::get().to(http::balance))
            .route("/api/quote", web::post().to(http::quote))
            .route("/healthz", web::get().to(http::healthz))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
