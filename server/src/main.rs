use clap::Parser;
use log::LevelFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = blob_server::Config::parse();

    let level = config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    blob_common::logging::init(level);

    blob_server::run(config).await
}
