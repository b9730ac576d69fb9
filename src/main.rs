use crate::app::App;
use crate::cli::Args;
use crate::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

mod app;
mod cli;
mod config;
mod data;
mod engine;
mod logging;
mod state;
mod utils;
mod web;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are
    // never silently dropped
    let early_config = {
        use figment::providers::Env;
        figment::Figment::new()
            .merge(Env::raw())
            .extract::<crate::config::Config>()
            .expect("Failed to load config for logging setup")
    };
    setup_logging(&early_config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting unimatch"
    );

    let app = App::new().await.expect("Failed to initialize application");
    app.run().await
}
