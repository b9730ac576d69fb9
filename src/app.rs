use crate::config::Config;
use crate::data::settings;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::create_router;
use anyhow::Context;
use figment::{Figment, providers::Env};
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components.
pub struct App {
    config: Config,
    state: AppState,
}

impl App {
    /// Create a new App instance with all necessary components initialized.
    ///
    /// Engine configuration that fails to load or validate is fatal here;
    /// later refreshes degrade to the previous snapshot instead.
    pub async fn new() -> Result<Self, anyhow::Error> {
        let config: Config = Figment::new()
            .merge(Env::raw())
            .extract()
            .context("Failed to load config")?;

        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 8,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let started = std::time::Instant::now();
        let engine_config = settings::load_engine_config(&db_pool)
            .await
            .context("Failed to load engine configuration")?;
        engine_config
            .validate()
            .context("Engine configuration failed validation")?;
        info!(
            subjects = engine_config.related_terms.len(),
            regions = engine_config.region_cities.len(),
            interests = engine_config.career_keywords.len(),
            elapsed = fmt_duration(started.elapsed()),
            "engine configuration loaded"
        );

        let state = AppState::new(db_pool, engine_config);
        state.spawn_engine_config_refresh(Duration::from_secs(config.config_refresh_seconds));

        Ok(App { config, state })
    }

    /// Run the web server until a shutdown signal arrives.
    pub async fn run(self) -> ExitCode {
        let router = create_router(self.state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, port = self.config.port, "failed to bind web server");
                return ExitCode::FAILURE;
            }
        };
        info!(port = self.config.port, "web server listening");

        let shutdown_timeout = Duration::from_secs(self.config.shutdown_timeout);
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(shutdown_timeout));

        match serve.await {
            Ok(()) => {
                info!("application shutdown complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "web server failed");
                ExitCode::FAILURE
            }
        }
    }
}

/// Resolve when a shutdown signal (SIGINT or SIGTERM) arrives, then arm a
/// watchdog so a stuck drain can't hold the process open forever.
async fn shutdown_signal(drain_timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("received ctrl+c, gracefully shutting down...");
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
        sigterm_stream.recv().await;
        info!("received SIGTERM, gracefully shutting down...");
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }

    tokio::spawn(async move {
        tokio::time::sleep(drain_timeout).await;
        warn!(timeout = fmt_duration(drain_timeout), "graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}
