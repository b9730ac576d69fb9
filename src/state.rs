//! Application state shared across the web layer.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::data::settings;
use crate::engine::config::EngineConfig;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    /// Hot-reloadable engine configuration. Requests take a cheap snapshot
    /// clone and never observe a half-applied refresh.
    engine_config: Arc<RwLock<Arc<EngineConfig>>>,
}

impl AppState {
    pub fn new(db_pool: PgPool, engine_config: EngineConfig) -> Self {
        Self {
            db_pool,
            engine_config: Arc::new(RwLock::new(Arc::new(engine_config))),
        }
    }

    /// Snapshot of the current engine configuration.
    pub async fn engine_config(&self) -> Arc<EngineConfig> {
        self.engine_config.read().await.clone()
    }

    /// Spawn a background task that reloads the configuration tables every
    /// `interval`. A refresh that fails to load or validate keeps the
    /// previous snapshot.
    pub fn spawn_engine_config_refresh(&self, interval: Duration) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                match settings::load_engine_config(&state.db_pool).await {
                    Ok(config) => match config.validate() {
                        Ok(()) => {
                            let terms = config.related_terms.len();
                            *state.engine_config.write().await = Arc::new(config);
                            info!(subjects = terms, "engine configuration refreshed");
                        }
                        Err(e) => {
                            warn!(error = %e, "refreshed configuration failed validation, keeping previous");
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to refresh engine configuration");
                    }
                }
            }
        });
    }
}
