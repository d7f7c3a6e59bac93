pub mod api;
pub mod config;
pub mod db;

use std::sync::Arc;

use api::rate_limit::RateLimiter;
use config::Config;
use db::DbPool;

/// Shared application state handed to every handler
pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            rate_limiter,
        }
    }
}

/// Handler-level test fixture around an in-memory database
#[cfg(test)]
pub(crate) async fn test_state_with(db: DbPool) -> Arc<AppState> {
    Arc::new(AppState::new(Config::default(), db))
}
