/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Cheap to Clone: the CORS policy sits behind an Arc and is never mutated
 */
use std::sync::Arc;

use crate::config::{AppEnv, Config};
use crate::services::cors_policy::CorsPolicy;

#[derive(Clone, Debug)]
pub struct AppState {
    pub app_env: AppEnv,
    pub cors: Arc<CorsPolicy>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            app_env: config.app_env,
            cors: Arc::new(CorsPolicy::new(&config.cors)),
        }
    }
}
