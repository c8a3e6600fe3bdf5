/*
 * Responsibility
 * - URL structure of v1
 * - OPTIONS is never routed here: the CORS boundary answers every preflight
 */
use axum::{Router, routing::get};

use crate::state::AppState;

use crate::api::v1::handlers::{cors::cors_check, health::health};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/cors/check", get(cors_check))
}
