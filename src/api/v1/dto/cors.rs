/*
 * Responsibility
 * - Response DTO of GET /cors/check
 * - Method / HeaderName are flattened to strings for JSON
 */
use serde::Serialize;

use crate::services::cors_policy::{AccessDecision, OriginRejection};

#[derive(Debug, Serialize)]
pub struct CorsCheckResponse {
    pub origin: Option<String>,
    pub allowed: bool,
    pub allow_credentials: bool,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_seconds: u64,
    pub rejection: Option<OriginRejection>,
}

impl CorsCheckResponse {
    pub fn new(origin: Option<String>, decision: &AccessDecision) -> Self {
        Self {
            origin,
            allowed: decision.allowed,
            allow_credentials: decision.allow_credentials,
            allowed_methods: decision
                .allowed_methods
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: decision
                .allowed_headers
                .iter()
                .map(|h| h.to_string())
                .collect(),
            exposed_headers: decision
                .exposed_headers
                .iter()
                .map(|h| h.to_string())
                .collect(),
            max_age_seconds: decision.max_age_seconds,
            rejection: decision.rejection.clone(),
        }
    }
}
