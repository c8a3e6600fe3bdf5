/*
 * Responsibility
 * - GET /cors/check: show what the CORS boundary decided for this very request
 * - Reads the decision from request extensions; it does not resolve again
 */
use axum::{
    Extension, Json,
    http::{HeaderMap, header},
};

use crate::{api::v1::dto::cors::CorsCheckResponse, services::cors_policy::AccessDecision};

pub async fn cors_check(
    Extension(decision): Extension<AccessDecision>,
    headers: HeaderMap,
) -> Json<CorsCheckResponse> {
    let origin = headers
        .get(header::ORIGIN)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    Json(CorsCheckResponse::new(origin, &decision))
}
