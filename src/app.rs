/*
 * Responsibility
 * - Config loading -> shared state -> Router assembly
 * - Middleware order: http layers first, CORS boundary last (outermost)
 * - axum::serve()
 */
use std::{panic, process};

use anyhow::Result;
use axum::{Router, http::Uri};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api,
    config::{Config, HttpConfig},
    error::AppError,
    middleware,
    state::AppState,
};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,agriculture_backend=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    let state = AppState::new(&config);
    tracing::info!(
        "starting API in {:?} mode on {} ({} allow-list entries, credentials: {})",
        config.app_env,
        config.addr,
        state.cors.allow_list().len(),
        config.cors.allow_credentials,
    );
    if state.cors.allow_list().is_empty() {
        tracing::warn!("CORS allow-list is empty; every cross-origin request will be denied");
    }

    let app = build_router(state, &config.http);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn build_router(state: AppState, http: &HttpConfig) -> Router {
    let policy = state.cors.clone();

    let router = Router::new()
        .nest("/api/v1", api::v1::routes())
        .fallback(not_found)
        .with_state(state);

    let router = middleware::http::apply(router, http);
    middleware::cors::apply(router, policy)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(uri.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::Value;
    use std::collections::HashMap;
    use tower::ServiceExt; // for `oneshot`

    const FRONTEND: &str = "https://agriculture-frontend.vercel.app";

    fn test_app(vars: &[(&str, &str)]) -> Router {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_source(|key| vars.get(key).cloned()).unwrap();
        build_router(AppState::new(&config), &config.http)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn frontend_post_is_credentialed() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/health")
            .header(header::ORIGIN, FRONTEND)
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(test_app(&[]), req).await;

        // /health only serves GET; CORS headers are still present on the 405.
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::VARY], "Origin");
    }

    #[tokio::test]
    async fn health_keeps_request_id_and_cors_headers() {
        let req = Request::builder()
            .uri("/api/v1/health")
            .header(header::ORIGIN, FRONTEND)
            .header("x-request-id", "req-1")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(test_app(&[]), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["env"], "development");
        assert_eq!(headers["x-request-id"], "req-1");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
    }

    #[tokio::test]
    async fn evil_origin_gets_zero_cors_headers() {
        let req = Request::builder()
            .uri("/api/v1/health")
            .header(header::ORIGIN, "http://evil.com")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(test_app(&[]), req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(
            headers
                .keys()
                .all(|name| !name.as_str().starts_with("access-control-"))
        );
    }

    #[tokio::test]
    async fn preflight_to_unknown_path_is_answered() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/no/such/route")
            .header(header::ORIGIN, FRONTEND)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(test_app(&[]), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, PATCH, OPTIONS, HEAD"
        );
    }

    #[tokio::test]
    async fn unknown_path_is_json_404_with_cors_headers() {
        let req = Request::builder()
            .uri("/farmers")
            .header(header::ORIGIN, FRONTEND)
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(test_app(&[]), req).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
    }

    #[tokio::test]
    async fn cors_check_reports_the_decision() {
        let req = Request::builder()
            .uri("/api/v1/cors/check")
            .header(header::ORIGIN, "https://evil.vercel.app.attacker.com")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(test_app(&[]), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"], "https://evil.vercel.app.attacker.com");
        assert_eq!(body["allowed"], false);
        assert_eq!(body["rejection"]["kind"], "not_allowed");

        let req = Request::builder()
            .uri("/api/v1/cors/check")
            .header(header::ORIGIN, FRONTEND)
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(test_app(&[]), req).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["allow_credentials"], true);
        assert_eq!(body["max_age_seconds"], 3600);
        assert_eq!(body["rejection"], Value::Null);
    }

    #[tokio::test]
    async fn empty_allow_list_denies_frontend() {
        let app = test_app(&[
            ("CORS_ALLOWED_ORIGINS", ""),
            ("CORS_ALLOWED_ORIGIN_SUFFIXES", ""),
        ]);
        let req = Request::builder()
            .uri("/api/v1/health")
            .header(header::ORIGIN, FRONTEND)
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
