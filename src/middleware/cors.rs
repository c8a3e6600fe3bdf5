//! CORS boundary for browser clients.
//!
//! Note:
//! - CORS is enforced by browsers. Native apps and server-to-server calls are not
//!   restricted by it, so a denied origin still reaches the handler; it just gets
//!   no `Access-Control-*` headers back.
//! - This must be the LAST layer applied to the Router (outermost), so it runs
//!   before routing and sees every response, including 404/408 and platform-injected headers.
//!
//! Responsibility:
//! - Resolve the request once via [`CorsPolicy`].
//! - Answer every `OPTIONS` request here (200, empty body); routing never sees it.
//! - Overwrite the CORS header set on the way out; never touch other headers.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};

use crate::services::cors_policy::{AccessDecision, CorsPolicy};

/// Every header this module owns. Anything else on the response is left alone.
const CORS_HEADERS: [header::HeaderName; 6] = [
    header::ACCESS_CONTROL_ALLOW_ORIGIN,
    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
    header::ACCESS_CONTROL_ALLOW_METHODS,
    header::ACCESS_CONTROL_ALLOW_HEADERS,
    header::ACCESS_CONTROL_EXPOSE_HEADERS,
    header::ACCESS_CONTROL_MAX_AGE,
];

/// Apply the CORS boundary to the given Router.
pub fn apply(router: Router, policy: Arc<CorsPolicy>) -> Router {
    router.layer(middleware::from_fn_with_state(policy, cors_boundary))
}

async fn cors_boundary(
    State(policy): State<Arc<CorsPolicy>>,
    mut req: Request,
    next: Next,
) -> Response {
    let decision = policy.resolve_headers(req.headers(), req.method());

    if let Some(rejection) = &decision.rejection {
        tracing::debug!(
            %rejection,
            method = %req.method(),
            path = %req.uri().path(),
            "cross-origin request denied"
        );
    }

    if decision.preflight {
        tracing::debug!(
            origin = decision.origin_to_echo.as_deref().unwrap_or("-"),
            path = %req.uri().path(),
            allowed = decision.allowed,
            "answering preflight"
        );
        let mut res = StatusCode::OK.into_response();
        apply_decision(&decision, res.headers_mut());
        return res;
    }

    req.extensions_mut().insert(decision.clone());
    let mut res = next.run(req).await;
    apply_decision(&decision, res.headers_mut());
    res
}

/// Write `decision` onto `headers`.
///
/// Idempotent: the owned CORS headers are removed and re-inserted (set, never add),
/// and `Vary` is collapsed into a single value that lists each token once.
pub fn apply_decision(decision: &AccessDecision, headers: &mut HeaderMap) {
    for name in CORS_HEADERS {
        headers.remove(name);
    }
    merge_vary(headers, decision.preflight);

    if !decision.emits_cors_headers() {
        return;
    }
    let Some(origin) = decision
        .origin_to_echo
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    else {
        return;
    };

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    if decision.allow_credentials {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    if let Some(methods) = join(&decision.allowed_methods) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    if let Some(allowed) = join(&decision.allowed_headers) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed);
    }
    if let Some(exposed) = join(&decision.exposed_headers) {
        headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed);
    }
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(decision.max_age_seconds),
    );
}

fn merge_vary(headers: &mut HeaderMap, preflight: bool) {
    let mut tokens: Vec<String> = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    // `Vary: *` already covers everything.
    if tokens.iter().any(|t| t == "*") {
        headers.insert(header::VARY, HeaderValue::from_static("*"));
        return;
    }

    let required: &[&str] = if preflight {
        &[
            "Origin",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
        ]
    } else {
        &["Origin"]
    };
    for name in required {
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tokens.push(name.to_string());
        }
    }

    if let Ok(value) = HeaderValue::from_str(&tokens.join(", ")) {
        headers.insert(header::VARY, value);
    }
}

fn join<T: AsRef<str>>(items: &[T]) -> Option<HeaderValue> {
    if items.is_empty() {
        return None;
    }
    let joined = items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ");
    HeaderValue::from_str(&joined).ok()
}
