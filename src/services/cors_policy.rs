//! Cross-origin access policy.
//!
//! Responsibility:
//! - Hold the process-wide origin allow-list (exact origins + suffix patterns).
//! - Turn one request's `Origin` / preflight inputs into an [`AccessDecision`].
//!
//! This module never touches a response. Writing headers is the job of
//! `middleware::cors`, which calls [`CorsPolicy::resolve_headers`] once per request.
//!
//! Policy:
//! - No `Origin` header: allowed, nothing to emit.
//! - Exact entries are compared first (string equality), suffix patterns second.
//! - Suffix patterns match on a full label boundary of a parsed host, never on the raw string.
//! - Anything else (including unparseable origins) is denied silently.
use axum::http::{HeaderMap, HeaderName, Method, header};
use serde::Serialize;
use thiserror::Error;
use url::{Host, Url};

/// Why a cross-origin request did not receive CORS headers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginRejection {
    #[error("origin is not on the allow-list: {origin}")]
    NotAllowed { origin: String },
    #[error("malformed origin header")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid allow-list entry `{entry}`: {reason}")]
pub struct InvalidEntry {
    pub entry: String,
    pub reason: &'static str,
}

impl InvalidEntry {
    fn new(entry: &str, reason: &'static str) -> Self {
        Self {
            entry: entry.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowListEntry {
    /// Serialized origin, e.g. `https://agriculture-frontend.vercel.app`.
    Exact(String),
    /// `<scheme>://*.<suffix>`; `suffix` is stored without the leading dot.
    Suffix { scheme: String, suffix: String },
}

impl AllowListEntry {
    /// Parse an exact origin. The value is normalized to the form browsers send
    /// (lowercase host, no trailing slash, default port omitted).
    pub fn exact(raw: &str) -> Result<Self, InvalidEntry> {
        let raw = raw.trim();
        if raw == "*" {
            return Err(InvalidEntry::new(raw, "wildcard origins are not allowed"));
        }
        let url = parse_bare_origin(raw)
            .ok_or_else(|| InvalidEntry::new(raw, "expected an http(s) origin"))?;

        Ok(Self::Exact(url.origin().ascii_serialization()))
    }

    /// Parse a suffix pattern: `*.vercel.app`, `.vercel.app` or `https://*.vercel.app`.
    /// Without a scheme the pattern only matches `https` origins.
    pub fn suffix(raw: &str) -> Result<Self, InvalidEntry> {
        let raw = raw.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("https".to_string(), raw),
        };
        if !matches!(scheme.as_str(), "http" | "https") {
            return Err(InvalidEntry::new(raw, "scheme must be http or https"));
        }

        let suffix = rest
            .strip_prefix("*.")
            .or_else(|| rest.strip_prefix('.'))
            .ok_or_else(|| InvalidEntry::new(raw, "expected `*.` before the domain"))?
            .to_ascii_lowercase();
        if suffix.is_empty() || suffix.contains(['*', '/', ':', '@']) {
            return Err(InvalidEntry::new(raw, "expected a plain domain suffix"));
        }

        // The suffix has to survive URL parsing as the tail of a domain name.
        let probe = Url::parse(&format!("{scheme}://probe.{suffix}"))
            .map_err(|_| InvalidEntry::new(raw, "suffix is not a valid domain"))?;
        match probe.host() {
            Some(Host::Domain(host)) if host == format!("probe.{suffix}") => {}
            _ => return Err(InvalidEntry::new(raw, "suffix is not a valid domain")),
        }

        Ok(Self::Suffix { scheme, suffix })
    }

    fn matches_exact(&self, origin: &str) -> bool {
        matches!(self, Self::Exact(exact) if exact == origin)
    }

    fn matches_suffix(&self, origin: &Url) -> bool {
        let Self::Suffix { scheme, suffix } = self else {
            return false;
        };
        if origin.scheme() != scheme.as_str() || origin.port().is_some() {
            return false;
        }
        let Some(Host::Domain(host)) = origin.host() else {
            return false;
        };

        host.strip_suffix(suffix.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|subdomain| !subdomain.is_empty())
    }
}

/// Outcome of evaluating one request against the policy.
///
/// Invariant: when `allowed` and `allow_credentials` are both true,
/// `origin_to_echo` is `Some` and never `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub origin_to_echo: Option<String>,
    pub allow_credentials: bool,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<HeaderName>,
    pub exposed_headers: Vec<HeaderName>,
    pub max_age_seconds: u64,
    pub preflight: bool,
    pub rejection: Option<OriginRejection>,
}

impl AccessDecision {
    fn same_origin(preflight: bool) -> Self {
        Self {
            allowed: true,
            ..Self::empty(preflight)
        }
    }

    fn rejected(rejection: OriginRejection, preflight: bool) -> Self {
        Self {
            rejection: Some(rejection),
            ..Self::empty(preflight)
        }
    }

    fn empty(preflight: bool) -> Self {
        Self {
            allowed: false,
            origin_to_echo: None,
            allow_credentials: false,
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            max_age_seconds: 0,
            preflight,
            rejection: None,
        }
    }

    /// Whether `Access-Control-Allow-*` headers should be written at all.
    pub fn emits_cors_headers(&self) -> bool {
        self.allowed && self.origin_to_echo.is_some()
    }
}

/// Immutable allow-list and header policy, shared by every request.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_list: Vec<AllowListEntry>,
    allow_credentials: bool,
    allowed_methods: Vec<Method>,
    allowed_headers: Vec<HeaderName>,
    permitted_request_headers: Vec<HeaderName>,
    exposed_headers: Vec<HeaderName>,
    max_age_seconds: u64,
}

impl CorsPolicy {
    pub fn new(config: &crate::config::CorsConfig) -> Self {
        Self {
            allow_list: config.allow_list.clone(),
            allow_credentials: config.allow_credentials,
            allowed_methods: dedup(&config.allowed_methods),
            allowed_headers: dedup(&config.allowed_headers),
            permitted_request_headers: dedup(&config.permitted_request_headers),
            exposed_headers: dedup(&config.exposed_headers),
            max_age_seconds: config.max_age_seconds,
        }
    }

    pub fn allow_list(&self) -> &[AllowListEntry] {
        &self.allow_list
    }

    /// Evaluate one request.
    ///
    /// `requested_headers` are the names listed in a preflight's
    /// `Access-Control-Request-Headers`; only those on the permitted set are echoed.
    pub fn resolve(
        &self,
        origin: Option<&str>,
        request_method: &Method,
        requested_headers: Option<&[HeaderName]>,
    ) -> AccessDecision {
        let preflight = *request_method == Method::OPTIONS;

        let Some(origin) = origin else {
            return AccessDecision::same_origin(preflight);
        };

        if let Err(rejection) = self.match_origin(origin) {
            return AccessDecision::rejected(rejection, preflight);
        }

        AccessDecision {
            allowed: true,
            origin_to_echo: Some(origin.to_string()),
            allow_credentials: self.allow_credentials,
            allowed_methods: self.allowed_methods.clone(),
            allowed_headers: self.allowed_headers_for(requested_headers.unwrap_or_default()),
            exposed_headers: self.exposed_headers.clone(),
            max_age_seconds: self.max_age_seconds,
            preflight,
            rejection: None,
        }
    }

    /// Extract the resolver inputs from request headers and evaluate them.
    pub fn resolve_headers(&self, headers: &HeaderMap, method: &Method) -> AccessDecision {
        let origin = match headers.get(header::ORIGIN).map(|v| v.to_str()) {
            None => None,
            Some(Ok(origin)) => Some(origin),
            Some(Err(_)) => {
                return AccessDecision::rejected(
                    OriginRejection::Malformed,
                    *method == Method::OPTIONS,
                );
            }
        };

        let requested: Vec<HeaderName> = headers
            .get_all(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
            .collect();

        self.resolve(origin, method, Some(requested.as_slice()))
    }

    fn match_origin(&self, origin: &str) -> Result<(), OriginRejection> {
        if self.allow_list.iter().any(|e| e.matches_exact(origin)) {
            return Ok(());
        }

        let url = parse_origin(origin).ok_or(OriginRejection::Malformed)?;
        if self.allow_list.iter().any(|e| e.matches_suffix(&url)) {
            Ok(())
        } else {
            Err(OriginRejection::NotAllowed {
                origin: origin.to_string(),
            })
        }
    }

    fn allowed_headers_for(&self, requested: &[HeaderName]) -> Vec<HeaderName> {
        let mut headers = self.allowed_headers.clone();
        for name in requested {
            if self.permitted_request_headers.contains(name) && !headers.contains(name) {
                headers.push(name.clone());
            }
        }
        headers
    }
}

fn dedup<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Parse an http(s) URL that carries nothing beyond scheme, host and port.
fn parse_bare_origin(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !url.username().is_empty()
        || url.password().is_some()
        || url.path() != "/"
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return None;
    }
    url.host()?;
    Some(url)
}

/// Parse an `Origin` header value. The value must already be in serialized
/// origin form, so `https://a.vercel.app/` or `HTTPS://a.vercel.app` are malformed.
fn parse_origin(raw: &str) -> Option<Url> {
    let url = parse_bare_origin(raw)?;
    (url.origin().ascii_serialization() == raw).then_some(url)
}
