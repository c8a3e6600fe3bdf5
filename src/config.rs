/*
 * Responsibility
 * - Read environment variables (.env is honored via dotenvy)
 * - Validate values up front; an invalid allow-list entry fails startup
 * - Defaults for the frontend deployments so a bare `cargo run` works
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::http::{HeaderName, Method, header};

use crate::services::cors_policy::AllowListEntry;

const FRONTEND_ORIGINS: &[&str] = &[
    "https://agriculture-frontend.vercel.app",
    "https://agriculture-frontend-two.vercel.app",
    "https://agriculture-frontend-btleirx65.vercel.app",
];

const DEVELOPMENT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

const DEFAULT_ORIGIN_SUFFIXES: &[&str] = &["https://*.vercel.app"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str),
    InvalidEntry { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
            ConfigError::InvalidEntry { key, value } => {
                write!(f, "invalid configuration: {}: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Exact origins first, then suffix patterns.
    pub allow_list: Vec<AllowListEntry>,
    pub allow_credentials: bool,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<HeaderName>,
    /// Preflight-requested headers that may be echoed back in addition to `allowed_headers`.
    pub permitted_request_headers: Vec<HeaderName>,
    pub exposed_headers: Vec<HeaderName>,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    /// Production defaults, without any allow-list entry.
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            allow_credentials: true,
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
                Method::HEAD,
            ],
            allowed_headers: vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-requested-with"),
                header::ACCEPT,
                header::ORIGIN,
            ],
            permitted_request_headers: vec![
                header::CACHE_CONTROL,
                header::PRAGMA,
                HeaderName::from_static("x-request-id"),
            ],
            exposed_headers: vec![header::AUTHORIZATION, header::CONTENT_TYPE],
            max_age_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub body_limit_bytes: usize,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors: CorsConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_source<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&var, "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV").as_deref());

        let cors = cors_from_source(&var, app_env)?;

        let defaults = HttpConfig::default();
        let http = HttpConfig {
            body_limit_bytes: parse_or(&var, "HTTP_BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
            timeout: Duration::from_secs(parse_or(
                &var,
                "HTTP_TIMEOUT_SECONDS",
                defaults.timeout.as_secs(),
            )?),
        };

        Ok(Self {
            addr,
            app_env,
            cors,
            http,
        })
    }
}

fn cors_from_source<F>(var: &F, app_env: AppEnv) -> Result<CorsConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = CorsConfig::default();

    // Unset means "use the defaults"; set-but-empty means "allow no origin".
    let mut origins = match var("CORS_ALLOWED_ORIGINS") {
        Some(list) => split_list(&list),
        None => {
            let mut origins: Vec<String> = FRONTEND_ORIGINS.iter().map(|s| s.to_string()).collect();
            if !app_env.is_production() {
                origins.extend(DEVELOPMENT_ORIGINS.iter().map(|s| s.to_string()));
            }
            origins
        }
    };
    if let Some(frontend_url) = var("FRONTEND_URL").filter(|s| !s.trim().is_empty()) {
        origins.push(frontend_url.trim().to_string());
    }

    let suffixes = match var("CORS_ALLOWED_ORIGIN_SUFFIXES") {
        Some(list) => split_list(&list),
        None => DEFAULT_ORIGIN_SUFFIXES.iter().map(|s| s.to_string()).collect(),
    };

    let mut allow_list = Vec::with_capacity(origins.len() + suffixes.len());
    for origin in &origins {
        let entry = AllowListEntry::exact(origin).map_err(|e| ConfigError::InvalidEntry {
            key: "CORS_ALLOWED_ORIGINS",
            value: e.to_string(),
        })?;
        if !allow_list.contains(&entry) {
            allow_list.push(entry);
        }
    }
    for suffix in &suffixes {
        let entry = AllowListEntry::suffix(suffix).map_err(|e| ConfigError::InvalidEntry {
            key: "CORS_ALLOWED_ORIGIN_SUFFIXES",
            value: e.to_string(),
        })?;
        if !allow_list.contains(&entry) {
            allow_list.push(entry);
        }
    }

    let allow_credentials = match var("CORS_ALLOW_CREDENTIALS") {
        Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid("CORS_ALLOW_CREDENTIALS"))?,
        None => defaults.allow_credentials,
    };

    Ok(CorsConfig {
        allow_list,
        allow_credentials,
        allowed_methods: list_or(var, "CORS_ALLOWED_METHODS", defaults.allowed_methods, |s| {
            Method::from_bytes(s.to_ascii_uppercase().as_bytes()).ok()
        })?,
        allowed_headers: list_or(var, "CORS_ALLOWED_HEADERS", defaults.allowed_headers, |s| {
            HeaderName::from_bytes(s.as_bytes()).ok()
        })?,
        permitted_request_headers: list_or(
            var,
            "CORS_PERMITTED_REQUEST_HEADERS",
            defaults.permitted_request_headers,
            |s| HeaderName::from_bytes(s.as_bytes()).ok(),
        )?,
        exposed_headers: list_or(var, "CORS_EXPOSED_HEADERS", defaults.exposed_headers, |s| {
            HeaderName::from_bytes(s.as_bytes()).ok()
        })?,
        max_age_seconds: parse_or(var, "CORS_MAX_AGE_SECONDS", defaults.max_age_seconds)?,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<F, T>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match var(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn list_or<F, T>(
    var: &F,
    key: &'static str,
    default: Vec<T>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(list) = var(key) else {
        return Ok(default);
    };
    split_list(&list)
        .iter()
        .map(|item| {
            parse(item).ok_or_else(|| ConfigError::InvalidEntry {
                key,
                value: item.clone(),
            })
        })
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_in_development() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.app_env, AppEnv::Development);
        assert!(
            config
                .cors
                .allow_list
                .contains(&AllowListEntry::Exact("http://localhost:3000".into()))
        );
        assert!(config.cors.allow_list.contains(&AllowListEntry::Suffix {
            scheme: "https".into(),
            suffix: "vercel.app".into(),
        }));
        assert!(config.cors.allow_credentials);
        assert_eq!(config.cors.max_age_seconds, 3600);
        assert_eq!(config.http.body_limit_bytes, 1024 * 1024);
        assert_eq!(config.http.timeout, Duration::from_secs(30));
    }

    #[test]
    fn production_drops_localhost_defaults() {
        let config = load(&[("APP_ENV", "production")]).unwrap();
        assert!(config.app_env.is_production());
        assert!(
            !config
                .cors
                .allow_list
                .contains(&AllowListEntry::Exact("http://localhost:3000".into()))
        );
        assert!(config.cors.allow_list.contains(&AllowListEntry::Exact(
            "https://agriculture-frontend.vercel.app".into()
        )));
    }

    #[test]
    fn explicit_lists_replace_defaults() {
        let config = load(&[
            ("CORS_ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com/"),
            ("CORS_ALLOWED_ORIGIN_SUFFIXES", ""),
            ("FRONTEND_URL", "https://frontend.example.com"),
            ("CORS_ALLOW_CREDENTIALS", "false"),
            ("CORS_MAX_AGE_SECONDS", "600"),
            ("CORS_ALLOWED_METHODS", "get,post"),
        ])
        .unwrap();

        assert_eq!(
            config.cors.allow_list,
            vec![
                AllowListEntry::Exact("https://a.example.com".into()),
                AllowListEntry::Exact("https://b.example.com".into()),
                AllowListEntry::Exact("https://frontend.example.com".into()),
            ]
        );
        assert!(!config.cors.allow_credentials);
        assert_eq!(config.cors.max_age_seconds, 600);
        assert_eq!(config.cors.allowed_methods, vec![Method::GET, Method::POST]);
    }

    #[test]
    fn empty_origin_list_allows_nothing() {
        let config = load(&[
            ("CORS_ALLOWED_ORIGINS", ""),
            ("CORS_ALLOWED_ORIGIN_SUFFIXES", ""),
        ])
        .unwrap();
        assert!(config.cors.allow_list.is_empty());
    }

    #[test]
    fn wildcard_origin_fails_startup() {
        let err = load(&[("CORS_ALLOWED_ORIGINS", "*")]).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::InvalidEntry {
                key: "CORS_ALLOWED_ORIGINS",
                ..
            }
        ));
    }

    #[test]
    fn invalid_values_fail_startup() {
        assert!(matches!(
            load(&[("PORT", "http")]),
            Err(ConfigError::Invalid("PORT"))
        ));
        assert!(matches!(
            load(&[("CORS_ALLOW_CREDENTIALS", "maybe")]),
            Err(ConfigError::Invalid("CORS_ALLOW_CREDENTIALS"))
        ));
        assert!(matches!(
            load(&[("CORS_ALLOWED_ORIGIN_SUFFIXES", "vercel.app")]),
            Err(ConfigError::InvalidEntry { .. })
        ));
        assert!(matches!(
            load(&[("CORS_EXPOSED_HEADERS", "bad header")]),
            Err(ConfigError::InvalidEntry { .. })
        ));
    }
}
