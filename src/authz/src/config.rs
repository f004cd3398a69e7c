//! Runtime configuration
//!
//! Every section has a `Default`; [`AuthzConfig::from_env`] overlays
//! `APIGOV_*` environment variables on top of the defaults.

use serde::{Deserialize, Serialize};

/// Default department fast-path prefixes
pub const DEFAULT_FAST_PATH_PREFIXES: &[&str] =
    &["/api/v1/dashboard/", "/api/v1/business/", "/api/v1/api/"];

/// Paths under a fast-path prefix that still go through rule evaluation
pub const DEFAULT_FAST_PATH_EXCLUSIONS: &[&str] = &["/api/v1/api/category"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    pub token: TokenConfig,
    pub fast_path: FastPathConfig,
    pub evaluator: EvaluatorConfig,
    pub log: LogConfig,
}

/// Bearer token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC secret
    pub secret: String,

    /// `iss` claim
    pub issuer: String,

    /// Default token lifetime in hours
    pub ttl_hours: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            issuer: "api-auth-system".to_string(),
            ttl_hours: 24,
        }
    }
}

/// Department fast-path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPathConfig {
    pub enabled: bool,
    pub prefixes: Vec<String>,
    pub exclusions: Vec<String>,
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefixes: DEFAULT_FAST_PATH_PREFIXES.iter().map(|s| s.to_string()).collect(),
            exclusions: DEFAULT_FAST_PATH_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FastPathConfig {
    /// Whether `path` qualifies for the department fast path
    pub fn matches(&self, path: &str) -> bool {
        self.enabled
            && self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
            && !self.exclusions.iter().any(|e| path.starts_with(e.as_str()))
    }
}

/// Evaluator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Refuse a reload that would replace a non-empty snapshot with an empty one
    pub refuse_empty_reload: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            refuse_empty_reload: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl AuthzConfig {
    /// Load configuration from the environment
    ///
    /// | variable | field |
    /// |---|---|
    /// | `APIGOV_JWT_SECRET` | `token.secret` |
    /// | `APIGOV_JWT_ISSUER` | `token.issuer` |
    /// | `APIGOV_TOKEN_TTL_HOURS` | `token.ttl_hours` |
    /// | `APIGOV_FAST_PATH_ENABLED` | `fast_path.enabled` |
    /// | `APIGOV_FAST_PATH_PREFIXES` | `fast_path.prefixes` (comma separated) |
    /// | `APIGOV_FAST_PATH_EXCLUSIONS` | `fast_path.exclusions` (comma separated) |
    /// | `APIGOV_REFUSE_EMPTY_RELOAD` | `evaluator.refuse_empty_reload` |
    /// | `APIGOV_LOG_LEVEL` | `log.level` |
    /// | `APIGOV_LOG_JSON` | `log.json` |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("APIGOV_JWT_SECRET") {
            config.token.secret = secret;
        }
        if let Ok(issuer) = std::env::var("APIGOV_JWT_ISSUER") {
            config.token.issuer = issuer;
        }
        config.token.ttl_hours = env_parse("APIGOV_TOKEN_TTL_HOURS").unwrap_or(config.token.ttl_hours);

        config.fast_path.enabled =
            env_parse("APIGOV_FAST_PATH_ENABLED").unwrap_or(config.fast_path.enabled);
        if let Some(prefixes) = env_list("APIGOV_FAST_PATH_PREFIXES") {
            config.fast_path.prefixes = prefixes;
        }
        if let Some(exclusions) = env_list("APIGOV_FAST_PATH_EXCLUSIONS") {
            config.fast_path.exclusions = exclusions;
        }

        config.evaluator.refuse_empty_reload = env_parse("APIGOV_REFUSE_EMPTY_RELOAD")
            .unwrap_or(config.evaluator.refuse_empty_reload);

        if let Ok(level) = std::env::var("APIGOV_LOG_LEVEL") {
            config.log.level = level;
        }
        config.log.json = env_parse("APIGOV_LOG_JSON").unwrap_or(config.log.json);

        config
    }
}
