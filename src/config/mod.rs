use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::auth::password;
use crate::filter::FilterOptions;
use crate::store::StoragePolicy;

/// Secret used when none is configured. Refused outside development.
pub const DEV_JWT_SECRET: &str = "uigisc-development-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub resources_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// No URL means the in-memory backend
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub operation_timeout_ms: u64,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    /// When set, tokens are checked remotely instead of by signature
    pub introspection_url: Option<String>,
    pub verify_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// Lifetime of tokens minted at login and by the CLI
    pub token_expiry_minutes: i64,
    /// bcrypt cost for stored password hashes
    pub password_cost: u32,
    /// Accounts registered with these emails get the admin role
    pub admin_emails: Vec<String>,
    pub allow_registration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_nested_depth: usize,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::preset(environment).with_env_overrides()
    }

    pub fn preset(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply per-key overrides. Unparseable values keep the preset.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn set<T: FromStr>(target: &mut T, value: Option<String>) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *target = parsed;
            }
        }

        // Storage overrides
        if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.storage.database_url = Some(v);
        }
        set(&mut self.storage.max_connections, lookup("DATABASE_MAX_CONNECTIONS"));
        set(&mut self.storage.connect_timeout_secs, lookup("DATABASE_CONNECTION_TIMEOUT"));
        set(&mut self.storage.operation_timeout_ms, lookup("STORAGE_TIMEOUT_MS"));
        set(&mut self.storage.retry_delay_ms, lookup("STORAGE_RETRY_DELAY_MS"));

        // Auth overrides
        if let Some(v) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = v;
        }
        set(&mut self.auth.jwt_algorithm, lookup("JWT_ALGORITHM"));
        if let Some(v) = lookup("AUTH_INTROSPECTION_URL").filter(|v| !v.trim().is_empty()) {
            self.auth.introspection_url = Some(v);
        }
        set(&mut self.auth.verify_timeout_ms, lookup("AUTH_VERIFY_TIMEOUT_MS"));
        set(&mut self.auth.cache_ttl_secs, lookup("AUTH_CACHE_TTL_SECS"));
        set(&mut self.auth.cache_capacity, lookup("AUTH_CACHE_CAPACITY"));
        set(&mut self.auth.token_expiry_minutes, lookup("JWT_EXPIRY_MINUTES"));
        set(&mut self.auth.password_cost, lookup("AUTH_PASSWORD_COST"));
        set(&mut self.auth.allow_registration, lookup("AUTH_ALLOW_REGISTRATION"));
        if let Some(v) = lookup("ADMIN_EMAILS") {
            self.auth.admin_emails = split_list(&v);
        }

        // API overrides
        set(&mut self.api.port, lookup("UIGISC_API_PORT").or_else(|| lookup("PORT")));
        set(&mut self.api.default_page_size, lookup("API_DEFAULT_PAGE_SIZE"));
        set(&mut self.api.max_page_size, lookup("API_MAX_PAGE_SIZE"));
        set(&mut self.api.max_nested_depth, lookup("FILTER_MAX_NESTED_DEPTH"));
        set(&mut self.api.max_request_size_bytes, lookup("API_MAX_REQUEST_SIZE_BYTES"));

        // Security overrides
        set(&mut self.security.enable_cors, lookup("SECURITY_ENABLE_CORS"));
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        if let Some(v) = lookup("RESOURCES_FILE").filter(|v| !v.trim().is_empty()) {
            self.resources_file = PathBuf::from(v);
        }

        self
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Development
            && self.auth.jwt_secret == DEV_JWT_SECRET
            && self.auth.introspection_url.is_none()
        {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        self.jwt_algorithm()?;

        // Only development may fall back to the in-memory store
        if self.environment != Environment::Development && self.storage.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if let Some(database_url) = &self.storage.database_url {
            url::Url::parse(database_url).map_err(|e| ConfigError::Invalid {
                key: "DATABASE_URL",
                reason: e.to_string(),
            })?;
        }
        if let Some(endpoint) = &self.auth.introspection_url {
            self.introspection_endpoint(endpoint)?;
        }
        if !(password::MIN_COST..=password::MAX_COST).contains(&self.auth.password_cost) {
            return Err(ConfigError::Invalid {
                key: "AUTH_PASSWORD_COST",
                reason: format!("must be between {} and {}", password::MIN_COST, password::MAX_COST),
            });
        }
        if self.api.default_page_size == 0 || self.api.default_page_size > self.api.max_page_size {
            return Err(ConfigError::Invalid {
                key: "API_DEFAULT_PAGE_SIZE",
                reason: format!("must be between 1 and {}", self.api.max_page_size),
            });
        }
        Ok(())
    }

    pub fn jwt_algorithm(&self) -> Result<Algorithm, ConfigError> {
        match Algorithm::from_str(&self.auth.jwt_algorithm) {
            Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
            _ => Err(ConfigError::Invalid {
                key: "JWT_ALGORITHM",
                reason: format!("unsupported algorithm {}", self.auth.jwt_algorithm),
            }),
        }
    }

    pub fn introspection_endpoint(&self, raw: &str) -> Result<url::Url, ConfigError> {
        url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
            key: "AUTH_INTROSPECTION_URL",
            reason: e.to_string(),
        })
    }

    pub fn storage_policy(&self) -> StoragePolicy {
        StoragePolicy {
            timeout: Duration::from_millis(self.storage.operation_timeout_ms),
            retry_delay: Duration::from_millis(self.storage.retry_delay_ms),
        }
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            max_nested_depth: self.api.max_nested_depth,
            default_limit: self.api.default_page_size,
            max_limit: self.api.max_page_size,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            storage: StorageConfig {
                database_url: None,
                max_connections: 10,
                connect_timeout_secs: 30,
                operation_timeout_ms: 5_000,
                retry_delay_ms: 100,
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                introspection_url: None,
                verify_timeout_ms: 2_000,
                cache_ttl_secs: 0,
                cache_capacity: 0,
                token_expiry_minutes: 1440, // 24 hours
                password_cost: 10,
                admin_emails: vec!["admin@uigisc.com".to_string()],
                allow_registration: true,
            },
            api: ApiConfig {
                port: 8000,
                default_page_size: 20,
                max_page_size: 1000,
                max_nested_depth: 10,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            resources_file: PathBuf::from("config/resources.yaml"),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            storage: StorageConfig {
                database_url: None,
                max_connections: 20,
                connect_timeout_secs: 10,
                operation_timeout_ms: 3_000,
                retry_delay_ms: 100,
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                introspection_url: None,
                verify_timeout_ms: 1_000,
                cache_ttl_secs: 30,
                cache_capacity: 1_000,
                token_expiry_minutes: 1440,
                password_cost: 12,
                admin_emails: vec!["admin@uigisc.com".to_string()],
                allow_registration: true,
            },
            api: ApiConfig {
                port: 8000,
                default_page_size: 20,
                max_page_size: 500,
                max_nested_depth: 5,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.uigisc.com".to_string()],
            },
            resources_file: PathBuf::from("config/resources.yaml"),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            storage: StorageConfig {
                database_url: None,
                max_connections: 50,
                connect_timeout_secs: 5,
                operation_timeout_ms: 2_000,
                retry_delay_ms: 50,
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                introspection_url: None,
                verify_timeout_ms: 1_000,
                cache_ttl_secs: 60,
                cache_capacity: 10_000,
                token_expiry_minutes: 240,
                password_cost: 12,
                admin_emails: vec!["admin@uigisc.com".to_string()],
                allow_registration: true,
            },
            api: ApiConfig {
                port: 8000,
                default_page_size: 20,
                max_page_size: 100,
                max_nested_depth: 3,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://uigisc.com".to_string()],
            },
            resources_file: PathBuf::from("config/resources.yaml"),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
