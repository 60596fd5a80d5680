use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Use `x-forwarded-for` / `x-real-ip` for the client identity.
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Store of record; `None` runs the gateway on the in-memory catalog.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Remote cache backend; `None` keeps entries in process memory.
    pub redis_url: Option<String>,
    pub op_timeout_ms: u64,
    /// Deadline for each post-commit delete or prefix sweep.
    pub purge_timeout_ms: u64,
    pub aggregate_ttl_secs: u64,
    pub entity_ttl_secs: u64,
    pub listing_ttl_secs: u64,
    pub page_size: u32,
    pub featured_limit: u32,
    pub category_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub token_ttl_minutes: u64,
    pub admin_role: String,
    pub login_path: String,
    pub secure_cookies: bool,
    pub enable_audit_logging: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingSecret,

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl DatabaseConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn purge_timeout(&self) -> Duration {
        Duration::from_millis(self.purge_timeout_ms)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::for_environment(environment).with_env_overrides()
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::Invalid { field: "rate_limit.capacity", reason: "must be at least 1" });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid { field: "rate_limit.window_secs", reason: "must be at least 1" });
        }
        if self.cache.purge_timeout_ms < self.cache.op_timeout_ms {
            return Err(ConfigError::Invalid { field: "cache.purge_timeout_ms", reason: "must not be below cache.op_timeout_ms" });
        }
        if self.cache.page_size == 0 {
            return Err(ConfigError::Invalid { field: "cache.page_size", reason: "must be at least 1" });
        }
        if self.security.token_ttl_minutes == 0 {
            return Err(ConfigError::Invalid { field: "security.token_ttl_minutes", reason: "must be at least 1" });
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_TRUST_FORWARDED_HEADERS") {
            self.server.trust_forwarded_headers = v.parse().unwrap_or(self.server.trust_forwarded_headers);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs = v.parse().unwrap_or(self.database.connection_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms = v.parse().unwrap_or(self.database.statement_timeout_ms);
        }

        // Cache overrides
        if let Ok(v) = env::var("REDIS_URL") {
            self.cache.redis_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("CACHE_OP_TIMEOUT_MS") {
            self.cache.op_timeout_ms = v.parse().unwrap_or(self.cache.op_timeout_ms);
        }
        if let Ok(v) = env::var("CACHE_PURGE_TIMEOUT_MS") {
            self.cache.purge_timeout_ms = v.parse().unwrap_or(self.cache.purge_timeout_ms);
        }
        if let Ok(v) = env::var("CACHE_AGGREGATE_TTL_SECS") {
            self.cache.aggregate_ttl_secs = v.parse().unwrap_or(self.cache.aggregate_ttl_secs);
        }
        if let Ok(v) = env::var("CACHE_ENTITY_TTL_SECS") {
            self.cache.entity_ttl_secs = v.parse().unwrap_or(self.cache.entity_ttl_secs);
        }
        if let Ok(v) = env::var("CACHE_LISTING_TTL_SECS") {
            self.cache.listing_ttl_secs = v.parse().unwrap_or(self.cache.listing_ttl_secs);
        }
        if let Ok(v) = env::var("CATALOG_PAGE_SIZE") {
            self.cache.page_size = v.parse().unwrap_or(self.cache.page_size);
        }
        if let Ok(v) = env::var("CATALOG_FEATURED_LIMIT") {
            self.cache.featured_limit = v.parse().unwrap_or(self.cache.featured_limit);
        }
        if let Ok(v) = env::var("CATALOG_CATEGORY_LIMIT") {
            self.cache.category_limit = v.parse().unwrap_or(self.cache.category_limit);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_CAPACITY") {
            self.rate_limit.capacity = v.parse().unwrap_or(self.rate_limit.capacity);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = v.parse().unwrap_or(self.rate_limit.window_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            self.rate_limit.sweep_interval_secs = v.parse().unwrap_or(self.rate_limit.sweep_interval_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRES_IN_MINUTES") {
            self.security.token_ttl_minutes = v.parse().unwrap_or(self.security.token_ttl_minutes);
        }
        if let Ok(v) = env::var("SECURITY_ADMIN_ROLE") {
            self.security.admin_role = v;
        }
        if let Ok(v) = env::var("SECURITY_LOGIN_PATH") {
            self.security.login_path = v;
        }
        if let Ok(v) = env::var("SECURITY_SECURE_COOKIES") {
            self.security.secure_cookies = v.parse().unwrap_or(self.security.secure_cookies);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                trust_forwarded_headers: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout_secs: 30,
                statement_timeout_ms: 5_000,
            },
            cache: CacheConfig {
                redis_url: None,
                op_timeout_ms: 250,
                purge_timeout_ms: 2_000,
                aggregate_ttl_secs: 300,
                entity_ttl_secs: 600,
                listing_ttl_secs: 120,
                page_size: 9,
                featured_limit: 8,
                category_limit: 6,
            },
            rate_limit: RateLimitConfig {
                capacity: 10,
                window_secs: 30,
                sweep_interval_secs: 60,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl_minutes: 15,
                admin_role: "admin".to_string(),
                login_path: "/login".to_string(),
                secure_cookies: false,
                enable_audit_logging: false,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                trust_forwarded_headers: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout_secs: 10,
                statement_timeout_ms: 3_000,
            },
            cache: CacheConfig {
                redis_url: None,
                op_timeout_ms: 150,
                purge_timeout_ms: 3_000,
                aggregate_ttl_secs: 600,
                entity_ttl_secs: 1_800,
                listing_ttl_secs: 300,
                page_size: 9,
                featured_limit: 8,
                category_limit: 6,
            },
            rate_limit: RateLimitConfig {
                capacity: 20,
                window_secs: 10,
                sweep_interval_secs: 60,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl_minutes: 15,
                admin_role: "admin".to_string(),
                login_path: "/login".to_string(),
                secure_cookies: true,
                enable_audit_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3000,
                trust_forwarded_headers: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout_secs: 5,
                statement_timeout_ms: 2_000,
            },
            cache: CacheConfig {
                redis_url: None,
                op_timeout_ms: 100,
                purge_timeout_ms: 5_000,
                aggregate_ttl_secs: 900,
                entity_ttl_secs: 3_600,
                listing_ttl_secs: 600,
                page_size: 9,
                featured_limit: 8,
                category_limit: 6,
            },
            rate_limit: RateLimitConfig {
                capacity: 10,
                window_secs: 30,
                sweep_interval_secs: 120,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl_minutes: 15,
                admin_role: "admin".to_string(),
                login_path: "/login".to_string(),
                secure_cookies: true,
                enable_audit_logging: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.cache.page_size, 9);
        assert_eq!(config.rate_limit.capacity, 10);
        assert!(config.database.url.is_none());
        assert!(!config.security.secure_cookies);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.security.secure_cookies);
        assert!(config.cache.op_timeout() < config.database.statement_timeout());
        assert!(config.cache.purge_timeout() > config.cache.op_timeout());
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = AppConfig::development();
        assert_eq!(config.validate(), Err(ConfigError::MissingSecret));

        let mut config = AppConfig::development();
        config.security.jwt_secret = "s3cret".to_string();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_purge_deadline_below_read_deadline() {
        let mut config = AppConfig::production();
        config.security.jwt_secret = "s3cret".to_string();
        config.cache.purge_timeout_ms = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "cache.purge_timeout_ms", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::staging();
        config.security.jwt_secret = "s3cret".to_string();
        config.rate_limit.window_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "rate_limit.window_secs", .. })
        ));
    }
}
