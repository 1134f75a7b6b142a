use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Organizations are served from `{domain}.{base_domain}`; shared
    /// provider logins finish on the base domain itself.
    pub base_domain: String,
    /// `https` unless running locally without TLS.
    pub public_scheme: String,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub pagination: PaginationConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub signing_secret: String,
    pub expiry_minutes: i64,
    /// How long an unfinished OIDC login stays valid.
    pub handshake_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub grant_list_max_entries: usize,
    pub grant_list_ttl_seconds: u64,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            base_domain: get_env("BASE_DOMAIN", Some("localhost"), is_prod)?,
            public_scheme: get_env("PUBLIC_SCHEME", Some("https"), false)?,
            session: SessionConfig {
                signing_secret: get_env("SESSION_SIGNING_SECRET", None, is_prod)?,
                expiry_minutes: parse_env("SESSION_EXPIRY_MINUTES", "720", is_prod)?,
                handshake_ttl_minutes: parse_env("HANDSHAKE_TTL_MINUTES", "10", false)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                login_window_seconds: get_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            pagination: PaginationConfig {
                default_limit: parse_env("DEFAULT_PAGE_LIMIT", "100", false)?,
                max_limit: parse_env("MAX_PAGE_LIMIT", "1000", false)?,
            },
            cache: CacheConfig {
                grant_list_max_entries: parse_env("GRANT_CACHE_MAX_ENTRIES", "1024", false)?,
                grant_list_ttl_seconds: parse_env("GRANT_CACHE_TTL_SECONDS", "60", false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.base_domain.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BASE_DOMAIN must not be empty"
            )));
        }

        if self.session.expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.session.handshake_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HANDSHAKE_TTL_MINUTES must be positive"
            )));
        }

        if self.session.signing_secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_SIGNING_SECRET must be at least 32 bytes"
            )));
        }

        if self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_PAGE_LIMIT must be between 1 and MAX_PAGE_LIMIT"
            )));
        }

        if self.cache.grant_list_max_entries == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GRANT_CACHE_MAX_ENTRIES must be greater than 0"
            )));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.public_scheme != "https" {
                tracing::error!("PUBLIC_SCHEME is not https in production; cookies will not be marked secure");
            }
        }

        Ok(())
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.public_scheme == "https"
    }

    /// Settings for local development and tests, served under `base_domain`.
    pub fn local(base_domain: &str) -> Self {
        AccessConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "access-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            base_domain: base_domain.to_string(),
            public_scheme: "https".to_string(),
            session: SessionConfig {
                signing_secret: "local-development-signing-secret-0123456789".to_string(),
                expiry_minutes: 720,
                handshake_ttl_minutes: 10,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            rate_limit: RateLimitConfig {
                login_attempts: 10,
                login_window_seconds: 60,
            },
            pagination: PaginationConfig {
                default_limit: 100,
                max_limit: 1000,
            },
            cache: CacheConfig {
                grant_list_max_entries: 1024,
                grant_list_ttl_seconds: 60,
            },
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
