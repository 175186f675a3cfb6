//! Environment-driven configuration.
//!
//! Every key has a development default; in production missing keys fail
//! startup instead of silently defaulting.

use crate::services::ServiceError;
use std::env;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub tenant_directory: CollaboratorConfig,
    pub notification: CollaboratorConfig,
    pub audit: CollaboratorConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
}

/// Endpoint of an external collaborator service.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| ServiceError::Config(e))?;
        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
            },
            tenant_directory: CollaboratorConfig {
                base_url: get_env("TENANT_DIRECTORY_URL", Some("http://localhost:8081"), is_prod)?,
                timeout_seconds: parse_env("TENANT_DIRECTORY_TIMEOUT_SECONDS", Some("5"), is_prod)?,
            },
            notification: CollaboratorConfig {
                base_url: get_env("NOTIFICATION_URL", Some("http://localhost:8082"), is_prod)?,
                timeout_seconds: parse_env("NOTIFICATION_TIMEOUT_SECONDS", Some("5"), is_prod)?,
            },
            audit: CollaboratorConfig {
                base_url: get_env("AUDIT_URL", Some("http://localhost:8083"), is_prod)?,
                timeout_seconds: parse_env("AUDIT_TIMEOUT_SECONDS", Some("5"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.port == 0 {
            return Err(ServiceError::Config(
                "PORT must be greater than 0".to_string(),
            ));
        }

        if self.jwt.secret.len() < 32 {
            return Err(ServiceError::Config(
                "JWT_SECRET must be at least 32 bytes".to_string(),
            ));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(ServiceError::Config(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(ServiceError::Config(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive".to_string(),
            ));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(ServiceError::Config(
                "Wildcard CORS origin not allowed in production".to_string(),
            ));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ServiceError::Config(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ServiceError::Config(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, ServiceError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| ServiceError::Config(format!("Invalid {}: {}", key, e)))
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
