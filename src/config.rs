use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use rocket::figment::Figment;
use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://challenges.db?mode=rwc";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub cors_origin: String,
    /// Base64 encoded key for Rocket's private cookies. Rocket generates an
    /// ephemeral key in debug builds when this is unset.
    pub secret_key: Option<String>,
    pub address: String,
    pub port: u16,
    pub session_ttl_hours: i64,
    pub auto_migrate: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            secret_key: None,
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            auto_migrate: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let session_ttl_hours: i64 =
            parse_var("SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(AppError::Internal(format!(
                "SESSION_TTL_HOURS must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS, session_ttl_hours
            )));
        }

        Ok(Self {
            database_url: string_var("DATABASE_URL", &defaults.database_url),
            cors_origin: string_var("CORS_ORIGINS", &defaults.cors_origin),
            secret_key: dotenvy::var("SECRET_KEY").ok().filter(|s| !s.is_empty()),
            address: string_var("ADDRESS", &defaults.address),
            port: parse_var("PORT", defaults.port)?,
            session_ttl_hours,
            auto_migrate: parse_var("AUTO_MIGRATE", defaults.auto_migrate)?,
        })
    }

    /// Layers the listening address and cookie secret over Rocket's own figment.
    pub fn figment(&self) -> Figment {
        let figment = rocket::Config::figment()
            .merge(("address", self.address.clone()))
            .merge(("port", self.port));

        match &self.secret_key {
            Some(key) => figment.merge(("secret_key", key.clone())),
            None => figment,
        }
    }
}

fn string_var(key: &str, default: &str) -> String {
    dotenvy::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_var<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match dotenvy::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Internal(format!("Invalid value for {}: {}", key, e))
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
