//! # Configuración
//!
//! Todo se lee de variables de entorno (con `.env` cargado por `dotenvy` en
//! `main`). Cada valor ausente toma su default y queda registrado en el log.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Valor inválido para '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            "memory" => Ok(Self::Memory),
            other => Err(format!("backend desconocido '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub bind_address: String,
    pub storage_backend: StorageBackend,
    pub storage_timeout: Duration,
    pub session_ttl: Duration,
    pub in_production: bool,
    pub mail_from: String,
    pub owner_email: String,
    pub static_dir: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración desde cualquier fuente clave/valor
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs: u64 = try_load(&lookup, "STORAGE_TIMEOUT_SECS", "3")?;
        let ttl_secs: u64 = try_load(&lookup, "SESSION_TTL_SECS", "86400")?;

        Ok(Self {
            mongodb_uri: try_load(&lookup, "MONGODB_URI", "mongodb://localhost:27017")?,
            mongodb_database: try_load(&lookup, "MONGODB_DATABASE", "hotel_bookings")?,
            bind_address: try_load(&lookup, "BIND_ADDRESS", "0.0.0.0:8080")?,
            storage_backend: try_load(&lookup, "STORAGE_BACKEND", "mongodb")?,
            storage_timeout: Duration::from_secs(timeout_secs),
            session_ttl: Duration::from_secs(ttl_secs),
            in_production: try_load(&lookup, "IN_PRODUCTION", "false")?,
            mail_from: try_load(&lookup, "MAIL_FROM", "me@here.com")?,
            owner_email: try_load(&lookup, "OWNER_EMAIL", "me@there.com")?,
            static_dir: try_load(&lookup, "STATIC_DIR", "./static")?,
            admin_email: lookup("ADMIN_EMAIL").filter(|v| !v.trim().is_empty()),
            admin_password: lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}
