use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Secrets that must never be used outside local development.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "change-me-to-a-random-string", DEV_SECRET];

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_expire_minutes: i64,
    /// `None` means any origin.
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("YAARFETCH_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("YAARFETCH_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("YAARFETCH_PORT must be a port number")?;
        let db_path: PathBuf = get("YAARFETCH_DB_PATH")
            .unwrap_or_else(|| "yaarfetch.db".into())
            .into();
        let token_expire_minutes: i64 = get("YAARFETCH_TOKEN_EXPIRE_MINUTES")
            .unwrap_or_else(|| "1440".into())
            .parse()
            .context("YAARFETCH_TOKEN_EXPIRE_MINUTES must be a whole number of minutes")?;
        if token_expire_minutes <= 0 {
            anyhow::bail!("YAARFETCH_TOKEN_EXPIRE_MINUTES must be positive");
        }

        let jwt_secret = match get("YAARFETCH_JWT_SECRET") {
            Some(s) if !s.is_empty() && !PLACEHOLDER_SECRETS.contains(&s.as_str()) => s,
            other => {
                warn!("YAARFETCH_JWT_SECRET is unset or a placeholder; tokens are forgeable");
                other.filter(|s| !s.is_empty()).unwrap_or_else(|| DEV_SECRET.into())
            }
        };

        let allowed_origins = parse_origins(&get("YAARFETCH_ALLOWED_ORIGINS").unwrap_or_default());

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_expire_minutes,
            allowed_origins,
        })
    }
}

/// `*` (or nothing) allows every origin, otherwise a comma-separated list.
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return None;
    }
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect(),
    )
}
