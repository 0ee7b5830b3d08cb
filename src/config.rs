use std::{fmt, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

/// Which flavour of the application is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Registration and login only, no session state.
    Basic,
    /// Sessions, Google sign-in and the secrets board.
    Extended,
}

impl FromStr for Variant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Variant::Basic),
            "extended" => Ok(Variant::Extended),
            other => anyhow::bail!("unknown APP_VARIANT `{other}` (expected basic or extended)"),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Basic => f.write_str("basic"),
            Variant::Extended => f.write_str("extended"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub variant: Variant,
    pub database_url: Option<String>,
    pub session: SessionConfig,
    pub google: Option<GoogleConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let variant = match get("APP_VARIANT") {
            Some(v) => v.parse()?,
            None => Variant::Extended,
        };

        let secret = get("SESSION_SECRET")
            .or_else(|| get("SECRET"))
            .context("SESSION_SECRET (or SECRET) must be set")?;

        let session = SessionConfig {
            secret,
            issuer: get("SESSION_ISSUER").unwrap_or_else(|| "secrets".into()),
            audience: get("SESSION_AUDIENCE").unwrap_or_else(|| "secrets-web".into()),
            ttl_minutes: get("SESSION_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|m| *m > 0)
                .unwrap_or(60 * 24 * 7),
            secure_cookies: get("COOKIE_SECURE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let google = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url: get("GOOGLE_REDIRECT_URL")
                    .unwrap_or_else(|| "http://localhost:3000/auth/google/secrets".into()),
            }),
            (None, None) => None,
            _ => anyhow::bail!("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set together"),
        };

        Ok(Self {
            variant,
            database_url: get("DATABASE_URL"),
            session,
            google,
        })
    }
}
