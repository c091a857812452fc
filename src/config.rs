use std::{
    collections::HashSet, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ATTACHMENTS_PER_NOTE: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 10;
pub const DEFAULT_LOGIN_WINDOW_SECS: u64 = 60;

/// Room for the non-file multipart fields and part headers of a note upload.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("JWT_SECRET value is too weak; provide at least 32 random characters")]
    WeakJwtSecret,
}

/// Process-wide settings, read once at startup and shared read-only.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub max_attachment_bytes: usize,
    pub max_attachments_per_note: usize,
    pub request_timeout: Duration,
    pub token_ttl: Option<chrono::Duration>,
    pub static_dir: PathBuf,
    /// Login requests allowed per client IP within `login_window`.
    pub login_attempts: NonZeroU32,
    pub login_window: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("max_attachment_bytes", &self.max_attachment_bytes)
            .field("max_attachments_per_note", &self.max_attachments_per_note)
            .field("request_timeout", &self.request_timeout)
            .field("token_ttl", &self.token_ttl)
            .field("static_dir", &self.static_dir)
            .field("login_attempts", &self.login_attempts)
            .field("login_window", &self.login_window)
            .finish()
    }
}

impl AppConfig {
    /// Loads `.env` (if present) and builds the configuration from the
    /// process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        ensure_secret_strength(&jwt_secret)?;

        let bind_addr = parse_or(&lookup, "BIND_ADDR", || {
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
        })?;

        let max_attachment_bytes = parse_or(&lookup, "MAX_ATTACHMENT_BYTES", || {
            DEFAULT_MAX_ATTACHMENT_BYTES
        })?;
        if max_attachment_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_ATTACHMENT_BYTES",
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_attachments_per_note = parse_or(&lookup, "MAX_ATTACHMENTS_PER_NOTE", || {
            DEFAULT_MAX_ATTACHMENTS_PER_NOTE
        })?;

        let timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", || {
            DEFAULT_REQUEST_TIMEOUT_SECS
        })?;

        let token_ttl = match lookup("TOKEN_TTL_HOURS") {
            Some(raw) if !raw.trim().is_empty() => {
                let hours: i64 = parse_value("TOKEN_TTL_HOURS", &raw)?;
                if hours <= 0 {
                    return Err(ConfigError::Invalid {
                        name: "TOKEN_TTL_HOURS",
                        reason: "must be a positive number of hours".to_string(),
                    });
                }
                Some(chrono::Duration::hours(hours))
            }
            _ => None,
        };

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let login_attempts = parse_or(&lookup, "LOGIN_RATE_LIMIT", || {
            NonZeroU32::new(DEFAULT_LOGIN_ATTEMPTS).unwrap_or(NonZeroU32::MIN)
        })?;

        let login_window_secs = parse_or(&lookup, "LOGIN_RATE_WINDOW_SECS", || {
            DEFAULT_LOGIN_WINDOW_SECS
        })?;
        if login_window_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "LOGIN_RATE_WINDOW_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            max_attachment_bytes,
            max_attachments_per_note,
            request_timeout: Duration::from_secs(timeout_secs),
            token_ttl,
            static_dir,
            login_attempts,
            login_window: Duration::from_secs(login_window_secs),
        })
    }

    /// Upper bound for a whole request body, sized for a note upload that
    /// carries the maximum number of maximum-size attachments.
    pub fn max_request_body_bytes(&self) -> usize {
        self.max_attachment_bytes
            .saturating_mul(self.max_attachments_per_note.max(1))
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

fn parse_or<T, F, D>(lookup: &F, name: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> T,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default()),
    }
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn ensure_secret_strength(secret: &str) -> Result<(), ConfigError> {
    let trimmed = secret.trim();
    if trimmed.len() < 32 {
        return Err(ConfigError::WeakJwtSecret);
    }

    let unique_chars = trimmed.chars().collect::<HashSet<_>>();
    if unique_chars.len() < 8 {
        return Err(ConfigError::WeakJwtSecret);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/notewell_test".to_string(),
        jwt_secret: "k3y-for-tests-0123456789-abcdefghijklmnop".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
        max_attachment_bytes: 64,
        max_attachments_per_note: DEFAULT_MAX_ATTACHMENTS_PER_NOTE,
        request_timeout: Duration::from_secs(5),
        token_ttl: None,
        static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        login_attempts: NonZeroU32::new(DEFAULT_LOGIN_ATTEMPTS).unwrap(),
        login_window: Duration::from_secs(DEFAULT_LOGIN_WINDOW_SECS),
    }
}
