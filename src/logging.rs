use std::{fmt, net::IpAddr};

use uuid::Uuid;

use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

/// Installs the global subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    subscriber_fmt().with_env_filter(filter).init();
}

/// Sanitized wrapper for usernames that shows only first and last character
#[derive(Debug, Clone)]
pub struct SanitizedUsername(String);

impl SanitizedUsername {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self(Self::sanitize(&username))
    }

    fn sanitize(username: &str) -> String {
        let mut chars = username.chars();
        let len = username.chars().count();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) if len > 4 => format!("{}***{}", first, last),
            (Some(first), _) if len > 2 => format!("{}***", first),
            _ => "*".repeat(len),
        }
    }
}

impl fmt::Display for SanitizedUsername {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrapper for UUIDs that are safe to log
#[derive(Debug, Clone, Copy)]
pub struct LoggableUuid(pub Uuid);

impl fmt::Display for LoggableUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client address with the host part masked: the last IPv4 octet or the
/// last IPv6 segment.
#[derive(Debug, Clone, Copy)]
pub struct SanitizedIpAddr(IpAddr);

impl SanitizedIpAddr {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl fmt::Display for SanitizedIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            IpAddr::V4(v4) => {
                let [a, b, c, _] = v4.octets();
                write!(f, "{a}.{b}.{c}.***")
            }
            IpAddr::V6(v6) => {
                for segment in &v6.segments()[..7] {
                    write!(f, "{segment:x}:")?;
                }
                f.write_str("****")
            }
        }
    }
}

/// Security event types for structured logging
#[derive(Debug, Clone, Copy)]
pub enum SecurityEvent {
    LoginSuccess,
    LoginFailure,
    UserCreated,
    TokenValidationFailure,
    MissingAuthHeader,
    RateLimitExceeded,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::LoginSuccess => "login_success",
            SecurityEvent::LoginFailure => "login_failure",
            SecurityEvent::UserCreated => "user_created",
            SecurityEvent::TokenValidationFailure => "token_validation_failure",
            SecurityEvent::MissingAuthHeader => "missing_auth_header",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::LoginFailure
                | SecurityEvent::TokenValidationFailure
                | SecurityEvent::RateLimitExceeded
        )
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log a security event with sanitized context
#[macro_export]
macro_rules! log_security_event {
    ($event:expr, $($field:tt)*) => {
        if $event.is_critical() {
            tracing::warn!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        } else {
            tracing::info!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        }
    };
}
