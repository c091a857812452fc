use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Extension,
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::logging::{SanitizedIpAddr, SecurityEvent};
use crate::state::AppState;

/// Expired client windows are swept once every this many checks.
const SWEEP_EVERY: u64 = 256;

/// Proxy headers consulted before the peer address, in order.
const CLIENT_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

#[derive(Debug)]
struct LoginWindow {
    opened_at: Instant,
    attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Throttled { retry_after: Duration },
}

/// Fixed-window login budget per client address.
#[derive(Clone)]
pub struct LoginThrottle {
    budget: u32,
    window: Duration,
    clients: Arc<DashMap<IpAddr, LoginWindow>>,
    checks: Arc<AtomicU64>,
}

impl LoginThrottle {
    pub fn new(budget: NonZeroU32, window: Duration) -> Self {
        Self {
            budget: budget.get(),
            window,
            clients: Arc::new(DashMap::new()),
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.login_attempts, config.login_window)
    }

    pub fn check(&self, client: IpAddr, now: Instant) -> Verdict {
        // Must run before the entry guard below is taken.
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let mut window = self.clients.entry(client).or_insert(LoginWindow {
            opened_at: now,
            attempts: 0,
        });

        if now.saturating_duration_since(window.opened_at) >= self.window {
            window.opened_at = now;
            window.attempts = 0;
        }

        if window.attempts >= self.budget {
            let open_for = now.saturating_duration_since(window.opened_at);
            return Verdict::Throttled {
                retry_after: self.window.saturating_sub(open_for).max(Duration::from_secs(1)),
            };
        }

        window.attempts += 1;
        Verdict::Allowed
    }

    /// Drops every client whose window has run out.
    pub fn sweep(&self, now: Instant) {
        let window = self.window;
        self.clients
            .retain(|_, entry| now.saturating_duration_since(entry.opened_at) < window);
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Rejects login attempts beyond the configured budget with 429.
pub async fn throttle_logins(
    Extension(state): Extension<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(request.headers(), peer.ip());

    if let Verdict::Throttled { retry_after } = state.login_throttle.check(client, Instant::now()) {
        crate::log_security_event!(
            SecurityEvent::RateLimitExceeded,
            client_ip = %SanitizedIpAddr::new(client),
            retry_after_secs = retry_after.as_secs(),
            "Login attempts throttled"
        );
        return Err(AppError::RateLimitExceeded {
            retry_after: Some(retry_after),
        });
    }

    Ok(next.run(request).await)
}

/// First parseable address from the proxy headers, else the peer.
fn client_ip(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .filter_map(|raw| raw.split(',').next()?.trim().parse().ok())
        .next()
        .unwrap_or(peer)
}
