//! Post-restart status checks
//!
//! Nodes take a while to come back after the service restarts. Each status
//! URL is polled until it answers 2xx or the deadline passes.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::report::StatusUrl;
use crate::cluster::Role;

/// Result of polling one node
#[derive(Debug, Clone, Serialize)]
pub struct StatusCheck {
    pub role: Role,
    pub url: String,
    pub up: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Polls HA status endpoints
pub struct StatusChecker {
    client: reqwest::Client,
    timeout: Duration,
    interval: Duration,
}

impl StatusChecker {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            interval,
        }
    }

    /// Poll every URL concurrently until it is up or the timeout elapses
    pub async fn wait_until_up(&self, urls: &[StatusUrl]) -> Vec<StatusCheck> {
        let deadline = Instant::now() + self.timeout;
        futures::future::join_all(urls.iter().map(|url| self.poll(url, deadline))).await
    }

    async fn poll(&self, target: &StatusUrl, deadline: Instant) -> StatusCheck {
        let mut check = StatusCheck {
            role: target.role,
            url: target.url.clone(),
            up: false,
            attempts: 0,
            last_error: None,
        };

        loop {
            check.attempts += 1;
            let response = self
                .client
                .get(&target.url)
                .timeout(self.interval.max(Duration::from_secs(1)))
                .send()
                .await;

            match response {
                Ok(r) if r.status().is_success() => {
                    info!(role = %target.role, url = %target.url, attempts = check.attempts, "Node is up");
                    check.up = true;
                    check.last_error = None;
                    return check;
                }
                Ok(r) => {
                    debug!(role = %target.role, status = %r.status(), "Status endpoint not ready");
                    check.last_error = Some(format!("HTTP {}", r.status()));
                }
                Err(e) => {
                    debug!(role = %target.role, error = %e, "Status endpoint unreachable");
                    check.last_error = Some(e.to_string());
                }
            }

            if Instant::now() + self.interval > deadline {
                warn!(
                    role = %target.role,
                    url = %target.url,
                    error = check.last_error.as_deref().unwrap_or("unknown"),
                    "Node did not come up before the deadline"
                );
                return check;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
