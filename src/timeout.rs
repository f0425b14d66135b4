//! Per-job wall-clock deadline.
//!
//! Armed when the worker is dispatched. Any terminal transition disarms it;
//! a disarmed controller never fires.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

pub struct TimeoutController {
    limit: Duration,
    armed_at: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimeoutController {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            armed_at: None,
            sleep: None,
        }
    }

    pub fn arm(&mut self) {
        let now = Instant::now();
        self.armed_at = Some(now);
        self.sleep = Some(Box::pin(tokio::time::sleep_until(now + self.limit)));
    }

    pub fn disarm(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.armed_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Resolves when the deadline passes. Pending forever while disarmed.
    /// Firing disarms the controller, so it fires at most once.
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Runs `fut` unless the deadline passes first.
    pub async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.expired() => None,
            out = fut => Some(out),
        }
    }
}
