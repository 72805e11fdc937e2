//! Bounded wait for replayed state, with resend on expiry.
//!
//! Armed only while the endpoint has no session. Every `wait` it checks the
//! target again and asks the host to resend; there is no retry cap.

use std::{sync::Weak, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_RESEND_AFTER: Duration = Duration::from_secs(3);

#[async_trait]
pub trait RecoveryTarget: Send + Sync + 'static {
    async fn has_expected_state(&self) -> bool;
    async fn send_resend_request(&self) -> Result<()>;
}

#[derive(Default)]
pub struct ResendTimer {
    task: Option<JoinHandle<()>>,
}

impl ResendTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any running wait with a fresh one.
    pub fn arm<T: RecoveryTarget>(&mut self, target: Weak<T>, wait: Duration) {
        self.cancel();
        self.task = Some(tokio::spawn(wait_for_state(target, wait)));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ResendTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn wait_for_state<T: RecoveryTarget>(target: Weak<T>, wait: Duration) {
    let mut attempt: u64 = 0;
    loop {
        tokio::time::sleep(wait).await;
        let Some(target) = target.upgrade() else {
            return;
        };
        if target.has_expected_state().await {
            debug!(attempt, "recovery: state present, timer stopped");
            return;
        }
        attempt += 1;
        warn!(
            attempt,
            wait_ms = wait.as_millis() as u64,
            "recovery: no session after wait, requesting resend"
        );
        if let Err(error) = target.send_resend_request().await {
            warn!(attempt, %error, "recovery: resend request failed");
        }
    }
}

#[cfg(test)]
#[path = "tests/recovery_tests.rs"]
mod tests;
