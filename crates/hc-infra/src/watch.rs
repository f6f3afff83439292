use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{Action, ActionStatus};
use crate::{CloudClient, Error, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Waits for actions to reach a terminal state, one at a time process-wide.
///
/// Every reconciliation task shares a single watcher through an `Arc`. The
/// mutex is held for the whole poll loop, so waits from concurrent tasks are
/// served strictly one after another and never interleave their polls.
pub struct ActionWatcher {
    lock: Mutex<()>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl Default for ActionWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ActionWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            poll_interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create from env vars:
    ///
    /// - `HCLOUD_POLL_INTERVAL_MS` (default: 500)
    /// - `HCLOUD_ACTION_TIMEOUT_SECS` (optional, no deadline when unset)
    pub fn from_env() -> Self {
        let poll_interval = std::env::var("HCLOUD_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let watcher = Self::new(poll_interval);
        match std::env::var("HCLOUD_ACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(secs) => watcher.with_timeout(Duration::from_secs(secs)),
            None => watcher,
        }
    }

    /// Block until `action` succeeds or fails. Returns the terminal action.
    pub async fn wait(&self, client: &dyn CloudClient, action: &Action) -> Result<Action> {
        let _guard = self.lock.lock().await;
        debug!(action_id = action.id, command = %action.command, "waiting for action");

        let started = Instant::now();
        let mut current = action.clone();
        loop {
            match current.status {
                ActionStatus::Success => {
                    debug!(action_id = current.id, "action finished");
                    return Ok(current);
                }
                ActionStatus::Error => {
                    return Err(Error::ActionFailed {
                        id: current.id,
                        command: current.command,
                        message: current.error.unwrap_or_else(|| "unknown error".into()),
                    });
                }
                ActionStatus::Running => {}
            }

            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                return Err(Error::ActionTimeout {
                    id: current.id,
                    command: current.command,
                    secs: timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
            current = client.get_action(current.id).await?;
        }
    }
}
