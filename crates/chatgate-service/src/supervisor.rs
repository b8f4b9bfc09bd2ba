//! Restart policy for long-running tasks.

use std::future::Future;
use std::time::Duration;

/// How often and how fast a failed task is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed before giving up.
    pub max_restarts: u32,
    /// Pause before each restart.
    pub backoff: Duration,
}

impl RestartPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_restarts: u32, backoff: Duration) -> Self {
        Self {
            max_restarts,
            backoff,
        }
    }
}

/// Error returned once a task has exhausted its restarts.
#[derive(Debug, thiserror::Error)]
#[error("task {name} failed {attempts} times, last error: {last_error}")]
pub struct SupervisorError {
    /// Task name.
    pub name: String,
    /// Number of failed runs.
    pub attempts: u32,
    /// Message of the final failure.
    pub last_error: String,
}

/// Run `task` until it finishes cleanly, restarting it on error or panic.
///
/// Each run is spawned on its own tokio task so a panic is caught as a failure.
///
/// # Errors
///
/// Returns `SupervisorError` after `policy.max_restarts` restarts have also failed.
pub async fn supervise<F, Fut, E>(
    name: &str,
    policy: RestartPolicy,
    mut task: F,
) -> Result<(), SupervisorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut failures = 0_u32;

    loop {
        let last_error = match tokio::spawn(task()).await {
            Ok(Ok(())) => {
                tracing::info!(task = %name, "Task finished");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("task panicked: {join_error}"),
        };

        failures += 1;
        if failures > policy.max_restarts {
            tracing::error!(
                task = %name,
                attempts = failures,
                error = %last_error,
                "Task failed too many times, giving up"
            );
            return Err(SupervisorError {
                name: name.to_string(),
                attempts: failures,
                last_error,
            });
        }

        tracing::warn!(
            task = %name,
            attempt = failures,
            max_restarts = policy.max_restarts,
            error = %last_error,
            backoff_secs = policy.backoff.as_secs(),
            "Task failed, restarting"
        );
        tokio::time::sleep(policy.backoff).await;
    }
}
