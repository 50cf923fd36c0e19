//! Deadline-bounded calls into plugin code.
//!
//! Plugin futures run on their own tokio task. When the deadline passes the
//! caller stops waiting, but the task is detached rather than aborted: the core
//! does not own the plugin's in-flight work and never tears it down. Panics are
//! caught at the task boundary.

use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) enum CallOutcome<T> {
    Completed(T),
    Panicked(String),
    TimedOut,
}

/// The instant `timeout` after `start`, saturating at a far-future deadline.
pub(crate) fn deadline_from(start: Instant, timeout: Duration) -> Instant {
    start.checked_add(timeout).unwrap_or_else(|| start + FAR_FUTURE)
}

pub(crate) async fn run_detached<T, F>(deadline: Instant, call: F) -> CallOutcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);

    match tokio::time::timeout_at(deadline, handle).await {
        Ok(Ok(value)) => CallOutcome::Completed(value),
        Ok(Err(join_error)) => CallOutcome::Panicked(join_error_message(join_error)),
        // Dropping the JoinHandle detaches the task.
        Err(_elapsed) => CallOutcome::TimedOut,
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "plugin task was cancelled".to_string();
    }

    match err.try_into_panic() {
        Ok(payload) => format!("plugin panicked: {}", panic_payload_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
