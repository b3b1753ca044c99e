use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawn a background task wrapped in a `task` span carrying its name, so
/// events emitted by long-lived loops (hub dispatch, subscriber writers) can
/// be attributed in the logs.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let task_name = name.into();
    let span = tracing::info_span!("task", task_name = %task_name);
    tokio::spawn(future.instrument(span))
}
