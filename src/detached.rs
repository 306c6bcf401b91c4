//! Fire-and-forget side effects
//!
//! Alert dispatch, supportive notifications and check-in sync run outside the
//! caller's await chain. Their only observable effect is a log line: errors
//! and panics are caught here and never reach the primary operation.

use crate::error::EngineError;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Handle to a detached task. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct DetachedHandle {
    id: Uuid,
    name: &'static str,
    supervisor: JoinHandle<()>,
}

impl DetachedHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the task to settle. Only tests and shutdown paths do this.
    pub async fn join(self) {
        if let Err(e) = self.supervisor.await {
            error!(task = self.name, task_id = %self.id, error = %e, "detached supervisor aborted");
        }
    }
}

/// Run `fut` on the current tokio runtime without awaiting it.
///
/// Returns `None`, after logging, when called outside a runtime.
pub fn spawn_detached<F>(name: &'static str, fut: F) -> Option<DetachedHandle>
where
    F: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!(task = name, "no async runtime, detached task skipped");
            return None;
        }
    };

    let id = Uuid::new_v4();
    let task = runtime.spawn(fut);
    let supervisor = runtime.spawn(async move {
        match task.await {
            Ok(Ok(())) => debug!(task = name, task_id = %id, "detached task finished"),
            Ok(Err(e)) => warn!(task = name, task_id = %id, error = %e, "detached task failed"),
            Err(e) if e.is_panic() => {
                error!(task = name, task_id = %id, "detached task panicked")
            }
            Err(_) => debug!(task = name, task_id = %id, "detached task cancelled"),
        }
    });

    debug!(task = name, task_id = %id, "detached task spawned");
    Some(DetachedHandle {
        id,
        name,
        supervisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_detached_task_runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let handle = spawn_detached("test-ok", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), EngineError>(())
        })
        .unwrap();
        handle.join().await;

        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_contained() {
        let failing = spawn_detached("test-err", async {
            Err::<(), EngineError>(EngineError::Service("boom".to_string()))
        })
        .unwrap();
        failing.join().await;

        let explode = true;
        let panicking = spawn_detached("test-panic", async move {
            if explode {
                panic!("detached panic");
            }
            Ok::<(), EngineError>(())
        })
        .unwrap();
        panicking.join().await;
    }

    #[test]
    fn test_without_runtime_returns_none() {
        assert!(spawn_detached("no-runtime", async { Ok::<(), EngineError>(()) }).is_none());
    }
}
