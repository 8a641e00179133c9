//! A small async primitive guaranteeing at most one concurrent invocation of a task (spec §9,
//! "Single-instance tasks"): `start` launches a task unless one is already running, in which
//! case it is a no-op; `wait` blocks on whichever instance is currently in flight; `cancel`
//! aborts it outright. `distinst` has no async runtime of its own to ground this in -- it is
//! enriched from the broader async-Rust ecosystem, per SPEC_FULL.md's C6 grounding note.

use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;

pub struct SingleInstanceTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SingleInstanceTask {
    pub fn new() -> SingleInstanceTask { SingleInstanceTask { handle: Mutex::new(None) } }

    /// True if an instance is currently running.
    pub fn is_running(&self) -> bool {
        self.handle.lock().unwrap().as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Starts `task` unless an instance is already running. Returns `true` if this call
    /// actually started a new instance (`start_while_running` returning the existing handle is
    /// simply this returning `false` -- the caller already knows which instance is in flight).
    pub fn start<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.handle.lock().unwrap();
        if guard.as_ref().map_or(false, |h| !h.is_finished()) {
            return false;
        }
        *guard = Some(tokio::spawn(task));
        true
    }

    /// Aborts the in-flight instance, if any. A subsequent `start` is then free to run.
    pub fn cancel(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Waits for the current instance to finish. A no-op if nothing is running.
    pub async fn wait(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Default for SingleInstanceTask {
    fn default() -> SingleInstanceTask { SingleInstanceTask::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn second_start_while_running_is_a_no_op() {
        let task = SingleInstanceTask::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r1 = runs.clone();
        assert!(task.start(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            r1.fetch_add(1, Ordering::SeqCst);
        }));

        let r2 = runs.clone();
        assert!(!task.start(async move {
            r2.fetch_add(1, Ordering::SeqCst);
        }));

        task.wait().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_after_completion_runs_again() {
        let task = SingleInstanceTask::new();
        assert!(task.start(async {}));
        task.wait().await;
        assert!(task.start(async {}));
    }
}
