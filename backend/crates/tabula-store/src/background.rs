//! Background-task port for non-critical side effects.
//!
//! Work handed to `defer` runs after the primary call has returned. Its
//! failure is logged and never reaches the caller of the primary operation.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Deferred unit of work; `Err` carries a message for the log.
pub type DeferredWork = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

pub trait BackgroundTasks: Send + Sync {
    /// Schedule `work` to run after the current response.
    fn defer(&self, label: &str, work: DeferredWork);
}

/// Runs deferred work on the tokio runtime.
#[derive(Default)]
pub struct TokioBackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioBackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for all work deferred so far to finish.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    log::warn!("Background task panicked or was cancelled: {}", e);
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

impl BackgroundTasks for TokioBackgroundTasks {
    fn defer(&self, label: &str, work: DeferredWork) {
        let label = label.to_string();
        let handle = tokio::spawn(async move {
            match work.await {
                Ok(()) => log::debug!("Background task '{}' completed", label),
                Err(err) => log::warn!("Background task '{}' failed: {}", label, err),
            }
        });

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deferred_work_runs() {
        let tasks = TokioBackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            tasks.defer(
                "count",
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        tasks.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let tasks = TokioBackgroundTasks::new();
        tasks.defer("fails", Box::pin(async { Err("boom".to_string()) }));
        tasks.wait_idle().await;
    }
}
