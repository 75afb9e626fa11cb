//! Observer fan-out for progress events.
//!
//! Each observer gets its own queue and worker task: publishing never
//! blocks the iteration loop, delivery to one observer is strictly in
//! publication order, and one observer's failure never affects the others
//! or the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::error::{EngineError, Result};
use crate::domain::event::ProgressEvent;

/// A progress event consumer (console, socket push, persistence, metering).
///
/// `notify` failures are caught and logged by the bus; implementations do
/// not need to be infallible, only `Send + Sync`.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Name used in logs when delivery fails.
    fn name(&self) -> &str;

    /// Handle one event. Events arrive in publication order.
    async fn notify(&self, event: &ProgressEvent) -> std::result::Result<(), String>;
}

struct ObserverWorker {
    name: String,
    sender: mpsc::UnboundedSender<ProgressEvent>,
    handle: JoinHandle<()>,
}

/// Fan-out dispatcher for [`ProgressEvent`]s.
#[derive(Default)]
pub struct CallbackBus {
    workers: Vec<ObserverWorker>,
    seq: AtomicU64,
    sealed: bool,
}

impl CallbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Registration closes once the session starts.
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) -> Result<()> {
        if self.sealed {
            return Err(EngineError::InvalidInput(
                "observers must be registered before the session starts".into(),
            ));
        }

        let name = observer.name().to_string();
        let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressEvent>();
        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = observer.notify(&event).await {
                    warn!(observer = %worker_name, error = %e, "observer failed; continuing");
                }
            }
        });

        self.workers.push(ObserverWorker {
            name,
            sender,
            handle,
        });
        Ok(())
    }

    /// Close registration.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn observer_count(&self) -> usize {
        self.workers.len()
    }

    /// Events published so far.
    pub fn published(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Stamp the event with the next sequence number and enqueue it for
    /// every observer. Never blocks and never fails.
    pub fn publish(&self, mut event: ProgressEvent) {
        event.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        for worker in &self.workers {
            if worker.sender.send(event.clone()).is_err() {
                warn!(observer = %worker.name, "observer queue closed; dropping event");
            }
        }
    }

    /// Drain all observer queues and stop the workers.
    pub async fn shutdown(self) {
        for worker in self.workers {
            drop(worker.sender);
            if let Err(e) = worker.handle.await {
                warn!(observer = %worker.name, error = %e, "observer worker ended abnormally");
            }
        }
    }
}
