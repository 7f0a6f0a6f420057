use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{QueueReplayer, SyncReport};

/// Result of a background replay pass.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Completed(SyncReport),
    Failed(String),
}

/// Asks a running worker for an immediate pass.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Returns false once the worker has stopped. A request that arrives
    /// while one is already pending is folded into it.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Background task that replays the queue on startup, on a timer, and
/// whenever a [`SyncTrigger`] fires.
pub struct SyncWorker {
    trigger: SyncTrigger,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    pub fn spawn(
        replayer: Arc<QueueReplayer>,
        interval: Duration,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            Self::run(replayer, interval, trigger_rx, shutdown_rx, events).await;
        });

        Self {
            trigger: SyncTrigger { tx: trigger_tx },
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Stop the worker and wait for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            error!(error = %e, "Sync worker panicked");
        }
    }

    async fn run(
        replayer: Arc<QueueReplayer>,
        interval: Duration,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
        events: mpsc::Sender<SyncEvent>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Sync worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
                Some(()) = trigger_rx.recv() => debug!("Sync requested"),
            }

            let event = match replayer.replay().await {
                Ok(report) => SyncEvent::Completed(report),
                Err(e) => {
                    warn!(error = %e, "Replay pass failed");
                    SyncEvent::Failed(e.to_string())
                }
            };
            Self::send_event(&events, event).await;
        }

        info!("Sync worker stopped");
    }

    async fn send_event(tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
        if let Err(e) = tx.send(event).await {
            debug!(error = %e, "Sync event dropped - receiver closed");
        }
    }
}
