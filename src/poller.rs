//! Periodic poll scheduler.
//!
//! One task per device. Each cycle asks the supervisor whether to continue,
//! then runs a read pass over every subsystem and sleeps for the poll interval.
//! The task only holds a weak reference to the client, so dropping the last
//! [`Soundbar`](crate::Soundbar) handle ends it.

use crate::client::Inner;
use crate::supervisor::PollDecision;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// How long `stop()` waits for the task before aborting it
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Handle to a running poll task
pub(crate) struct Poller {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub(crate) fn spawn(inner: Weak<Inner>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(poll_loop(inner, interval, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task and wait briefly for it to exit
    pub(crate) async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if timeout(STOP_GRACE, &mut self.handle).await.is_err() {
            tracing::debug!("Poll task did not stop in time, aborting");
            self.handle.abort();
        }
    }

    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

async fn poll_loop(inner: Weak<Inner>, interval: Duration, mut stop_rx: oneshot::Receiver<()>) {
    loop {
        let Some(device) = inner.upgrade() else {
            break;
        };

        if device.observe_cycle() == PollDecision::GiveUp {
            tracing::debug!("Stopping poll task for device {} as it is off", device.id());
            device.release_after_give_up().await;
            break;
        }

        if let Err(e) = device.update(false).await {
            tracing::debug!("Poll pass for device {} failed: {}", device.id(), e);
        }
        drop(device);

        tokio::select! {
            _ = &mut stop_rx => {
                tracing::debug!("Poll task stopped");
                break;
            }
            _ = sleep(interval) => {}
        }
    }
}
