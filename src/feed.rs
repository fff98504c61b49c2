//! Change feed adapter: live notifications with a one-way polling fallback.

use std::sync::Arc;

use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::SyncConfig,
    error::{SyncError, SyncResult},
    remote::{ChangeStream, QueryFilter, RemoteError, RemoteStore},
    runtime::handle::SyncHandle,
};

/// How the replica learns about remote changes.
///
/// Chosen once at start. The only transition is `Live -> Polling`, taken when
/// the subscription cannot be set up; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Insert/update notifications are upserted as they arrive.
    Live,
    /// The most recent page is re-fetched and re-seeded on a fixed interval.
    Polling,
}

/// Running feed. Cancelling releases the subscription or stops the timer.
#[derive(Debug)]
pub struct FeedHandle {
    mode: FeedMode,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Mode chosen at start.
    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// True until cancelled or until the feed task ends on its own.
    pub fn is_running(&self) -> bool {
        !*self.stop_tx.borrow() && !self.task.is_finished()
    }

    /// Stops the feed. Idempotent.
    pub fn cancel(&self) {
        if !self.stop_tx.send_replace(true) {
            debug!(mode = ?self.mode, "change feed cancelled");
        }
        self.task.abort();
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts the feed for `handle`, trying live mode first.
pub fn start(remote: Arc<dyn RemoteStore>, handle: SyncHandle, config: &SyncConfig) -> FeedHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let page_size = config.page_size;

    match remote.subscribe_changes() {
        Ok(stream) => {
            info!("change feed live");
            let task = tokio::spawn(live_loop(stream, remote, handle, page_size, stop_rx));
            FeedHandle {
                mode: FeedMode::Live,
                stop_tx,
                task,
            }
        }
        Err(source) => {
            let err = SyncError::SubscriptionSetup(source);
            let period = config.poll_interval();
            warn!(error = %err, ?period, "falling back to polling");
            let task = tokio::spawn(poll_loop(remote, handle, page_size, period, stop_rx));
            FeedHandle {
                mode: FeedMode::Polling,
                stop_tx,
                task,
            }
        }
    }
}

/// Fetches the most recent `page_size` rows and seeds the store with them.
///
/// On failure the fault is recorded and the previous records stay visible.
pub async fn refresh(remote: &dyn RemoteStore, handle: &SyncHandle, page_size: usize) -> SyncResult<usize> {
    match remote.fetch_queries(&QueryFilter::recent(page_size)).await {
        Ok(records) => handle.seed(records).await,
        Err(source) => {
            let err = SyncError::Fetch(source);
            warn!(error = %err, "full fetch failed; keeping last snapshot");
            handle.record_error(&err).await?;
            Err(err)
        }
    }
}

async fn live_loop(
    mut stream: ChangeStream,
    remote: Arc<dyn RemoteStore>,
    handle: SyncHandle,
    page_size: usize,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            event = stream.recv() => match event {
                Ok(event) => {
                    if matches!(handle.upsert(event.into_record()).await, Err(SyncError::Inactive)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed lagged; resyncing");
                    if matches!(refresh(remote.as_ref(), &handle, page_size).await, Err(SyncError::Inactive)) {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    let err = SyncError::Fetch(RemoteError::Subscription(
                        "change feed closed by backend".to_string(),
                    ));
                    warn!(error = %err, "live updates stopped");
                    let _ = handle.record_error(&err).await;
                    break;
                }
            }
        }
    }
}

async fn poll_loop(
    remote: Arc<dyn RemoteStore>,
    handle: SyncHandle,
    page_size: usize,
    period: std::time::Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                if matches!(refresh(remote.as_ref(), &handle, page_size).await, Err(SyncError::Inactive)) {
                    break;
                }
            }
        }
    }
}
