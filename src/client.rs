//! Composition root wiring store, feed, and gateway around one backend.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    config::SyncConfig,
    core::store::{RecordStore, StoreSnapshot},
    error::{SyncError, SyncResult},
    feed::{self, FeedHandle, FeedMode},
    gateway::MutationGateway,
    remote::RemoteStore,
    runtime::handle::{SyncHandle, spawn_runtime},
};

/// Owns one synchronized replica of the backend's query set.
///
/// The backend is passed in explicitly; nothing here reaches for ambient
/// state. Dropping the client has the same effect as [`SyncClient::shutdown`]
/// minus waiting for the runtime to stop.
pub struct SyncClient {
    handle: SyncHandle,
    gateway: MutationGateway,
    feed: FeedHandle,
    seed_task: JoinHandle<()>,
}

impl SyncClient {
    /// Spawns the runtime, kicks off the seed fetch, and starts the change feed.
    ///
    /// Must be called from within a tokio runtime. The seed runs in the
    /// background; use [`SyncHandle::loaded`] to wait for it.
    pub fn start(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        let handle = spawn_runtime(RecordStore::new(), &config);

        let seed_task = tokio::spawn({
            let remote = Arc::clone(&remote);
            let handle = handle.clone();
            let page_size = config.page_size;
            async move {
                match feed::refresh(remote.as_ref(), &handle, page_size).await {
                    Ok(count) => info!(count, "replica seeded"),
                    Err(SyncError::Inactive) => debug!("seed resolved after teardown; dropped"),
                    Err(err) => debug!(error = %err, "seed failed"),
                }
            }
        });

        let feed = feed::start(Arc::clone(&remote), handle.clone(), &config);
        let gateway = MutationGateway::new(remote, handle.clone(), &config);

        Self {
            handle,
            gateway,
            feed,
            seed_task,
        }
    }

    /// Store handle for reads and subscriptions.
    pub fn store(&self) -> &SyncHandle {
        &self.handle
    }

    /// Mutation operations.
    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.handle.snapshot()
    }

    /// Feed mode chosen at start.
    pub fn feed_mode(&self) -> FeedMode {
        self.feed.mode()
    }

    /// True while the change feed task is running.
    pub fn feed_running(&self) -> bool {
        self.feed.is_running()
    }

    /// True once the initial seed fetch has resolved, whatever its outcome.
    pub fn seed_settled(&self) -> bool {
        self.seed_task.is_finished()
    }

    /// Cancels the feed and stops the runtime. Anything still in flight
    /// becomes a no-op. Safe to call more than once.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.feed.cancel();
        self.handle.shutdown().await
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.feed.cancel();
        self.handle.deactivate();
    }
}
