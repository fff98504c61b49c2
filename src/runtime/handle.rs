#![allow(missing_docs)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::{
    config::SyncConfig,
    core::store::{RecordStore, StoreSnapshot, UpsertOutcome},
    error::{StoreFault, SyncError, SyncResult},
    query::{AnalyticsSummary, QueryPatch, QueryRecord},
    types::QueryId,
};

use super::events::SyncEvent;

/// Cloneable handle to the runtime that owns the [`RecordStore`].
///
/// Writes are queued to one task and applied in order; reads come from the
/// last published [`StoreSnapshot`] and never see a half-applied change.
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SyncEvent>,
    snapshot_rx: watch::Receiver<StoreSnapshot>,
    active: Arc<AtomicBool>,
}

impl Clone for SyncHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            snapshot_rx: self.snapshot_rx.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

enum Command {
    Seed {
        records: Vec<QueryRecord>,
        resp: oneshot::Sender<usize>,
    },
    Upsert {
        record: QueryRecord,
        resp: oneshot::Sender<UpsertOutcome>,
    },
    Patch {
        id: QueryId,
        patch: QueryPatch,
        resp: oneshot::Sender<bool>,
    },
    BeginFetch {
        resp: oneshot::Sender<()>,
    },
    EndFetch {
        resp: oneshot::Sender<()>,
    },
    RecordFault {
        fault: StoreFault,
        resp: oneshot::Sender<()>,
    },
    SetAnalytics {
        summary: AnalyticsSummary,
        resp: oneshot::Sender<()>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

pub fn spawn_runtime(store: RecordStore, config: &SyncConfig) -> SyncHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_capacity.max(1));
    let (events_tx, _) = broadcast::channel::<SyncEvent>(config.event_capacity.max(1));
    let (snapshot_tx, snapshot_rx) = watch::channel(store.snapshot());

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;

        while let Some(cmd) = cmd_rx.recv().await {
            let outbox = Outbox {
                snapshot_tx: &snapshot_tx,
                events_tx: &events_tx_loop,
                before: store.version(),
            };
            if handle_command(cmd, &mut store, &outbox) {
                break;
            }
        }
        debug!("sync runtime stopped");
    });

    SyncHandle {
        cmd_tx,
        events_tx,
        snapshot_rx,
        active: Arc::new(AtomicBool::new(true)),
    }
}

impl SyncHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn get(&self, id: &QueryId) -> Option<QueryRecord> {
        self.snapshot_rx.borrow().get(id).cloned()
    }

    /// Waits until the loading flag clears.
    pub async fn loaded(&self) -> SyncResult<StoreSnapshot> {
        let mut rx = self.snapshot_rx.clone();
        let snap = rx
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| SyncError::Inactive)?;
        Ok(snap.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the number of records held.
    pub async fn seed(&self, records: Vec<QueryRecord>) -> SyncResult<usize> {
        self.request(|resp| Command::Seed { records, resp }).await
    }

    pub async fn upsert(&self, record: QueryRecord) -> SyncResult<UpsertOutcome> {
        self.request(|resp| Command::Upsert { record, resp }).await
    }

    /// `Ok(false)` when the id is unknown.
    pub async fn patch(&self, id: QueryId, patch: QueryPatch) -> SyncResult<bool> {
        self.request(|resp| Command::Patch { id, patch, resp }).await
    }

    /// Raises `loading` until the matching [`SyncHandle::end_fetch`].
    pub async fn begin_fetch(&self) -> SyncResult<()> {
        self.request(|resp| Command::BeginFetch { resp }).await
    }

    pub async fn end_fetch(&self) -> SyncResult<()> {
        self.request(|resp| Command::EndFetch { resp }).await
    }

    pub async fn record_error(&self, err: &SyncError) -> SyncResult<()> {
        let fault = StoreFault::from_error(err);
        self.request(|resp| Command::RecordFault { fault, resp }).await
    }

    pub async fn set_analytics(&self, summary: AnalyticsSummary) -> SyncResult<()> {
        self.request(|resp| Command::SetAnalytics { summary, resp }).await
    }

    /// Stops the runtime. Later calls on any clone return [`SyncError::Inactive`]
    /// and leave the last snapshot untouched. Safe to call more than once.
    pub async fn shutdown(&self) -> SyncResult<()> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { resp: tx }).await.is_ok() {
            let _ = rx.await;
        }
        Ok(())
    }

    /// Marks the handle inactive without waiting for the loop. The loop exits
    /// once every clone is dropped.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> SyncResult<T> {
        if !self.is_active() {
            return Err(SyncError::Inactive);
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| SyncError::Inactive)?;
        rx.await.map_err(|_| SyncError::Inactive)
    }
}

// Snapshot and event go out before the caller is answered.
struct Outbox<'a> {
    snapshot_tx: &'a watch::Sender<StoreSnapshot>,
    events_tx: &'a broadcast::Sender<SyncEvent>,
    before: u64,
}

impl Outbox<'_> {
    fn publish(&self, store: &RecordStore, event: Option<SyncEvent>) {
        if store.version() != self.before {
            self.snapshot_tx.send_replace(store.snapshot());
        }
        if let Some(event) = event {
            let _ = self.events_tx.send(event);
        }
    }
}

fn handle_command(cmd: Command, store: &mut RecordStore, out: &Outbox<'_>) -> bool {
    match cmd {
        Command::Seed { records, resp } => {
            store.seed(records);
            let count = store.len();
            out.publish(store, Some(SyncEvent::Seeded { count }));
            let _ = resp.send(count);
        }
        Command::Upsert { record, resp } => {
            let id = record.id.clone();
            let outcome = store.upsert(record);
            let event = match outcome {
                UpsertOutcome::Inserted => Some(SyncEvent::Inserted { id }),
                UpsertOutcome::Replaced => Some(SyncEvent::Updated { id }),
                UpsertOutcome::Unchanged => None,
            };
            out.publish(store, event);
            let _ = resp.send(outcome);
        }
        Command::Patch { id, patch, resp } => {
            let applied = store.patch(&id, &patch);
            let event = (applied && !patch.is_empty()).then_some(SyncEvent::Patched { id });
            out.publish(store, event);
            let _ = resp.send(applied);
        }
        Command::BeginFetch { resp } => {
            store.begin_fetch();
            out.publish(store, None);
            let _ = resp.send(());
        }
        Command::EndFetch { resp } => {
            store.end_fetch();
            out.publish(store, None);
            let _ = resp.send(());
        }
        Command::RecordFault { fault, resp } => {
            let kind = fault.kind;
            store.record_fault(fault);
            out.publish(store, Some(SyncEvent::Faulted { kind }));
            let _ = resp.send(());
        }
        Command::SetAnalytics { summary, resp } => {
            store.set_analytics(summary);
            out.publish(store, Some(SyncEvent::AnalyticsUpdated));
            let _ = resp.send(());
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}
