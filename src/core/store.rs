#![allow(missing_docs)]

use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    error::StoreFault,
    query::{AnalyticsSummary, QueryPatch, QueryRecord},
    types::QueryId,
};

/// Result of [`RecordStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Prepended.
    Inserted,
    /// Replaced in place.
    Replaced,
    /// Already identical.
    Unchanged,
}

/// Immutable view handed to readers.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Most recent first.
    pub records: Arc<[QueryRecord]>,
    /// True until the first seed lands, and while any filtered fetch runs.
    pub loading: bool,
    pub error: Option<StoreFault>,
    pub analytics: Option<Arc<AnalyticsSummary>>,
    pub version: u64,
}

impl StoreSnapshot {
    pub fn get(&self, id: &QueryId) -> Option<&QueryRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Local replica of the query set.
#[derive(Debug)]
pub struct RecordStore {
    // Oldest first; reads reverse.
    records: Vec<QueryRecord>,
    pos: HashMap<QueryId, usize>,
    loading: bool,
    fetches_in_flight: u32,
    error: Option<StoreFault>,
    analytics: Option<Arc<AnalyticsSummary>>,
    version: u64,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            pos: HashMap::new(),
            loading: true,
            fetches_in_flight: 0,
            error: None,
            analytics: None,
            version: 0,
        }
    }

    /// Replaces the whole sequence with `records` (most recent first).
    /// Later duplicates of an id are dropped. Clears any recorded fault.
    pub fn seed(&mut self, records: Vec<QueryRecord>) {
        self.records.clear();
        self.pos.clear();

        let mut seen = hashbrown::HashSet::with_capacity(records.len());
        let unique: Vec<QueryRecord> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();

        for rec in unique.into_iter().rev() {
            self.pos.insert(rec.id.clone(), self.records.len());
            self.records.push(rec);
        }

        self.loading = self.fetches_in_flight > 0;
        self.error = None;
        self.version += 1;
    }

    pub fn upsert(&mut self, record: QueryRecord) -> UpsertOutcome {
        match self.pos.get(&record.id) {
            Some(&idx) => {
                if self.records[idx] == record {
                    return UpsertOutcome::Unchanged;
                }
                self.records[idx] = record;
                self.version += 1;
                UpsertOutcome::Replaced
            }
            None => {
                self.pos.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                self.version += 1;
                UpsertOutcome::Inserted
            }
        }
    }

    /// False if the id is unknown.
    pub fn patch(&mut self, id: &QueryId, patch: &QueryPatch) -> bool {
        let Some(&idx) = self.pos.get(id) else {
            return false;
        };
        if patch.is_empty() {
            return true;
        }
        patch.apply_to(&mut self.records[idx]);
        self.version += 1;
        true
    }

    /// Marks a filtered fetch as started; `loading` holds until every started
    /// fetch has ended.
    pub fn begin_fetch(&mut self) {
        self.fetches_in_flight += 1;
        self.set_loading(true);
    }

    pub fn end_fetch(&mut self) {
        self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
        self.set_loading(self.fetches_in_flight > 0);
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.version += 1;
        }
    }

    /// Records are left as they are.
    pub fn record_fault(&mut self, fault: StoreFault) {
        self.error = Some(fault);
        self.loading = self.fetches_in_flight > 0;
        self.version += 1;
    }

    pub fn set_analytics(&mut self, summary: AnalyticsSummary) {
        self.analytics = Some(Arc::new(summary));
        self.version += 1;
    }

    pub fn get(&self, id: &QueryId) -> Option<&QueryRecord> {
        self.pos.get(id).map(|&idx| &self.records[idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&StoreFault> {
        self.error.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Records, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &QueryRecord> {
        self.records.iter().rev()
    }

    pub fn ordered_ids(&self) -> Vec<QueryId> {
        self.iter().map(|r| r.id.clone()).collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: self.iter().cloned().collect(),
            loading: self.loading,
            error: self.error.clone(),
            analytics: self.analytics.clone(),
            version: self.version,
        }
    }
}
