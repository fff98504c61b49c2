mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;

use common::record;
use querysync::{
    core::store::RecordStore,
    query::{HistoryEntry, QueryPatch, QueryRecord},
    types::{QueryId, QueryStatus},
};

#[derive(Debug, Clone)]
enum Action {
    Upsert { id: u8, status: u8, history_len: u8 },
    Patch { target: u8, status: u8 },
    Reseed { keep: u8 },
}

const STATUSES: [QueryStatus; 5] = [
    QueryStatus::New,
    QueryStatus::Open,
    QueryStatus::InProgress,
    QueryStatus::Resolved,
    QueryStatus::Closed,
];

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0u8..16, 0u8..5, 0u8..4).prop_map(|(id, status, history_len)| Action::Upsert { id, status, history_len }),
        3 => (0u8..16, 0u8..5).prop_map(|(target, status)| Action::Patch { target, status }),
        1 => (0u8..16).prop_map(|keep| Action::Reseed { keep }),
    ]
}

fn make(id: u8, status: u8, history_len: u8) -> QueryRecord {
    let mut rec = record(&format!("q{id}"), STATUSES[usize::from(status)], i64::from(id));
    rec.history = (0..history_len)
        .map(|i| HistoryEntry::new(format!("step {i}"), "System", common::base_time()))
        .collect();
    rec
}

fn records(store: &RecordStore) -> Vec<QueryRecord> {
    store.iter().cloned().collect()
}

proptest! {
    #[test]
    fn ids_stay_unique_and_upsert_is_idempotent(actions in prop::collection::vec(action_strategy(), 1..150)) {
        let mut store = RecordStore::new();
        store.seed(vec![]);

        for action in actions {
            match action {
                Action::Upsert { id, status, history_len } => {
                    let rec = make(id, status, history_len);
                    let was_known = store.get(&rec.id).is_some();
                    let len_before = store.len();

                    store.upsert(rec.clone());
                    let once = records(&store);
                    store.upsert(rec.clone());
                    prop_assert_eq!(records(&store), once);

                    prop_assert_eq!(store.get(&rec.id), Some(&rec));
                    if was_known {
                        prop_assert_eq!(store.len(), len_before);
                    } else {
                        prop_assert_eq!(store.len(), len_before + 1);
                        prop_assert_eq!(store.iter().next().map(|r| r.id.clone()), Some(rec.id.clone()));
                    }
                }
                Action::Patch { target, status } => {
                    let id = QueryId::new(format!("q{target}"));
                    let before = store.get(&id).cloned();
                    let order_before = store.ordered_ids();
                    let applied = store.patch(&id, &QueryPatch {
                        status: Some(STATUSES[usize::from(status)]),
                        ..QueryPatch::default()
                    });
                    prop_assert_eq!(applied, before.is_some());
                    prop_assert_eq!(store.ordered_ids(), order_before);
                    if let Some(before) = before {
                        let after = store.get(&id).expect("still present");
                        prop_assert_eq!(&after.history, &before.history);
                        prop_assert_eq!(after.status, STATUSES[usize::from(status)]);
                    }
                }
                Action::Reseed { keep } => {
                    let kept: Vec<QueryRecord> = records(&store).into_iter().take(usize::from(keep)).collect();
                    store.seed(kept.clone());
                    prop_assert_eq!(records(&store), kept);
                }
            }

            let ids = store.ordered_ids();
            let unique: BTreeSet<&QueryId> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
