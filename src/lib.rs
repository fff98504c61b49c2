//! Client-side synchronization of a support-query inbox with its backend of record.
//!
//! A local [`core::store::RecordStore`] is seeded once from the backend, kept
//! live by a [`feed`] (notifications, or polling when notifications are not
//! available), and mutated through the [`gateway::MutationGateway`], which
//! patches optimistically and then reconciles with the row the backend returns.
//!
//! # Examples
//!
//! In-memory usage of [`core::store::RecordStore`]:
//! ```
//! use chrono::Utc;
//! use querysync::{
//!     core::store::{RecordStore, UpsertOutcome},
//!     query::{QueryRecord, Sender},
//!     types::{Channel, Priority, QueryId, QueryStatus, QueryType},
//! };
//!
//! let now = Utc::now();
//! let rec = QueryRecord {
//!     id: QueryId::new("1"),
//!     subject: "Refund".to_string(),
//!     content: "Where is my refund?".to_string(),
//!     channel: Channel::Email,
//!     query_type: QueryType::Question,
//!     priority: Priority::High,
//!     status: QueryStatus::New,
//!     sender: Sender::from_header("Sam Doe <sam@example.com>"),
//!     tags: vec![],
//!     assigned_to: None,
//!     history: vec![],
//!     created_at: now,
//!     updated_at: now,
//! };
//!
//! let mut store = RecordStore::new();
//! store.seed(vec![]);
//! assert_eq!(store.upsert(rec.clone()), UpsertOutcome::Inserted);
//! assert_eq!(store.upsert(rec), UpsertOutcome::Unchanged);
//! assert_eq!(store.len(), 1);
//! ```
//!
//! Full client over the SQLite backend:
//! ```no_run
//! use std::sync::Arc;
//!
//! use querysync::{
//!     client::SyncClient, config::SyncConfig, remote::sqlite::SqliteRemote,
//!     types::{QueryId, QueryStatus},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let remote = Arc::new(SqliteRemote::open("inbox.db").expect("open sqlite"));
//! let client = SyncClient::start(remote, SyncConfig::default());
//! client.store().loaded().await.expect("seed");
//! client
//!     .gateway()
//!     .update_status(&QueryId::new("1"), QueryStatus::InProgress)
//!     .await
//!     .expect("update");
//! client.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Composition root.
pub mod client;
/// Runtime configuration.
pub mod config;
/// In-memory replica.
pub mod core;
/// Error taxonomy.
pub mod error;
/// Change feed adapter.
pub mod feed;
/// Mutation gateway.
pub mod gateway;
/// Query domain records and patches.
pub mod query;
/// Backend abstraction and SQLite implementation.
pub mod remote;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared identifiers and enums.
pub mod types;
