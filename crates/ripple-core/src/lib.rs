//! Ripple Core Library
//!
//! This crate provides a real-time state synchronization client: it merges
//! a server's WebSocket push stream and paginated REST resources into one
//! observable in-memory snapshot, with optimistic local mutations.
//!
//! # Architecture
//!
//! - **Store**: single owner of the snapshot; every change flows through
//!   a pure reducer and bumps a watch-based change signal
//! - **ConnectionManager**: long-lived push channels with fixed-delay
//!   reconnection and generation-guarded cancellation
//! - **MutationController**: optimistic create/update/delete with rollback
//!   on REST failure and per-identity concurrency guards
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = Arc::new(Store::new(config.page_size));
//!
//! let connections = ConnectionManager::new(store.clone(), &config);
//! connections.connect(None).await?;
//!
//! // Observe the snapshot
//! let mut changes = store.subscribe();
//! changes.changed().await?;
//! let state = store.snapshot().await;
//! ```
//!
//! # Modules
//!
//! - `store`: observable snapshot owner (main entry point)
//! - `state`: snapshot shape and capacity constants
//! - `models`: log entries, drafts and patches
//! - `history`: bounded append-only buffers
//! - `message`: wire envelope decoding
//! - `router`: pure reducer from messages to state
//! - `pages`: windowed log pagination
//! - `rest`: paginated log API over HTTP
//! - `connection`: push channel lifecycle
//! - `mutations`: optimistic mutation flows
//! - `config`: client configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod message;
pub mod models;
pub mod mutations;
pub mod pages;
pub mod rest;
pub mod router;
pub mod state;
pub mod store;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, SendOutcome, Status};
pub use error::{SyncError, SyncResult};
pub use history::BoundedHistory;
pub use message::{ClientMessage, Message};
pub use models::{LogDraft, LogEntry, LogPatch, SyncStatus};
pub use mutations::MutationController;
pub use pages::{Page, PageSync};
pub use rest::{HttpLogApi, LogApi, PageResponse};
pub use state::AppState;
pub use store::Store;
