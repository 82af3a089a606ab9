//! Concurrent store, command dispatcher, and metrics for the Agora engine.
//!
//! All social-platform state lives in one [`Store`] guarded by a single
//! exclusion lock. Callers either use it directly from any thread or funnel
//! commands through a [`Dispatcher`] mailbox that applies them one at a
//! time in arrival order.
//!
//! # Modules
//!
//! - [`store`] -- The concurrent store and every entity operation.
//! - [`dispatcher`] -- Single-consumer command mailbox with reply channels.
//! - [`client`] -- Per-user session that logs each action's outcome.
//! - [`thread`] -- Comment-tree traversal and search.
//! - [`karma`] -- Karma aggregation over posts and comment trees.
//! - [`feed`] -- Feed ordering and tie-breaks.
//! - [`metrics`] -- Operation counter and throughput report.
//! - [`clock`] -- Timestamp sources.
//! - [`config`] -- Configuration loading from `agora-config.yaml`.
//! - [`error`] -- Store error taxonomy.
//!
//! [`Store`]: store::Store
//! [`Dispatcher`]: dispatcher::Dispatcher

pub mod client;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod karma;
pub mod metrics;
pub mod store;
pub mod thread;

pub use client::UserClient;
pub use dispatcher::{Command, DispatchError, DispatchStats, Dispatcher, DispatcherHandle};
pub use error::{ErrorKind, StoreError};
pub use metrics::{Metrics, MetricsError, MetricsReport};
pub use store::Store;
