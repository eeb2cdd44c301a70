//! The namespace manager: a cell executing namespace requests on sharded
//! single-threaded queues.
//!
//! Requests for one entry always land on the same queue, so they execute
//! in arrival order. Identical read-only requests waiting behind a
//! completed one are answered from its result (folding), requests that
//! outlived their time to live are discarded before they reach the
//! provider, and directory listings stream in several replies from
//! separate listing workers.

pub mod admin;
pub mod config;
pub mod manager;
pub mod messages;
pub mod ops;
pub mod path_cache;
pub mod queue;
pub mod relay;
pub mod routing;
pub mod stats;
pub mod worker;

pub use admin::AdminConsole;
pub use config::NamespaceManagerConfig;
pub use manager::{Backends, ManagerError, NamespaceManager};
pub use messages::{FlagOp, ListEntry, NamespaceMessage, Operation, OperationKind};
pub use stats::{KindSnapshot, ManagerStats};
