//! Wallet-facing orchestration: sync state machine, transaction aggregation,
//! send monitoring and the periodic refresh driver.

pub mod aggregator;
pub mod memo;
pub mod scheduler;
pub mod send_monitor;
pub mod sync;
pub mod types;

pub use scheduler::{RefreshScheduler, SchedulerConfig};
pub use send_monitor::{SendError, SendMonitor};
pub use sync::{SyncConfig, SyncOrchestrator};
pub use types::*;

use crate::engine::EngineError;

/// Errors surfaced by wallet-level operations.
///
/// Sync and refresh failures never reach callers through this type; they
/// are logged and self-heal on the next scheduled tick. This covers the
/// operations the caller invokes directly (settings mutation, address
/// parsing).
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}
