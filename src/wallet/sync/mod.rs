//! Sync orchestration: the refresh state machine and its poll bookkeeping.
//!
//! `poll_tracker` is the pure half: it turns a stream of raw engine status
//! snapshots into progress snapshots and side-effect requests, with no I/O
//! and no clock of its own. `orchestrator` is the shell that owns the timer,
//! the engine gateway and the cached wallet data.

pub mod orchestrator;
pub mod poll_tracker;

pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use poll_tracker::{PollTracker, TickContext, TickEffect, TickOutcome};
