//! Client-side orchestration layer for a native light-wallet engine.
//!
//! The engine is an external, pre-built component that owns chain
//! synchronization, key material, note scanning and transaction
//! construction. It exposes a single narrow primitive: a command name plus a
//! string argument, answered with JSON or an `"Error…"`-prefixed string.
//! Everything in this crate is built on that primitive:
//!
//! - [`engine`] wraps the command interface in typed requests and classifies
//!   every response at the boundary.
//! - [`wallet`] drives the engine's sync process to completion (stall
//!   detection, batch-boundary saves, single-flight guards), folds the
//!   engine's flat transaction-summary stream into deduplicated,
//!   memo-reassembled transaction records, monitors sends to a terminal
//!   outcome, and schedules periodic refreshes.
//! - [`transaction`] builds the `send` payload, splitting oversized memos
//!   across line-items.

pub mod engine;
pub mod transaction;
pub mod wallet;
