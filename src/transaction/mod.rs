//! Construction of send payloads for the engine.

pub mod builder;

pub use builder::{BuildError, SendBuilder, SendItem, MAX_MEMO_BYTES};
