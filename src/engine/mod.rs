//! Typed access to the native wallet engine's command interface.

pub mod gateway;
pub mod types;

pub use gateway::{EngineConnector, EngineGateway};
pub use types::*;
