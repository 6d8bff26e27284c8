//! Typed request/response wrapper around the engine command primitive.
//!
//! The engine answers every command with a string: JSON on success, or a
//! message prefixed with the case-insensitive literal `"error"` on failure.
//! `EngineGateway` classifies each response exactly once, at this boundary;
//! raw error strings never travel further into the crate. There are no
//! retries here; callers decide whether a failure is worth retrying.

use super::types::*;
use crate::transaction::SendItem;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// The single primitive the engine exposes.
///
/// Production implementations wrap the native library binding; tests script
/// responses. Transport-level failures (the native call itself failing) map
/// to [`EngineError::Transport`].
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn execute(&self, command: &str, arg: &str) -> Result<String, EngineError>;
}

/// Typed gateway over an [`EngineConnector`].
pub struct EngineGateway {
    connector: Arc<dyn EngineConnector>,
}

impl EngineGateway {
    pub fn new(connector: Arc<dyn EngineConnector>) -> Self {
        Self { connector }
    }

    /// Run one command, reclassifying an `"error…"`-prefixed response as a
    /// failure carrying the engine's message verbatim.
    pub async fn execute(&self, command: &str, arg: &str) -> Result<String, EngineError> {
        let response = self.connector.execute(command, arg).await?;
        let trimmed = response.trim_start();
        if trimmed
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("error"))
        {
            debug!(command, "engine returned an error response");
            return Err(EngineError::Command(response.trim().to_string()));
        }
        Ok(response)
    }

    /// Run one command and parse the response as JSON. A parse failure on a
    /// nominally-successful response is a distinct [`EngineError::MalformedResponse`].
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        command: &str,
        arg: &str,
    ) -> Result<T, EngineError> {
        let response = self.execute(command, arg).await?;
        serde_json::from_str(&response).map_err(|source| EngineError::MalformedResponse {
            command: command.to_string(),
            source,
        })
    }

    /// Start a sync run. The returned future resolves only when the engine's
    /// run completes, so callers spawn it and track progress via
    /// [`Self::sync_status`].
    pub async fn sync(&self) -> Result<String, EngineError> {
        self.execute("sync", "").await
    }

    /// Start a full rescan. Same completion semantics as [`Self::sync`].
    pub async fn rescan(&self) -> Result<String, EngineError> {
        self.execute("rescan", "").await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, EngineError> {
        self.execute_json("syncstatus", "").await
    }

    pub async fn save(&self) -> Result<(), EngineError> {
        self.execute("save", "").await.map(|_| ())
    }

    pub async fn wallet_height(&self) -> Result<u64, EngineError> {
        let response: HeightResponse = self.execute_json("height", "").await?;
        Ok(response.height)
    }

    pub async fn info(&self) -> Result<InfoResponse, EngineError> {
        self.execute_json("info", "").await
    }

    /// Default fee in base units.
    pub async fn default_fee(&self) -> Result<u64, EngineError> {
        let response: DefaultFeeResponse = self.execute_json("defaultfee", "").await?;
        Ok(response.defaultfee)
    }

    pub async fn balance(&self) -> Result<BalanceResponse, EngineError> {
        self.execute_json("balance", "").await
    }

    pub async fn notes(&self) -> Result<NotesResponse, EngineError> {
        self.execute_json("notes", "").await
    }

    pub async fn addresses(&self) -> Result<Vec<AddressEntry>, EngineError> {
        self.execute_json("addresses", "").await
    }

    pub async fn summaries(&self) -> Result<Vec<RawTxSummaryLine>, EngineError> {
        self.execute_json("summaries", "").await
    }

    /// Submit a send payload. The engine acknowledges and continues
    /// asynchronously; completion is observed via [`Self::send_progress`].
    pub async fn send(&self, payload: &[SendItem]) -> Result<String, EngineError> {
        let arg = serde_json::to_string(payload)
            .map_err(|e| EngineError::Transport(format!("failed to encode send payload: {e}")))?;
        self.execute("send", &arg).await
    }

    pub async fn send_progress(&self) -> Result<SendProgress, EngineError> {
        self.execute_json("sendprogress", "").await
    }

    /// Read one wallet option. The engine answers with a one-field object
    /// keyed by the option name.
    pub async fn get_option(&self, name: &str) -> Result<String, EngineError> {
        let value: serde_json::Value = self.execute_json("getoption", name).await?;
        Ok(match value.get(name) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    pub async fn set_option(&self, name: &str, value: &str) -> Result<(), EngineError> {
        self.execute("setoption", &format!("{name}={value}"))
            .await
            .map(|_| ())
    }

    pub async fn export_ufvk(&self) -> Result<UfvkResponse, EngineError> {
        self.execute_json("exportufvk", "").await
    }

    pub async fn seed(&self) -> Result<SeedResponse, EngineError> {
        self.execute_json("seed", "").await
    }

    pub async fn parse_address(&self, address: &str) -> Result<serde_json::Value, EngineError> {
        self.execute_json("parse_address", address).await
    }

    /// Ask the engine to stop (or keep going) at the next batch boundary.
    pub async fn interrupt_sync_after_batch(&self, value: bool) -> Result<(), EngineError> {
        self.execute("interrupt_sync_after_batch", if value { "true" } else { "false" })
            .await
            .map(|_| ())
    }
}
