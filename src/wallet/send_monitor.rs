//! Submits a send and watches it to a terminal state.
//!
//! The engine's `sendprogress` handle is shared across all sends and keeps
//! reporting the previous attempt until the new one registers, so the
//! monitor records the id it saw before submitting and ignores reports that
//! still carry it. Exactly one terminal outcome is produced per send: a
//! txid or the engine's rejection message.

use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{EngineError, EngineGateway};
use crate::transaction::SendItem;

use super::sync::SyncOrchestrator;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("a send is already in flight")]
    SendInFlight,

    /// The engine rejected or failed the transaction; the message is the
    /// engine's own.
    #[error("send rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct SendMonitor {
    gateway: Arc<EngineGateway>,
    orchestrator: Arc<SyncOrchestrator>,
    poll_interval: Duration,
}

impl SendMonitor {
    pub fn new(gateway: Arc<EngineGateway>, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            gateway,
            orchestrator,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Submit `payload` and poll until the engine reports a txid or an
    /// error. At most one send runs at a time; the guard is shared with the
    /// orchestrator so periodic data updates back off while this runs.
    pub async fn send(&self, payload: &[SendItem]) -> Result<String, SendError> {
        let sending = self.orchestrator.sending_flag();
        if sending.swap(true, SeqCst) {
            return Err(SendError::SendInFlight);
        }
        let result = self.run_send(payload).await;
        sending.store(false, SeqCst);
        result
    }

    async fn run_send(&self, payload: &[SendItem]) -> Result<String, SendError> {
        // The id reported before submission marks the previous attempt;
        // reports still carrying it are stale.
        let prev_id = match self.gateway.send_progress().await {
            Ok(progress) => Some(progress.id),
            Err(e) => {
                warn!(error = %e, "could not read send progress before submitting");
                None
            }
        };

        // A submit-time engine rejection is still a rejection of the
        // transaction, not a transport problem.
        if let Err(e) = self.gateway.send(payload).await {
            return Err(match e {
                EngineError::Command(message) => SendError::Rejected(message),
                other => SendError::Engine(other),
            });
        }
        info!(outputs = payload.len(), "send submitted");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.tick().await;
        loop {
            interval.tick().await;

            let progress = match self.gateway.send_progress().await {
                Ok(progress) => progress,
                Err(e) => {
                    warn!(error = %e, "send progress poll failed");
                    continue;
                }
            };
            if prev_id == Some(progress.id) {
                debug!(id = progress.id, "send not yet registered");
                continue;
            }

            let txid = progress.txid.filter(|t| !t.is_empty());
            let error = progress.error.filter(|e| !e.is_empty());
            match (txid, error) {
                (Some(txid), None) => {
                    info!(%txid, "send accepted");
                    let orchestrator = Arc::clone(&self.orchestrator);
                    tokio::spawn(async move {
                        orchestrator.refresh(true, false).await;
                    });
                    return Ok(txid);
                }
                (_, Some(error)) => {
                    warn!(%error, "send rejected by the engine");
                    return Err(SendError::Rejected(error));
                }
                (None, None) => continue,
            }
        }
    }
}
