//! Caller-facing wallet model.
//!
//! These types are derived from the engine's wire payloads and owned by the
//! orchestrator. Amounts are converted from integer base units to exact
//! decimals (scale 8) once, at ingestion; nothing downstream touches base
//! units again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Base units per whole coin.
pub const COIN: i64 = 100_000_000;

/// Convert an amount in base units to a scale-8 decimal.
pub fn zats_to_decimal(zats: i64) -> Decimal {
    Decimal::new(zats, 8)
}

/// Snapshot of the sync state, recomputed on every poll tick and overwritten
/// wholesale. `stalled` is an informational signal, not an abort: the
/// orchestrator never kills the engine's sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncProgress {
    pub sync_id: u64,
    pub total_batches: u64,
    /// 1-based while a run is in progress, 0 otherwise.
    pub current_batch: u64,
    pub current_block: u64,
    /// First block of the current sync run, as far as it can be inferred.
    pub process_end_block: u64,
    pub last_block_wallet: u64,
    pub last_block_server: u64,
    pub in_progress: bool,
    pub stalled: bool,
    pub seconds_in_batch: u64,
    pub last_error: Option<String>,
}

/// Direction of a logical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionKind {
    Sent,
    Received,
    /// All-fee transaction with no value transfer.
    SendToSelf,
}

/// One reassembled line-item of a transaction, after memo and amount merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxDetail {
    pub address: String,
    pub amount: Decimal,
    pub memos: Option<Vec<String>>,
    pub pool: Option<String>,
}

/// One logical transaction. Built fresh on every aggregation pass; the whole
/// cached list is replaced atomically, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub txid: String,
    pub kind: TransactionKind,
    /// `None` while unconfirmed, else `server_height - block_height + 1`.
    pub confirmations: Option<u64>,
    pub time: DateTime<Utc>,
    pub fee: Option<Decimal>,
    pub price: Option<f64>,
    pub details: Vec<TxDetail>,
}

/// Per-pool balances in whole-coin decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TotalBalance {
    pub orchard: Decimal,
    pub sapling: Decimal,
    pub transparent: Decimal,
    pub spendable_orchard: Decimal,
    pub spendable_sapling: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressKind {
    Unified,
    Sapling,
    Transparent,
}

/// One receiver of a unified address, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    /// The unified address this receiver belongs to.
    pub ua: String,
    /// The receiver-specific encoding.
    pub address: String,
    pub kind: AddressKind,
    /// Compact receiver summary, e.g. `"ozt"`.
    pub receivers: String,
    /// True when a pending note or UTXO targets this receiver.
    pub contains_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletSettings {
    pub download_memos: String,
    pub transaction_filter_threshold: String,
}

/// Chain and server metadata, refreshed alongside the server height.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    pub chain_name: String,
    pub latest_block: u64,
    pub server_uri: String,
    pub version: String,
    pub currency_name: String,
    pub default_fee: Decimal,
}
