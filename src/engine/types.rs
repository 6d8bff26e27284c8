//! Wire types for the engine command interface.
//!
//! Everything here mirrors the JSON the engine emits verbatim; fields the
//! engine omits on fast paths default to zero/absent. These types are
//! transient inputs; the caller-facing model lives in `crate::wallet::types`.

use serde::{Deserialize, Deserializer, Serialize};

/// Error taxonomy for the engine boundary.
///
/// A `Command` error carries the engine's own `"Error…"`-prefixed message
/// verbatim; a `MalformedResponse` means the engine claimed success but the
/// payload did not parse. Neither is retried at this layer; callers decide.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine error: {0}")]
    Command(String),

    #[error("malformed response to `{command}`: {source}")]
    MalformedResponse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("engine transport error: {0}")]
    Transport(String),
}

/// Raw sync status as reported by `syncstatus` on every poll.
///
/// When a sync run finishes inside a single batch the engine reports almost
/// none of these fields, so everything defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncStatus {
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub sync_id: u64,
    #[serde(default)]
    pub batch_num: u64,
    #[serde(default)]
    pub batch_total: u64,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default)]
    pub end_block: u64,
    #[serde(default)]
    pub synced_blocks: i64,
    #[serde(default)]
    pub trial_decryptions_blocks: i64,
    #[serde(default)]
    pub txn_scan_blocks: i64,
    #[serde(default)]
    pub witnesses_updated: i64,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Kind tag on a raw transaction-summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryKind {
    Sent,
    Received,
    Fee,
}

/// One row of the `summaries` output: a single (txid, pool-or-address, kind)
/// line-item. Several rows with the same txid describe one logical
/// transaction; `crate::wallet::aggregator` folds them back together.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTxSummaryLine {
    pub txid: String,
    pub kind: SummaryKind,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub unconfirmed: bool,
    #[serde(default)]
    pub datetime: i64,
    /// Amount in base units (zatoshis). Signed: the engine reports spends as
    /// positive amounts but nothing in the contract forbids a negative.
    #[serde(default)]
    pub amount: i64,
    /// May arrive as the literal string `"None"`; normalized downstream.
    #[serde(default)]
    pub to_address: Option<String>,
    /// May arrive as the literal string `"None"`; normalized downstream.
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub memos: Option<Vec<String>>,
    /// Fiat price at transaction time; the engine emits `"None"` or null
    /// when it has no price point.
    #[serde(default, deserialize_with = "price_or_none")]
    pub price: Option<f64>,
}

fn price_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    })
}

/// Polling handle for an in-flight send. `id` increases monotonically per
/// send attempt, which is what lets a caller distinguish a stale in-flight
/// send from the one it just submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendProgress {
    pub id: i64,
    #[serde(default)]
    pub sending: bool,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeightResponse {
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfoResponse {
    #[serde(default)]
    pub chain_name: String,
    #[serde(default)]
    pub latest_block_height: u64,
    #[serde(default)]
    pub server_uri: Option<String>,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub git_commit: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultFeeResponse {
    #[serde(default)]
    pub defaultfee: u64,
}

/// Per-pool balances in base units.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub orchard_balance: u64,
    #[serde(default)]
    pub sapling_balance: u64,
    #[serde(default)]
    pub transparent_balance: u64,
    #[serde(default)]
    pub spendable_orchard_balance: u64,
    #[serde(default)]
    pub spendable_sapling_balance: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteEntry {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub value: u64,
}

/// Pending and unspent note/UTXO lists from the `notes` command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotesResponse {
    #[serde(default)]
    pub pending_orchard_notes: Vec<NoteEntry>,
    #[serde(default)]
    pub pending_sapling_notes: Vec<NoteEntry>,
    #[serde(default)]
    pub pending_utxos: Vec<NoteEntry>,
    #[serde(default)]
    pub unspent_orchard_notes: Vec<NoteEntry>,
    #[serde(default)]
    pub unspent_sapling_notes: Vec<NoteEntry>,
    #[serde(default)]
    pub unspent_utxos: Vec<NoteEntry>,
}

/// Per-protocol receivers inside one unified address record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressReceivers {
    #[serde(default)]
    pub transparent: Option<String>,
    #[serde(default)]
    pub sapling: Option<String>,
    #[serde(default)]
    pub orchard_exists: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressEntry {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub receivers: AddressReceivers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedResponse {
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub birthday: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UfvkResponse {
    #[serde(default)]
    pub ufvk: Option<String>,
    #[serde(default)]
    pub birthday: Option<u64>,
}
