//! Folds raw per-output summary lines into logical transactions.
//!
//! The engine reports one line per (txid, output) pair, with fees carried on
//! separate `Fee` lines. Aggregation groups lines by txid in first-seen
//! order, classifies the transaction, accumulates the fee, and merges the
//! remaining details through the memo layer. The pass is a pure function of
//! its inputs: running it twice over the same lines yields the same list,
//! which is what lets the orchestrator replace the cached list wholesale on
//! every reload.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::trace;

use crate::engine::{RawTxSummaryLine, SummaryKind};

use super::memo::{combine_by_address, combine_by_pool};
use super::types::{Transaction, TransactionKind, TxDetail, zats_to_decimal};

/// Build the caller-facing transaction list from raw summary lines.
///
/// `server_height` anchors confirmation counts; when the server height is
/// not yet known (zero) the wallet height stands in so confirmations never
/// go negative mid-sync.
pub fn aggregate_summaries(
    lines: &[RawTxSummaryLine],
    server_height: u64,
    wallet_height: u64,
) -> Vec<Transaction> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: std::collections::HashMap<&str, Vec<&RawTxSummaryLine>> =
        std::collections::HashMap::new();
    for line in lines {
        groups
            .entry(line.txid.as_str())
            .or_insert_with(|| {
                order.push(line.txid.as_str());
                Vec::new()
            })
            .push(line);
    }

    let anchor = if server_height > 0 {
        server_height
    } else {
        wallet_height
    };

    let mut transactions = Vec::with_capacity(order.len());
    for txid in order {
        let members = &groups[txid];
        transactions.push(build_transaction(txid, members, anchor));
    }
    trace!(
        lines = lines.len(),
        transactions = transactions.len(),
        "aggregated transaction summaries"
    );
    transactions
}

fn build_transaction(txid: &str, lines: &[&RawTxSummaryLine], anchor: u64) -> Transaction {
    let has_transfer = lines.iter().any(|l| l.kind != SummaryKind::Fee);
    let kind = if !has_transfer {
        TransactionKind::SendToSelf
    } else if lines.iter().any(|l| l.kind == SummaryKind::Fee) {
        TransactionKind::Sent
    } else {
        match lines[0].kind {
            SummaryKind::Received => TransactionKind::Received,
            _ => TransactionKind::Sent,
        }
    };

    let unconfirmed = lines.iter().any(|l| l.unconfirmed);
    let confirmations = (!unconfirmed)
        .then(|| (anchor + 1).saturating_sub(lines[0].block_height));

    let time = lines
        .iter()
        .map(|l| l.datetime)
        .find(|ts| *ts != 0)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_default();

    let price = lines.iter().find_map(|l| l.price);

    let mut fee_zats = 0i64;
    let mut has_fee = false;
    let mut details: Vec<TxDetail> = Vec::new();
    for line in lines {
        if line.kind == SummaryKind::Fee {
            fee_zats += line.amount;
            has_fee = true;
            continue;
        }
        details.push(TxDetail {
            address: normalize(&line.to_address),
            amount: zats_to_decimal(line.amount),
            memos: line.memos.as_ref().map(|memos| {
                memos
                    .iter()
                    .filter(|m| !m.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
            }),
            pool: line
                .pool
                .as_deref()
                .filter(|p| !p.is_empty() && *p != "None")
                .map(|p| p.to_string()),
        });
    }
    if details.is_empty() {
        // Fee-only transaction: keep one empty detail so callers always have
        // a row to render.
        details.push(TxDetail {
            address: String::new(),
            amount: Decimal::ZERO,
            memos: None,
            pool: None,
        });
    }

    let details = if kind == TransactionKind::Received {
        combine_by_pool(&details)
    } else {
        combine_by_address(&details)
    };

    Transaction {
        txid: txid.to_string(),
        kind,
        confirmations,
        time,
        fee: has_fee.then(|| zats_to_decimal(fee_zats)),
        price,
        details,
    }
}

/// The engine uses the literal string `"None"` for an absent address.
fn normalize(address: &Option<String>) -> String {
    match address.as_deref() {
        None | Some("None") => String::new(),
        Some(addr) => addr.to_string(),
    }
}
