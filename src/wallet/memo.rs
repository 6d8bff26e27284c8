//! Multi-part memo splitting and reassembly.
//!
//! Memos are capped by the protocol, so long texts are split into chunks
//! tagged `(i/n)` and carried by separate outputs of the same transaction.
//! Splitting measures UTF-16 cost (the encoding the enclosing field uses):
//! one unit per BMP code point, four per code point above the BMP. On the
//! read side the tag is parsed back out, chunks are ordered by index and
//! concatenated, and untagged memos pass through untouched.

use itertools::Itertools;
use rust_decimal::Decimal;

use super::types::TxDetail;

/// Byte budget of one memo chunk, leaving room for the `(i/n)` tag within
/// the protocol's 512-byte field.
pub const MEMO_CHUNK_BYTES: usize = 505;

/// Split `text` into chunks of at most `max_bytes` UTF-16-weighted units.
/// Never splits inside a code point. A chunk holds at least one code point
/// even if that code point alone exceeds the budget.
pub fn split_memo(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for cp in text.chars() {
        let weight = if cp.len_utf16() > 1 { 4 } else { 1 };
        if current_len + weight > max_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(cp);
        current_len += weight;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Prefix each chunk with its `(i/n)` position tag, 1-based.
pub fn tag_chunks(chunks: &[String]) -> Vec<String> {
    let total = chunks.len();
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("({}/{}){}", i + 1, total, chunk))
        .collect()
}

/// Parse a leading `(i/n)` tag, returning the part index and the remaining
/// text. Untagged memos get index 0 so they sort ahead of tagged parts.
fn parse_tag(memo: &str) -> (u64, &str) {
    let Some(rest) = memo.strip_prefix('(') else {
        return (0, memo);
    };
    let Some(slash) = rest.find('/') else {
        return (0, memo);
    };
    let Some(close) = rest.find(')') else {
        return (0, memo);
    };
    if close < slash {
        return (0, memo);
    }
    let (index_digits, total_digits) = (&rest[..slash], &rest[slash + 1..close]);
    let (Ok(index), Ok(_total)) = (index_digits.parse::<u64>(), total_digits.parse::<u64>())
    else {
        return (0, memo);
    };
    (index, &rest[close + 1..])
}

/// Reorder memo parts by their `(i/n)` tags and concatenate the payloads.
/// Empty parts are dropped; `None` when nothing remains. Equal indices keep
/// their arrival order.
pub fn reassemble_memos(parts: &[String]) -> Option<String> {
    let combined: String = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| parse_tag(part))
        .sorted_by_key(|(index, _)| *index)
        .map(|(_, text)| text)
        .collect();
    (!combined.is_empty()).then_some(combined)
}

/// Merge details that target the same address: amounts are summed and memo
/// parts are reassembled into one memo. Group order follows first appearance.
/// The pool distinction is dissolved by this view.
pub fn combine_by_address(details: &[TxDetail]) -> Vec<TxDetail> {
    group_details(details, |detail| Some(detail.address.clone()))
        .into_iter()
        .map(|(address, members)| TxDetail {
            address,
            amount: summed_amount(&members),
            memos: merged_memos(&members),
            pool: None,
        })
        .collect()
}

/// Merge details that share a pool. Details without a pool carry no memo
/// and are dropped from this view; the address distinction is dissolved.
pub fn combine_by_pool(details: &[TxDetail]) -> Vec<TxDetail> {
    group_details(details, |detail| detail.pool.clone())
        .into_iter()
        .map(|(pool, members)| TxDetail {
            address: String::new(),
            amount: summed_amount(&members),
            memos: merged_memos(&members),
            pool: Some(pool),
        })
        .collect()
}

/// Group details by key, preserving first-appearance order of the keys.
fn group_details<'a>(
    details: &'a [TxDetail],
    key_of: impl Fn(&TxDetail) -> Option<String>,
) -> Vec<(String, Vec<&'a TxDetail>)> {
    let mut groups: Vec<(String, Vec<&TxDetail>)> = Vec::new();
    for detail in details {
        let Some(key) = key_of(detail) else {
            continue;
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(detail),
            None => groups.push((key, vec![detail])),
        }
    }
    groups
}

fn summed_amount(members: &[&TxDetail]) -> Decimal {
    members.iter().map(|d| d.amount).sum()
}

fn merged_memos(members: &[&TxDetail]) -> Option<Vec<String>> {
    let parts: Vec<String> = members
        .iter()
        .flat_map(|d| d.memos.iter().flatten().cloned())
        .collect();
    reassemble_memos(&parts).map(|memo| vec![memo])
}
