//! Turns recipient entries into the engine's send payload.
//!
//! Amounts are whole-coin decimals on the way in and base units on the
//! wire. Memos over the protocol cap are split into tagged parts, each
//! carried by an extra zero-value output to the same address; the receiving
//! side's aggregation stitches them back together.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::wallet::memo::{split_memo, tag_chunks, MEMO_CHUNK_BYTES};
use crate::wallet::types::COIN;

/// Largest memo the protocol carries in one output.
pub const MAX_MEMO_BYTES: usize = 512;

/// One output of the engine's send payload, amount in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendItem {
    pub address: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("recipient address is empty")]
    MissingRecipient,

    #[error("amount {0} is not representable in base units")]
    BadAmount(Decimal),
}

/// Accumulates recipients and produces the wire payload.
#[derive(Default)]
pub struct SendBuilder {
    recipients: Vec<(String, Decimal, Option<String>)>,
}

impl SendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one recipient. `amount` is in whole coins; an empty memo means
    /// no memo.
    pub fn add_recipient(
        mut self,
        address: impl Into<String>,
        amount: Decimal,
        memo: Option<String>,
    ) -> Self {
        self.recipients.push((address.into(), amount, memo));
        self
    }

    pub fn build(self) -> Result<Vec<SendItem>, BuildError> {
        let mut items = Vec::new();
        for (address, amount, memo) in self.recipients {
            if address.is_empty() {
                return Err(BuildError::MissingRecipient);
            }
            let zats = to_zats(amount)?;
            let memo = memo.filter(|m| !m.is_empty());

            match memo {
                Some(memo) if memo.len() > MAX_MEMO_BYTES => {
                    // First part carries the value, the rest ride along on
                    // zero-value outputs to the same address.
                    let parts = tag_chunks(&split_memo(&memo, MEMO_CHUNK_BYTES));
                    for (i, part) in parts.into_iter().enumerate() {
                        items.push(SendItem {
                            address: address.clone(),
                            amount: if i == 0 { zats } else { 0 },
                            memo: Some(part),
                        });
                    }
                }
                memo => items.push(SendItem {
                    address,
                    amount: zats,
                    memo,
                }),
            }
        }
        Ok(items)
    }
}

/// Whole-coin decimal to base units, rejecting negatives and amounts finer
/// than one base unit.
fn to_zats(amount: Decimal) -> Result<u64, BuildError> {
    let scaled = amount * Decimal::from(COIN);
    if scaled.is_sign_negative() || scaled.normalize().scale() != 0 {
        return Err(BuildError::BadAmount(amount));
    }
    scaled.to_u64().ok_or(BuildError::BadAmount(amount))
}
