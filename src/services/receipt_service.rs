use chrono::NaiveDate;

use crate::config::ReceiptConfig;
use crate::error::{Error, Result};
use crate::store::ReceiptLedger;

const MAX_COLLISION_CHECKS: u32 = 10;

/// Hands out `<prefix>-<YYYYMMDD>-<sequence>` receipt numbers. The sequence
/// continues across days; the date only reflects the day of issue.
#[derive(Debug, Clone)]
pub struct ReceiptAllocator {
    prefix: String,
    start_sequence: u64,
}

impl ReceiptAllocator {
    pub fn new(config: &ReceiptConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            start_sequence: config.start_sequence,
        }
    }

    pub fn format(&self, date: NaiveDate, sequence: u64) -> String {
        format!("{}-{}-{}", self.prefix, date.format("%Y%m%d"), sequence)
    }

    pub async fn allocate<L>(&self, ledger: &L, date: NaiveDate) -> Result<String>
    where
        L: ReceiptLedger + ?Sized,
    {
        let mut sequence = match ledger.last_receipt_number(&self.prefix).await? {
            Some(last) => match parse_sequence(&self.prefix, &last) {
                Some(seq) => next_sequence(seq)?,
                None => {
                    tracing::warn!(receipt = %last, "Unparseable last receipt number, restarting sequence");
                    self.start_sequence
                }
            },
            None => self.start_sequence,
        };

        for _ in 0..MAX_COLLISION_CHECKS {
            let candidate = self.format(date, sequence);
            if !ledger.receipt_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(receipt = %candidate, "Receipt number already issued, trying next sequence");
            sequence = next_sequence(sequence)?;
        }

        Err(Error::Conflict(format!(
            "Could not allocate a free receipt number after {} attempts",
            MAX_COLLISION_CHECKS
        )))
    }
}

fn next_sequence(sequence: u64) -> Result<u64> {
    sequence
        .checked_add(1)
        .ok_or_else(|| Error::Conflict("Receipt sequence exhausted".into()))
}

/// Trailing sequence of a `<prefix>-<8 digit date>-<digits>` receipt.
pub fn parse_sequence(prefix: &str, receipt: &str) -> Option<u64> {
    let rest = receipt.strip_prefix(prefix)?.strip_prefix('-')?;
    let (date, sequence) = rest.split_once('-')?;
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    sequence.parse().ok()
}
