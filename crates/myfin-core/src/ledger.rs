use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Amount, EntryId};

/// What a ledger entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Credit from one mining tap.
    Mined,
    /// Withdrawal request (negative amount).
    Withdrawal,
    /// Plan purchase (negative amount: the plan price).
    Purchase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    Completed,
    Pending,
    Failed,
}

/// One immutable balance-affecting record. Corrections are new entries,
/// never edits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub status: EntryStatus,
}

/// Check a stored sequence (newest first): ids must be strictly decreasing,
/// which also makes them unique. Returns the first violation found.
pub fn check_sequence(entries: &[LedgerEntry]) -> Result<(), String> {
    for pair in entries.windows(2) {
        if pair[0].id <= pair[1].id {
            return Err(format!(
                "entry {} is stored before entry {} but is not newer",
                pair[0].id, pair[1].id
            ));
        }
    }
    Ok(())
}

/// Balance is the sum of every entry amount.
pub fn balance_of(entries: &[LedgerEntry]) -> Amount {
    entries.iter().map(|e| e.amount).sum()
}
