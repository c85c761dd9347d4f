use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in whole Naira. Signed: debits are recorded as negative
/// ledger amounts.
pub type Amount = i64;

/// Count of mining taps.
pub type Taps = u32;

/// Unix timestamp in milliseconds (UTC).
pub type TimestampMs = i64;

// ── EntryId ──────────────────────────────────────────────────────────────────

/// Ledger entry identifier. Allocated from the store's persisted monotonic
/// counter, so ids are unique and strictly increasing in creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

// ── TaskId ───────────────────────────────────────────────────────────────────

/// Identifier of a task in the configured task catalog (e.g. `"youtube"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── IdentityKey ──────────────────────────────────────────────────────────────

/// Logical user identity derived from the login inputs: `<phone>-<account>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn from_login(phone: &str, account_number: &str) -> Self {
        Self(format!("{phone}-{account_number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable storage namespace for this identity: BLAKE3 of the key,
    /// hex-encoded, so raw phone numbers never appear in tree names.
    pub fn namespace(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        format!("user/{}", hex::encode(&digest.as_bytes()[..16]))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", self.0)
    }
}

// ── PaymentReference ─────────────────────────────────────────────────────────

/// Reference handed to the payment collaborator; echoed back on success or
/// close so stale callbacks can be told apart from the pending purchase.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct PaymentReference(pub String);

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
