use std::sync::Arc;

use chrono::{DateTime, Utc};
use myfin_core::error::MyfinError;
use myfin_core::ledger::{balance_of, check_sequence, EntryKind, EntryStatus, LedgerEntry};
use myfin_core::types::{Amount, EntryId};
use tracing::info;

use crate::db::{keys, StagedWrites, StateDb};

/// Append-only transaction history for the active identity.
///
/// Stored newest first under `ledger`. No update or delete exists; a
/// correction is a new entry.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<StateDb>,
}

impl LedgerStore {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    /// All entries, newest first. If any stored entry fails validation the
    /// whole sequence is discarded and an empty history is returned.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, MyfinError> {
        let user = self.db.user()?;
        let Some(bytes) = user.get_raw(keys::LEDGER)? else {
            return Ok(Vec::new());
        };
        match decode(&bytes) {
            Ok(entries) => Ok(entries),
            Err(invalid) => {
                user.discard(invalid)?;
                Ok(Vec::new())
            }
        }
    }

    /// Record a new entry with a fresh id and the given timestamp.
    pub fn append(
        &self,
        kind: EntryKind,
        amount: Amount,
        status: EntryStatus,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, MyfinError> {
        let mut staged = StagedWrites::new();
        let entry = self.stage_append(&mut staged, kind, amount, status, now)?;
        self.db.user()?.commit(staged)?;
        Ok(entry)
    }

    /// Stage an append into a larger atomic write. Stage at most one append
    /// per batch: each call rewrites the whole sequence.
    pub fn stage_append(
        &self,
        staged: &mut StagedWrites,
        kind: EntryKind,
        amount: Amount,
        status: EntryStatus,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, MyfinError> {
        let mut entries = self.read_all()?;
        let entry = LedgerEntry {
            id: EntryId(self.db.generate_id()?),
            kind,
            amount,
            timestamp: now,
            status,
        };
        entries.insert(0, entry.clone());
        staged.put_json(keys::LEDGER, &entries)?;
        info!(entry_id = %entry.id, kind = ?kind, amount, status = ?status, "staged ledger entry");
        Ok(entry)
    }

    pub fn balance(&self) -> Result<Amount, MyfinError> {
        Ok(balance_of(&self.read_all()?))
    }
}

/// Parse and validate the stored sequence. Failures name the ledger key so
/// the store can drop it.
fn decode(bytes: &[u8]) -> Result<Vec<LedgerEntry>, MyfinError> {
    let entries: Vec<LedgerEntry> =
        serde_json::from_slice(bytes).map_err(|e| MyfinError::validation(keys::LEDGER, e))?;
    check_sequence(&entries).map_err(|reason| MyfinError::validation(keys::LEDGER, reason))?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use myfin_core::types::IdentityKey;

    fn store() -> LedgerStore {
        let db = StateDb::temporary().unwrap();
        db.switch_identity(&IdentityKey::from_login("08012345678", "0123456789")).unwrap();
        LedgerStore::new(Arc::new(db))
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, secs).unwrap()
    }

    #[test]
    fn empty_ledger_reads_empty() {
        assert!(store().read_all().unwrap().is_empty());
    }

    #[test]
    fn append_then_read_reproduces_entry() {
        let ledger = store();
        let entry = ledger.append(EntryKind::Mined, 250, EntryStatus::Completed, at(1)).unwrap();
        let all = ledger.read_all().unwrap();
        assert_eq!(all, vec![entry]);
    }

    #[test]
    fn entries_are_newest_first_with_increasing_ids() {
        let ledger = store();
        let a = ledger.append(EntryKind::Mined, 250, EntryStatus::Completed, at(1)).unwrap();
        let b = ledger.append(EntryKind::Purchase, -100, EntryStatus::Completed, at(1)).unwrap();
        let c = ledger.append(EntryKind::Withdrawal, -50, EntryStatus::Pending, at(2)).unwrap();
        assert!(a.id < b.id && b.id < c.id);
        let all = ledger.read_all().unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![c.id, b.id, a.id]);
        assert_eq!(ledger.balance().unwrap(), 100);
    }

    #[test]
    fn same_timestamp_does_not_collide() {
        let ledger = store();
        let ids: Vec<_> = (0..20)
            .map(|_| ledger.append(EntryKind::Mined, 250, EntryStatus::Completed, at(0)).unwrap().id)
            .collect();
        let mut dedup = ids.clone();
        dedup.dedup();
        assert_eq!(ids.len(), dedup.len());
    }

    #[test]
    fn malformed_ledger_reads_empty_and_recovers() {
        let ledger = store();
        ledger.append(EntryKind::Mined, 250, EntryStatus::Completed, at(1)).unwrap();
        ledger.db.user().unwrap().put_raw(keys::LEDGER, br#"[{"id":"x"}]"#).unwrap();

        assert!(ledger.read_all().unwrap().is_empty());
        let entry = ledger.append(EntryKind::Mined, 250, EntryStatus::Completed, at(2)).unwrap();
        assert_eq!(ledger.read_all().unwrap(), vec![entry]);
    }

    #[test]
    fn one_bad_entry_discards_the_whole_sequence() {
        let ledger = store();
        let raw = r#"[
            {"id":2,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:02Z","status":"Completed"},
            {"id":1,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:01Z","status":"Lost"}
        ]"#;
        ledger.db.user().unwrap().put_raw(keys::LEDGER, raw.as_bytes()).unwrap();
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn out_of_order_ids_are_rejected() {
        let ledger = store();
        let raw = r#"[
            {"id":1,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:02Z","status":"Completed"},
            {"id":2,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:01Z","status":"Completed"}
        ]"#;
        ledger.db.user().unwrap().put_raw(keys::LEDGER, raw.as_bytes()).unwrap();
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn decode_failures_name_the_ledger_key() {
        let cases: [&[u8]; 2] = [b"not json", br#"[{"id":"x"}]"#];
        for raw in cases {
            match decode(raw) {
                Err(MyfinError::Validation { key, .. }) => assert_eq!(key, keys::LEDGER),
                other => panic!("unexpected {other:?}"),
            }
        }
        let out_of_order = r#"[
            {"id":1,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:02Z","status":"Completed"},
            {"id":2,"kind":"Mined","amount":250,"timestamp":"2026-10-19T09:00:01Z","status":"Completed"}
        ]"#;
        assert!(matches!(decode(out_of_order.as_bytes()), Err(MyfinError::Validation { .. })));
    }
}
