use std::sync::Arc;

use chrono::{DateTime, Utc};
use myfin_core::catalog::{MinerPlan, PlanKind};
use myfin_core::error::MyfinError;
use myfin_core::ledger::{EntryKind, EntryStatus, LedgerEntry};
use myfin_core::types::{TaskId, Taps};
use tracing::{info, warn};

use crate::completions::CompletionFlags;
use crate::db::{keys, StagedWrites, StateDb};
use crate::ledger::LedgerStore;
use crate::quota::QuotaTracker;

/// Result of a claim attempt. Refusals are expected outcomes, not errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Granted {
        taps: Taps,
        capacity: Taps,
        /// Present when the grant carried a price.
        entry: Option<LedgerEntry>,
    },
    AlreadyClaimed,
    TasksIncomplete { remaining: Vec<TaskId> },
}

/// Whether the special offer can be bought right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecialEligibility {
    Eligible,
    AlreadyClaimed,
    TasksIncomplete { remaining: Vec<TaskId> },
}

/// One-time and daily claim flags.
///
/// `offers.specialClaimed` is date-scoped and cleared on rollover;
/// `offers.freeClaimed` lives as long as the identity. A successful claim
/// writes its flag, the capacity grant and any ledger entry in one batch.
#[derive(Clone)]
pub struct OfferRegistry {
    db: Arc<StateDb>,
    quota: QuotaTracker,
    ledger: LedgerStore,
    completions: CompletionFlags,
    catalog: Vec<TaskId>,
}

impl OfferRegistry {
    pub fn new(
        db: Arc<StateDb>,
        quota: QuotaTracker,
        ledger: LedgerStore,
        completions: CompletionFlags,
        catalog: Vec<TaskId>,
    ) -> Self {
        Self { db, quota, ledger, completions, catalog }
    }

    pub fn is_special_offer_claimed(&self) -> Result<bool, MyfinError> {
        self.db.user()?.get_or_default(keys::OFFERS_SPECIAL_CLAIMED)
    }

    pub fn is_free_grant_claimed(&self) -> Result<bool, MyfinError> {
        self.db.user()?.get_or_default(keys::OFFERS_FREE_CLAIMED)
    }

    pub fn special_eligibility(&self) -> Result<SpecialEligibility, MyfinError> {
        if self.is_special_offer_claimed()? {
            return Ok(SpecialEligibility::AlreadyClaimed);
        }
        let remaining = self.completions.remaining(&self.catalog)?;
        if !remaining.is_empty() {
            return Ok(SpecialEligibility::TasksIncomplete { remaining });
        }
        Ok(SpecialEligibility::Eligible)
    }

    /// Claim today's special offer. Requires every catalog task completed.
    pub fn claim_special_offer(
        &self,
        plan: &MinerPlan,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MyfinError> {
        debug_assert_eq!(plan.kind, PlanKind::Special);
        match self.special_eligibility()? {
            SpecialEligibility::AlreadyClaimed => Ok(ClaimOutcome::AlreadyClaimed),
            SpecialEligibility::TasksIncomplete { remaining } => {
                Ok(ClaimOutcome::TasksIncomplete { remaining })
            }
            SpecialEligibility::Eligible => {
                self.apply_grant(keys::OFFERS_SPECIAL_CLAIMED, plan, now)
            }
        }
    }

    /// Apply a paid special offer. Eligibility is settled before payment is
    /// taken, so a confirmed payment always lands, even after a rollover has
    /// cleared the tasks in the meantime.
    pub fn confirm_special_offer(
        &self,
        plan: &MinerPlan,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MyfinError> {
        debug_assert_eq!(plan.kind, PlanKind::Special);
        if self.special_eligibility()? != SpecialEligibility::Eligible {
            warn!(plan = %plan.name, "applying paid special offer that is no longer claimable");
        }
        self.apply_grant(keys::OFFERS_SPECIAL_CLAIMED, plan, now)
    }

    /// Claim the one-time free grant. A second call is a no-op.
    pub fn claim_free_grant(
        &self,
        plan: &MinerPlan,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MyfinError> {
        debug_assert_eq!(plan.kind, PlanKind::Free);
        if self.is_free_grant_claimed()? {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        self.apply_grant(keys::OFFERS_FREE_CLAIMED, plan, now)
    }

    /// Stage clearing of the date-scoped flags.
    pub fn stage_clear_daily(&self, staged: &mut StagedWrites) {
        staged.remove(keys::OFFERS_SPECIAL_CLAIMED);
    }

    fn apply_grant(
        &self,
        flag: &str,
        plan: &MinerPlan,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MyfinError> {
        let mut staged = StagedWrites::new();
        staged.put(flag, &true)?;
        let capacity = self.quota.stage_grant(&mut staged, plan.taps)?;
        let entry = if plan.price != 0 {
            Some(self.ledger.stage_append(
                &mut staged,
                EntryKind::Purchase,
                -plan.price,
                EntryStatus::Completed,
                now,
            )?)
        } else {
            None
        };
        self.db.user()?.commit(staged)?;
        info!(flag, plan = %plan.name, taps = plan.taps, capacity, "claim granted");
        Ok(ClaimOutcome::Granted { taps: plan.taps, capacity, entry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use myfin_core::config::AppConfig;
    use myfin_core::types::IdentityKey;

    struct Fixture {
        registry: OfferRegistry,
        quota: QuotaTracker,
        ledger: LedgerStore,
        completions: CompletionFlags,
        config: AppConfig,
    }

    fn fixture() -> Fixture {
        let db = StateDb::temporary().unwrap();
        db.switch_identity(&IdentityKey::from_login("08012345678", "0123456789")).unwrap();
        let db = Arc::new(db);
        let config = AppConfig::default();
        let quota = QuotaTracker::new(db.clone(), 0);
        let ledger = LedgerStore::new(db.clone());
        let completions = CompletionFlags::new(db.clone());
        let registry = OfferRegistry::new(
            db,
            quota.clone(),
            ledger.clone(),
            completions.clone(),
            config.task_ids().cloned().collect(),
        );
        Fixture { registry, quota, ledger, completions, config }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
    }

    #[test]
    fn free_grant_is_idempotent() {
        let f = fixture();
        let plan = f.config.plan_of_kind(PlanKind::Free).unwrap().clone();

        let first = f.registry.claim_free_grant(&plan, now()).unwrap();
        assert!(matches!(first, ClaimOutcome::Granted { taps: 10, entry: None, .. }));
        let capacity = f.quota.current_capacity().unwrap();
        let history = f.ledger.read_all().unwrap();

        assert_eq!(f.registry.claim_free_grant(&plan, now()).unwrap(), ClaimOutcome::AlreadyClaimed);
        assert_eq!(f.quota.current_capacity().unwrap(), capacity);
        assert_eq!(f.ledger.read_all().unwrap(), history);
        assert!(f.registry.is_free_grant_claimed().unwrap());
    }

    #[test]
    fn special_offer_needs_every_task() {
        let f = fixture();
        let plan = f.config.plan_of_kind(PlanKind::Special).unwrap().clone();
        f.completions.mark_completed(&TaskId::from("video")).unwrap();

        let outcome = f.registry.claim_special_offer(&plan, now()).unwrap();
        match outcome {
            ClaimOutcome::TasksIncomplete { remaining } => assert_eq!(remaining.len(), 7),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.quota.current_capacity().unwrap(), 0);
        assert!(!f.registry.is_special_offer_claimed().unwrap());
    }

    #[test]
    fn special_offer_grants_capacity_and_records_price_together() {
        let f = fixture();
        let plan = f.config.plan_of_kind(PlanKind::Special).unwrap().clone();
        for id in f.config.task_ids() {
            f.completions.mark_completed(id).unwrap();
        }

        let outcome = f.registry.claim_special_offer(&plan, now()).unwrap();
        let ClaimOutcome::Granted { taps, capacity, entry } = outcome else {
            panic!("expected grant");
        };
        assert_eq!((taps, capacity), (10, 10));
        let entry = entry.unwrap();
        assert_eq!((entry.kind, entry.amount), (EntryKind::Purchase, -100));
        assert_eq!(f.ledger.read_all().unwrap(), vec![entry]);
        assert!(f.registry.is_special_offer_claimed().unwrap());
        assert_eq!(f.registry.claim_special_offer(&plan, now()).unwrap(), ClaimOutcome::AlreadyClaimed);
    }
}
