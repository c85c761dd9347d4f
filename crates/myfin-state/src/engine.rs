use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use myfin_core::catalog::{MinerPlan, PlanKind};
use myfin_core::config::AppConfig;
use myfin_core::error::MyfinError;
use myfin_core::ledger::{EntryKind, EntryStatus, LedgerEntry};
use myfin_core::types::{Amount, IdentityKey, PaymentReference, Taps};
use serde::Serialize;
use tracing::{debug, info};

use crate::completions::CompletionFlags;
use crate::db::{StagedWrites, StateDb};
use crate::ledger::LedgerStore;
use crate::offers::{ClaimOutcome, OfferRegistry, SpecialEligibility};
use crate::quota::QuotaTracker;
use crate::session::Profile;

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MineOutcome {
    Mined {
        entry: LedgerEntry,
        balance: Amount,
        remaining: Taps,
        /// This tap used the last of today's capacity.
        limit_reached: bool,
        /// Balance crossed the milestone for the first time.
        milestone_reached: bool,
    },
    QuotaExceeded { used: Taps, capacity: Taps },
    /// A previous tap is still inside its cooldown window.
    Busy,
}

/// What to do with a plan the user picked in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseGate {
    /// Hand `amount_minor` to the payment collaborator; apply nothing until
    /// it confirms.
    AwaitPayment { plan: MinerPlan, amount_minor: i64 },
    /// The plan needs no payment and was settled immediately.
    Settled(ClaimOutcome),
    /// The special offer cannot be bought right now.
    NotEligible(SpecialEligibility),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    Recorded { entry: LedgerEntry, balance: Amount },
    BelowThreshold { balance: Amount, threshold: Amount },
    AmountTooSmall { minimum: Amount },
}

/// Values forwarded between views.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub balance: Amount,
    pub used_today: Taps,
    pub capacity: Taps,
    pub remaining: Taps,
    pub special_claimed: bool,
    pub free_claimed: bool,
}

// ── RewardEngine ──────────────────────────────────────────────────────────────

/// Orchestrates quota, ledger and claim state for the active identity.
///
/// Every operation that changes more than one key stages its writes and
/// commits them as one batch, so an interrupted operation leaves either all
/// of its effects or none. Day rollover is checked before any quota-using
/// operation.
pub struct RewardEngine {
    db: Arc<StateDb>,
    config: Arc<AppConfig>,
    ledger: LedgerStore,
    quota: QuotaTracker,
    completions: CompletionFlags,
    offers: OfferRegistry,
    profile: Profile,
    session: Option<(IdentityKey, NaiveDate)>,
    last_mine_at: Option<DateTime<Utc>>,
}

impl RewardEngine {
    pub fn new(db: Arc<StateDb>, config: Arc<AppConfig>) -> Self {
        let ledger = LedgerStore::new(db.clone());
        let quota = QuotaTracker::new(db.clone(), config.daily_free_taps);
        let completions = CompletionFlags::new(db.clone());
        let offers = OfferRegistry::new(
            db.clone(),
            quota.clone(),
            ledger.clone(),
            completions.clone(),
            config.task_ids().cloned().collect(),
        );
        let profile = Profile::new(db.clone());
        Self {
            db,
            config,
            ledger,
            quota,
            completions,
            offers,
            profile,
            session: None,
            last_mine_at: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn completions(&self) -> &CompletionFlags {
        &self.completions
    }

    pub fn offers(&self) -> &OfferRegistry {
        &self.offers
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Identity the current session was started for.
    pub fn active_identity(&self) -> Option<&IdentityKey> {
        self.session.as_ref().map(|(identity, _)| identity)
    }

    /// Fresh reference for a payment hand-off.
    pub fn next_payment_reference(&self) -> Result<PaymentReference, MyfinError> {
        Ok(PaymentReference(format!("MYFIN-{:08}", self.db.generate_id()?)))
    }

    // ── Session / rollover ────────────────────────────────────────────────────

    /// Evaluate day rollover for the active identity. On a new day, resets
    /// usage and clears the completed tasks and the special-offer flag in a
    /// single batch. Returns `true` if a rollover happened.
    pub fn start_session(&mut self, today: NaiveDate) -> Result<bool, MyfinError> {
        let identity = self.db.current_identity()?.ok_or(MyfinError::NoActiveIdentity)?;
        let mut staged = StagedWrites::new();
        let rolled = self.quota.stage_rollover(&mut staged, today)?;
        if rolled {
            self.completions.stage_clear(&mut staged);
            self.offers.stage_clear_daily(&mut staged);
        }
        self.db.user()?.commit(staged)?;
        if rolled {
            info!(identity = %identity, %today, "daily state rolled over");
        }
        self.session = Some((identity, today));
        Ok(rolled)
    }

    /// Run `start_session` unless it already ran today for this identity.
    /// Returns `true` if a rollover happened.
    pub fn ensure_session(&mut self, now: DateTime<Utc>) -> Result<bool, MyfinError> {
        let today = now.date_naive();
        let identity = self.db.current_identity()?;
        let current = match (&self.session, identity) {
            (Some((id, day)), Some(active)) => *id == active && *day == today,
            _ => false,
        };
        if current {
            return Ok(false);
        }
        self.last_mine_at = None;
        self.start_session(today)
    }

    // ── Mining ────────────────────────────────────────────────────────────────

    /// One mining tap: consume a tap and credit the reward, or refuse.
    pub fn perform_mine(&mut self, now: DateTime<Utc>) -> Result<MineOutcome, MyfinError> {
        self.ensure_session(now)?;

        if let Some(last) = self.last_mine_at {
            if now < last + Duration::milliseconds(self.config.mine_cooldown_ms) {
                debug!("mine rejected inside cooldown window");
                return Ok(MineOutcome::Busy);
            }
        }

        let mut staged = StagedWrites::new();
        if !self.quota.stage_consume(&mut staged, 1)? {
            return Ok(MineOutcome::QuotaExceeded {
                used: self.quota.used_today()?,
                capacity: self.quota.current_capacity()?,
            });
        }

        let before = self.ledger.balance()?;
        let entry = self.ledger.stage_append(
            &mut staged,
            EntryKind::Mined,
            self.config.tap_reward,
            EntryStatus::Completed,
            now,
        )?;
        let balance = before + entry.amount;

        let milestone_reached =
            balance >= self.config.balance_milestone && !self.profile.milestone_notified()?;
        if milestone_reached {
            self.profile.stage_milestone_notified(&mut staged)?;
        }

        self.db.user()?.commit(staged)?;
        self.last_mine_at = Some(now);

        let remaining = self.quota.remaining()?;
        info!(entry_id = %entry.id, balance, remaining, "mined");
        Ok(MineOutcome::Mined {
            entry,
            balance,
            remaining,
            limit_reached: remaining == 0,
            milestone_reached,
        })
    }

    // ── Claims & purchases ────────────────────────────────────────────────────

    pub fn claim_free_grant(&mut self, now: DateTime<Utc>) -> Result<ClaimOutcome, MyfinError> {
        self.ensure_session(now)?;
        let plan = self
            .config
            .plan_of_kind(PlanKind::Free)
            .ok_or_else(|| MyfinError::UnknownPlan("free plan".into()))?
            .clone();
        self.offers.claim_free_grant(&plan, now)
    }

    /// Decide how the chosen plan proceeds. Never grants anything for a
    /// paid plan; that happens in `complete_purchase`.
    pub fn begin_purchase(
        &mut self,
        plan_name: &str,
        now: DateTime<Utc>,
    ) -> Result<PurchaseGate, MyfinError> {
        self.ensure_session(now)?;
        let plan = self.config.plan(plan_name)?.clone();
        match plan.kind {
            PlanKind::Free => Ok(PurchaseGate::Settled(self.offers.claim_free_grant(&plan, now)?)),
            PlanKind::Special => match self.offers.special_eligibility()? {
                SpecialEligibility::Eligible => Ok(Self::await_payment(plan)),
                refused => Ok(PurchaseGate::NotEligible(refused)),
            },
            PlanKind::Standard if !plan.requires_payment() => {
                Ok(PurchaseGate::Settled(self.complete_purchase(&plan.name, now)?))
            }
            PlanKind::Standard => Ok(Self::await_payment(plan)),
        }
    }

    fn await_payment(plan: MinerPlan) -> PurchaseGate {
        let amount_minor = plan.amount_minor();
        PurchaseGate::AwaitPayment { plan, amount_minor }
    }

    /// Apply a confirmed payment: capacity grant, `Purchase` entry and, for
    /// the special plan, the daily claim flag, all in one batch. Paid plans
    /// are never refused here; eligibility belongs to `begin_purchase`.
    pub fn complete_purchase(
        &mut self,
        plan_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MyfinError> {
        self.ensure_session(now)?;
        let plan = self.config.plan(plan_name)?.clone();
        match plan.kind {
            PlanKind::Special => self.offers.confirm_special_offer(&plan, now),
            PlanKind::Free => self.offers.claim_free_grant(&plan, now),
            PlanKind::Standard => {
                let mut staged = StagedWrites::new();
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
                info!(plan = %plan.name, taps = plan.taps, capacity, "purchase applied");
                Ok(ClaimOutcome::Granted { taps: plan.taps, capacity, entry })
            }
        }
    }

    /// Plans the store should show: the special plan disappears once claimed
    /// today and the free plan once claimed for good.
    pub fn visible_plans(&self) -> Result<Vec<MinerPlan>, MyfinError> {
        let special = self.offers.is_special_offer_claimed()?;
        let free = self.offers.is_free_grant_claimed()?;
        Ok(self
            .config
            .plans
            .iter()
            .filter(|p| !(p.kind == PlanKind::Special && special))
            .filter(|p| !(p.kind == PlanKind::Free && free))
            .cloned()
            .collect())
    }

    // ── Withdrawal ────────────────────────────────────────────────────────────

    /// Record a pending withdrawal right away. The entry is written before
    /// any payout confirmation exists.
    pub fn request_withdrawal(
        &mut self,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalOutcome, MyfinError> {
        self.ensure_session(now)?;
        if amount < self.config.min_withdrawal_amount {
            return Ok(WithdrawalOutcome::AmountTooSmall {
                minimum: self.config.min_withdrawal_amount,
            });
        }
        let balance = self.ledger.balance()?;
        if balance < self.config.withdrawal_threshold {
            return Ok(WithdrawalOutcome::BelowThreshold {
                balance,
                threshold: self.config.withdrawal_threshold,
            });
        }
        let entry = self
            .ledger
            .append(EntryKind::Withdrawal, -amount, EntryStatus::Pending, now)?;
        info!(entry_id = %entry.id, amount, "withdrawal requested");
        Ok(WithdrawalOutcome::Recorded { balance: balance + entry.amount, entry })
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Result<Snapshot, MyfinError> {
        let used_today = self.quota.used_today()?;
        let capacity = self.quota.current_capacity()?;
        Ok(Snapshot {
            balance: self.ledger.balance()?,
            used_today,
            capacity,
            remaining: capacity.saturating_sub(used_today),
            special_claimed: self.offers.is_special_offer_claimed()?,
            free_claimed: self.offers.is_free_grant_claimed()?,
        })
    }

    pub fn history(&self) -> Result<Vec<LedgerEntry>, MyfinError> {
        self.ledger.read_all()
    }

    pub fn new_user_offer_remaining(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Duration>, MyfinError> {
        self.profile
            .new_user_offer_remaining(self.config.new_user_offer_window_secs, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use myfin_core::identity::Credentials;
    use myfin_core::types::TaskId;

    use crate::session::login;

    fn creds(phone: &str) -> Credentials {
        Credentials {
            phone: phone.into(),
            account_name: "Ada Obi".into(),
            account_number: "0123456789".into(),
            password: phone[phone.len() - 4..].into(),
        }
    }

    fn engine() -> RewardEngine {
        let db = Arc::new(StateDb::temporary().unwrap());
        login(&db, &creds("08012345678"), t(0)).unwrap();
        RewardEngine::new(db, Arc::new(AppConfig::default()))
    }

    /// 2026-10-19 08:00 UTC plus `ms` milliseconds.
    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn next_day(ms: i64) -> DateTime<Utc> {
        t(ms) + Duration::days(1)
    }

    fn complete_all_tasks(e: &RewardEngine) {
        let ids: Vec<TaskId> = e.config().task_ids().cloned().collect();
        for id in &ids {
            e.completions().mark_completed(id).unwrap();
        }
    }

    #[test]
    fn five_taps_then_quota_exceeded() {
        let mut e = engine();
        e.quota().grant_capacity(5).unwrap();

        for i in 0..5 {
            let outcome = e.perform_mine(t(1_000 * (i + 1))).unwrap();
            let MineOutcome::Mined { entry, limit_reached, .. } = outcome else {
                panic!("tap {i} refused");
            };
            assert_eq!(entry.kind, EntryKind::Mined);
            assert_eq!(entry.amount, 250);
            assert_eq!(limit_reached, i == 4);
        }
        assert_eq!(
            e.perform_mine(t(10_000)).unwrap(),
            MineOutcome::QuotaExceeded { used: 5, capacity: 5 }
        );
        let history = e.history().unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.iter().all(|x| x.kind == EntryKind::Mined && x.amount == 250));
        assert_eq!(e.snapshot().unwrap().balance, 1_250);
    }

    #[test]
    fn rapid_repeat_tap_is_rejected() {
        let mut e = engine();
        e.quota().grant_capacity(5).unwrap();
        assert!(matches!(e.perform_mine(t(1_000)).unwrap(), MineOutcome::Mined { .. }));
        assert_eq!(e.perform_mine(t(1_050)).unwrap(), MineOutcome::Busy);
        assert!(matches!(e.perform_mine(t(1_200)).unwrap(), MineOutcome::Mined { .. }));
        assert_eq!(e.quota().used_today().unwrap(), 2);
    }

    #[test]
    fn milestone_is_announced_once() {
        let mut e = engine();
        e.quota().grant_capacity(200).unwrap();
        let mut announced = 0;
        for i in 0..110 {
            if let MineOutcome::Mined { milestone_reached: true, balance, .. } =
                e.perform_mine(t(1_000 * (i + 1))).unwrap()
            {
                assert_eq!(balance, 25_000);
                announced += 1;
            }
        }
        assert_eq!(announced, 1);
    }

    #[test]
    fn rollover_clears_daily_flags_only() {
        let mut e = engine();
        e.quota().grant_capacity(5).unwrap();
        e.claim_free_grant(t(0)).unwrap();
        complete_all_tasks(&e);
        assert!(matches!(e.complete_purchase("Super Taps", t(0)).unwrap(), ClaimOutcome::Granted { .. }));
        for i in 0..5 {
            e.perform_mine(t(1_000 * (i + 1))).unwrap();
        }
        assert_eq!(e.quota().used_today().unwrap(), 5);
        let capacity = e.quota().current_capacity().unwrap();

        e.perform_mine(next_day(0)).unwrap();

        assert_eq!(e.quota().used_today().unwrap(), 1);
        assert_eq!(e.quota().current_capacity().unwrap(), capacity);
        assert!(!e.offers().is_special_offer_claimed().unwrap());
        assert!(e.offers().is_free_grant_claimed().unwrap());
        assert!(e.completions().completed().unwrap().is_empty());
    }

    #[test]
    fn standard_plan_needs_payment_first() {
        let mut e = engine();
        let gate = e.begin_purchase("Bronze Miner", t(0)).unwrap();
        match gate {
            PurchaseGate::AwaitPayment { plan, amount_minor } => {
                assert_eq!(plan.name, "Bronze Miner");
                assert_eq!(amount_minor, 500_000);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(e.quota().current_capacity().unwrap(), 0);
        assert!(e.history().unwrap().is_empty());

        let applied = e.complete_purchase("Bronze Miner", t(10)).unwrap();
        let ClaimOutcome::Granted { taps, capacity, entry: Some(entry) } = applied else {
            panic!("expected grant");
        };
        assert_eq!((taps, capacity), (100, 100));
        assert_eq!((entry.kind, entry.amount), (EntryKind::Purchase, -5_000));
        assert_eq!(e.snapshot().unwrap().balance, -5_000);
    }

    #[test]
    fn free_plan_settles_without_payment() {
        let mut e = engine();
        let gate = e.begin_purchase("Free Taps", t(0)).unwrap();
        assert!(matches!(gate, PurchaseGate::Settled(ClaimOutcome::Granted { taps: 10, .. })));
        assert_eq!(
            e.begin_purchase("Free Taps", t(1)).unwrap(),
            PurchaseGate::Settled(ClaimOutcome::AlreadyClaimed)
        );
        assert_eq!(e.quota().current_capacity().unwrap(), 10);
    }

    #[test]
    fn special_plan_is_gated_by_tasks() {
        let mut e = engine();
        assert!(matches!(
            e.begin_purchase("Super Taps", t(0)).unwrap(),
            PurchaseGate::NotEligible(SpecialEligibility::TasksIncomplete { .. })
        ));
        complete_all_tasks(&e);
        assert!(matches!(
            e.begin_purchase("Super Taps", t(0)).unwrap(),
            PurchaseGate::AwaitPayment { amount_minor: 10_000, .. }
        ));
        e.complete_purchase("Super Taps", t(1)).unwrap();
        assert_eq!(
            e.begin_purchase("Super Taps", t(2)).unwrap(),
            PurchaseGate::NotEligible(SpecialEligibility::AlreadyClaimed)
        );
        let names: Vec<String> = e.visible_plans().unwrap().into_iter().map(|p| p.name).collect();
        assert!(!names.contains(&"Super Taps".to_string()));
        assert!(names.contains(&"Free Taps".to_string()));
    }

    #[test]
    fn special_payment_confirmed_after_midnight_still_applies() {
        let mut e = engine();
        complete_all_tasks(&e);
        let before_midnight = t(16 * 3_600_000 - 10_000);
        assert!(matches!(
            e.begin_purchase("Super Taps", before_midnight).unwrap(),
            PurchaseGate::AwaitPayment { .. }
        ));

        // The rollover clears the tasks before the confirmation lands.
        let after_midnight = next_day(-8 * 3_600_000 + 10_000);
        let outcome = e.complete_purchase("Super Taps", after_midnight).unwrap();
        assert!(matches!(outcome, ClaimOutcome::Granted { taps: 10, capacity: 10, .. }));
        assert_eq!(e.offers().special_eligibility().unwrap(), SpecialEligibility::AlreadyClaimed);
        assert_eq!(e.quota().current_capacity().unwrap(), 10);

        let history = e.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].kind, history[0].amount), (EntryKind::Purchase, -100));
        assert!(e.snapshot().unwrap().special_claimed);
    }

    #[test]
    fn payment_references_are_unique_per_hand_off() {
        let mut e = engine();
        assert_eq!(e.active_identity(), None);
        e.ensure_session(t(0)).unwrap();
        assert_eq!(e.active_identity(), Some(&IdentityKey::from_login("08012345678", "0123456789")));

        let a = e.next_payment_reference().unwrap();
        let b = e.next_payment_reference().unwrap();
        assert!(a.0.starts_with("MYFIN-"));
        assert_ne!(a, b);
    }

    #[test]
    fn withdrawal_requires_threshold_balance() {
        let mut e = engine();
        assert_eq!(
            e.request_withdrawal(1_000, t(0)).unwrap(),
            WithdrawalOutcome::BelowThreshold { balance: 0, threshold: 50_000 }
        );
        assert_eq!(
            e.request_withdrawal(100, t(0)).unwrap(),
            WithdrawalOutcome::AmountTooSmall { minimum: 200 }
        );

        e.quota().grant_capacity(200).unwrap();
        for i in 0..200 {
            e.perform_mine(t(1_000 * (i + 1))).unwrap();
        }
        assert_eq!(e.snapshot().unwrap().balance, 50_000);

        let WithdrawalOutcome::Recorded { entry, balance } =
            e.request_withdrawal(20_000, t(300_000)).unwrap()
        else {
            panic!("expected withdrawal");
        };
        assert_eq!(entry.kind, EntryKind::Withdrawal);
        assert_eq!(entry.amount, -20_000);
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(balance, 30_000);
        assert_eq!(e.history().unwrap()[0], entry);
    }

    #[test]
    fn identity_switch_starts_fresh_and_return_restores() {
        let mut e = engine();
        e.claim_free_grant(t(0)).unwrap();
        e.perform_mine(t(1_000)).unwrap();
        let before = e.snapshot().unwrap();
        assert_eq!(before.balance, 250);

        login(&e.db, &creds("08087654321"), t(2_000)).unwrap();
        let other = e.snapshot().unwrap();
        assert_eq!(other.balance, 0);
        assert_eq!(other.capacity, 0);
        assert!(!other.free_claimed);
        assert!(e.history().unwrap().is_empty());

        login(&e.db, &creds("08012345678"), t(3_000)).unwrap();
        assert_eq!(e.snapshot().unwrap(), before);
    }

    #[test]
    fn first_operation_of_the_day_rolls_over_before_consuming() {
        let mut e = engine();
        e.quota().grant_capacity(1).unwrap();
        e.perform_mine(t(1_000)).unwrap();
        assert!(matches!(e.perform_mine(t(5_000)).unwrap(), MineOutcome::QuotaExceeded { .. }));
        assert!(matches!(e.perform_mine(next_day(0)).unwrap(), MineOutcome::Mined { .. }));
    }
}
