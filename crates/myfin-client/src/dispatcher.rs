use std::sync::Arc;

use chrono::{DateTime, Utc};
use myfin_core::config::AppConfig;
use myfin_core::error::MyfinError;
use myfin_core::types::{Amount, IdentityKey, PaymentReference, TaskId};
use myfin_state::{
    ClaimOutcome, MineOutcome, PurchaseGate, RewardEngine, SpecialEligibility, StateDb,
    WithdrawalOutcome,
};
use myfin_tasks::{TaskResolution, TaskVerifier, TriggerOutcome};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, NoticeLevel, Notice, PaymentRequest, View};
use crate::events::{Envelope, Event, EventSender};

const QUEUE_CAPACITY: usize = 256;

/// A payment handed to the gateway and not yet applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPurchase {
    pub reference: PaymentReference,
    pub plan: String,
    pub amount_minor: i64,
    /// Identity the purchase is credited to, whoever is active when the
    /// confirmation arrives.
    pub identity: IdentityKey,
    /// Set when the gateway confirmed while another identity was active.
    /// Applied once `identity` is active again.
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Single consumer of the session queue.
///
/// Owns the engine and the task verifier, so every event runs to completion
/// against local state before the next one is looked at. Rollover is
/// evaluated at the top of every event.
pub struct Dispatcher {
    engine: RewardEngine,
    verifier: TaskVerifier,
    collaborators: Collaborators,
    sender: EventSender,
    pending: Option<PendingPurchase>,
}

impl Dispatcher {
    pub fn new(
        engine: RewardEngine,
        verifier: TaskVerifier,
        collaborators: Collaborators,
        sender: EventSender,
    ) -> Self {
        Self { engine, verifier, collaborators, sender, pending: None }
    }

    /// Wire up a dispatcher for the active identity and return it with both
    /// ends of its queue.
    pub fn open(
        db: Arc<StateDb>,
        config: Arc<AppConfig>,
        collaborators: Collaborators,
    ) -> (Self, EventSender, mpsc::Receiver<Envelope>) {
        let (sender, rx) = EventSender::channel(QUEUE_CAPACITY);
        let verifier = TaskVerifier::new(db.clone(), config.tasks.clone());
        let engine = RewardEngine::new(db, config);
        (Self::new(engine, verifier, collaborators, sender.clone()), sender, rx)
    }

    pub fn engine(&self) -> &RewardEngine {
        &self.engine
    }

    pub fn verifier(&self) -> &TaskVerifier {
        &self.verifier
    }

    pub fn pending_purchase(&self) -> Option<&PendingPurchase> {
        self.pending.as_ref()
    }

    /// Session entry point: rollover first, then the one-time welcome.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), MyfinError> {
        self.engine.ensure_session(now)?;
        if self.engine.profile().needs_welcome()? {
            self.notify(
                NoticeLevel::Info,
                "Welcome to MyFin",
                format!(
                    "Every tap mines ₦{}. Complete all tasks to unlock today's special offer.",
                    self.engine.config().tap_reward
                ),
            );
            self.engine.profile().acknowledge_welcome()?;
        }
        Ok(())
    }

    /// Process events until `Shutdown`, then finish whatever is queued.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) -> Self {
        while let Some(envelope) = rx.recv().await {
            if envelope.event == Event::Shutdown {
                self.drain(&mut rx);
                break;
            }
            self.dispatch(envelope);
        }
        if let Some(held) = self.pending.as_ref().filter(|p| p.confirmed_at.is_some()) {
            warn!(reference = %held.reference, owner = %held.identity, "session ended with a confirmed payment not yet applied");
        }
        self
    }

    /// Handle everything currently queued, including events posted by the
    /// handlers themselves. Returns the number handled.
    pub fn drain(&mut self, rx: &mut mpsc::Receiver<Envelope>) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = rx.try_recv() {
            if envelope.event == Event::Shutdown {
                continue;
            }
            self.dispatch(envelope);
            handled += 1;
        }
        handled
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let event = envelope.event.clone();
        if let Err(e) = self.handle(envelope) {
            warn!(?event, error = %e, "event failed");
            self.notify(NoticeLevel::Error, "Something went wrong", e.to_string());
        }
    }

    pub fn handle(&mut self, envelope: Envelope) -> Result<(), MyfinError> {
        let Envelope { at, event } = envelope;
        debug!(?event, %at, "handling event");

        if self.engine.ensure_session(at)? {
            self.notify(NoticeLevel::Info, "New day", "Your daily taps and tasks have been reset.");
        }
        self.apply_held_confirmation(at)?;

        match event {
            Event::Mine => self.on_mine(at),
            Event::TriggerTask(id) => self.on_trigger(&id, at),
            Event::PageHidden => {
                if let Some(task) = self.verifier.on_hidden(at)? {
                    debug!(task = %task, "page hidden with armed task");
                }
                Ok(())
            }
            Event::PageVisible => self.on_visible(at),
            Event::ClaimFreeGrant => {
                let outcome = self.engine.claim_free_grant(at)?;
                self.report_claim("Free Taps", &outcome);
                Ok(())
            }
            Event::BuyPlan(plan) => self.on_buy(&plan, at),
            Event::PaymentSucceeded { reference } => self.on_payment_succeeded(reference, at),
            Event::PaymentClosed { reference } => {
                self.on_payment_closed(reference);
                Ok(())
            }
            Event::RequestWithdrawal(amount) => self.on_withdrawal(amount, at),
            Event::Tick | Event::Shutdown => Ok(()),
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    fn on_mine(&mut self, at: DateTime<Utc>) -> Result<(), MyfinError> {
        match self.engine.perform_mine(at)? {
            MineOutcome::Mined { balance, remaining, limit_reached, milestone_reached, .. } => {
                self.notify(
                    NoticeLevel::Success,
                    format!("+₦{}", self.engine.config().tap_reward),
                    format!("Balance ₦{balance}, {remaining} taps left today."),
                );
                if milestone_reached {
                    self.notify(
                        NoticeLevel::Success,
                        "Milestone reached",
                        format!("Your balance passed ₦{}.", self.engine.config().balance_milestone),
                    );
                }
                if limit_reached {
                    self.notify(NoticeLevel::Warning, "Tap limit reached", "Buy more taps to keep mining.");
                }
            }
            MineOutcome::QuotaExceeded { used, capacity } => {
                self.notify(
                    NoticeLevel::Warning,
                    "Tap limit reached",
                    format!("{used}/{capacity} taps used today. Buy more taps to keep mining."),
                );
                self.navigate(View::Store)?;
            }
            MineOutcome::Busy => debug!("tap ignored during cooldown"),
        }
        Ok(())
    }

    fn on_trigger(&mut self, id: &TaskId, at: DateTime<Utc>) -> Result<(), MyfinError> {
        let name = self.task_name(id);
        match self.verifier.trigger(id, at)? {
            TriggerOutcome::Completed { .. } => {
                self.notify(
                    NoticeLevel::Success,
                    "Task Complete!",
                    format!("You've completed the \"{name}\" task."),
                );
                self.check_all_tasks()?;
            }
            TriggerOutcome::Armed { url, dwell_secs } => {
                self.notify(
                    NoticeLevel::Info,
                    format!("Opening {url}"),
                    format!("Stay there for at least {dwell_secs} seconds."),
                );
            }
            TriggerOutcome::AlreadyCompleted => {
                self.notify(NoticeLevel::Info, "Already completed", name);
            }
        }
        Ok(())
    }

    /// Resolve dwell timers first; only then look at the all-tasks gate.
    fn on_visible(&mut self, at: DateTime<Utc>) -> Result<(), MyfinError> {
        let resolutions = self.verifier.on_visible(at)?;
        let mut any_completed = false;
        for resolution in &resolutions {
            match resolution {
                TaskResolution::Completed { task } => {
                    any_completed = true;
                    self.notify(
                        NoticeLevel::Success,
                        "Task Complete!",
                        format!("You've completed the \"{}\" task.", self.task_name(task)),
                    );
                }
                TaskResolution::Failed { task, .. } => {
                    self.notify(
                        NoticeLevel::Warning,
                        "Task Incomplete",
                        format!(
                            "You didn't spend enough time on the {} task.",
                            self.task_name(task)
                        ),
                    );
                }
            }
        }
        if any_completed {
            self.check_all_tasks()?;
        }
        Ok(())
    }

    fn check_all_tasks(&mut self) -> Result<(), MyfinError> {
        if self.verifier.all_completed()? && !self.engine.offers().is_special_offer_claimed()? {
            self.notify(
                NoticeLevel::Success,
                "All Tasks Completed!",
                "Today's special offer is unlocked in the miner store.",
            );
            self.navigate(View::Store)?;
        }
        Ok(())
    }

    fn on_buy(&mut self, plan: &str, at: DateTime<Utc>) -> Result<(), MyfinError> {
        if let Some(pending) = &self.pending {
            let body = format!("Finish or close the payment for {} first.", pending.plan);
            self.notify(NoticeLevel::Warning, "Payment in progress", body);
            return Ok(());
        }

        match self.engine.begin_purchase(plan, at)? {
            PurchaseGate::AwaitPayment { plan, amount_minor } => {
                let identity =
                    self.engine.active_identity().cloned().ok_or(MyfinError::NoActiveIdentity)?;
                let reference = self.engine.next_payment_reference()?;
                info!(%reference, plan = %plan.name, amount_minor, "payment initiated");
                self.pending = Some(PendingPurchase {
                    reference: reference.clone(),
                    plan: plan.name.clone(),
                    amount_minor,
                    identity,
                    confirmed_at: None,
                });
                let request = PaymentRequest { reference, plan: plan.name, amount_minor, requested_at: at };
                if let Err(e) = self.collaborators.gateway.initiate(request, self.sender.clone()) {
                    let dropped = self.pending.take();
                    warn!(error = %e, ?dropped, "payment could not be started");
                    self.notify(NoticeLevel::Error, "Payment unavailable", "Please try again.");
                }
            }
            PurchaseGate::Settled(outcome) => self.report_claim(plan, &outcome),
            PurchaseGate::NotEligible(SpecialEligibility::AlreadyClaimed) => {
                self.report_claim(plan, &ClaimOutcome::AlreadyClaimed);
            }
            PurchaseGate::NotEligible(SpecialEligibility::TasksIncomplete { remaining }) => {
                self.report_claim(plan, &ClaimOutcome::TasksIncomplete { remaining });
                self.navigate(View::Tasks)?;
            }
            PurchaseGate::NotEligible(SpecialEligibility::Eligible) => {}
        }
        Ok(())
    }

    fn on_payment_succeeded(
        &mut self,
        reference: PaymentReference,
        at: DateTime<Utc>,
    ) -> Result<(), MyfinError> {
        let pending = match self.pending.take() {
            Some(p) if p.reference == reference && p.confirmed_at.is_none() => p,
            other => {
                self.pending = other;
                warn!(%reference, "ignoring payment confirmation with unknown reference");
                return Ok(());
            }
        };

        if self.engine.active_identity() != Some(&pending.identity) {
            warn!(%reference, owner = %pending.identity, "payment confirmed for an inactive identity, holding it");
            self.pending = Some(PendingPurchase { confirmed_at: Some(at), ..pending });
            return Ok(());
        }
        self.apply_purchase(pending, at)
    }

    /// Apply a confirmation held for an identity that has become active again.
    fn apply_held_confirmation(&mut self, at: DateTime<Utc>) -> Result<(), MyfinError> {
        let owner_active = matches!(
            &self.pending,
            Some(p) if p.confirmed_at.is_some() && self.engine.active_identity() == Some(&p.identity)
        );
        match self.pending.take() {
            Some(pending) if owner_active => {
                info!(reference = %pending.reference, owner = %pending.identity, "applying held payment");
                self.apply_purchase(pending, at)
            }
            other => {
                self.pending = other;
                Ok(())
            }
        }
    }

    fn apply_purchase(&mut self, pending: PendingPurchase, at: DateTime<Utc>) -> Result<(), MyfinError> {
        let reference = &pending.reference;
        let outcome = self.engine.complete_purchase(&pending.plan, at)?;
        if matches!(outcome, ClaimOutcome::Granted { .. }) {
            self.report_claim(&pending.plan, &outcome);
            self.navigate(View::Dashboard)?;
        } else {
            warn!(%reference, plan = %pending.plan, ?outcome, "payment confirmed but plan is no longer claimable");
            self.report_claim(&pending.plan, &outcome);
        }
        Ok(())
    }

    fn on_payment_closed(&mut self, reference: PaymentReference) {
        match self.pending.take() {
            Some(p) if p.reference == reference && p.confirmed_at.is_none() => {
                info!(%reference, plan = %p.plan, "payment closed");
                self.notify(NoticeLevel::Info, "Payment cancelled", "No changes were made.");
            }
            other => {
                self.pending = other;
                warn!(%reference, "ignoring close for unknown payment reference");
            }
        }
    }

    fn on_withdrawal(&mut self, amount: Amount, at: DateTime<Utc>) -> Result<(), MyfinError> {
        match self.engine.request_withdrawal(amount, at)? {
            WithdrawalOutcome::Recorded { entry, balance } => {
                self.notify(
                    NoticeLevel::Success,
                    "Withdrawal requested",
                    format!("₦{amount} is pending (entry {}). Balance ₦{balance}.", entry.id),
                );
                self.navigate(View::History)?;
            }
            WithdrawalOutcome::BelowThreshold { balance, threshold } => {
                self.notify(
                    NoticeLevel::Warning,
                    "Withdrawal unavailable",
                    format!("You need at least ₦{threshold}; your balance is ₦{balance}."),
                );
            }
            WithdrawalOutcome::AmountTooSmall { minimum } => {
                self.notify(
                    NoticeLevel::Warning,
                    "Amount too small",
                    format!("The minimum withdrawal is ₦{minimum}."),
                );
            }
        }
        Ok(())
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn report_claim(&self, plan: &str, outcome: &ClaimOutcome) {
        match outcome {
            ClaimOutcome::Granted { taps, capacity, .. } => self.notify(
                NoticeLevel::Success,
                "Purchase successful",
                format!("{plan}: +{taps} taps ({capacity} total)."),
            ),
            ClaimOutcome::AlreadyClaimed => {
                self.notify(NoticeLevel::Info, "Already claimed", format!("{plan} has already been claimed."))
            }
            ClaimOutcome::TasksIncomplete { remaining } => self.notify(
                NoticeLevel::Warning,
                "Tasks incomplete",
                format!("Complete all tasks to unlock {plan} ({} left).", remaining.len()),
            ),
        }
    }

    fn task_name(&self, id: &TaskId) -> String {
        self.engine
            .config()
            .task(id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|_| id.to_string())
    }

    fn notify(&self, level: NoticeLevel, title: impl Into<String>, body: impl Into<String>) {
        self.collaborators.notifier.notify(Notice::new(level, title, body));
    }

    fn navigate(&self, view: View) -> Result<(), MyfinError> {
        let snapshot = self.engine.snapshot()?;
        self.collaborators.navigator.navigate(view, &snapshot);
        Ok(())
    }
}
