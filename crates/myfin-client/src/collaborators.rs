//! Capabilities the dispatcher consumes but does not implement: taking
//! payment, showing messages and moving between views.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use myfin_core::error::MyfinError;
use myfin_core::types::PaymentReference;
use myfin_state::Snapshot;
use tracing::info;

use crate::events::{Event, EventSender};

// ── Payment ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    pub reference: PaymentReference,
    pub plan: String,
    /// Kobo.
    pub amount_minor: i64,
    pub requested_at: DateTime<Utc>,
}

/// Takes a payment and answers later by posting `PaymentSucceeded` or
/// `PaymentClosed` with the request's reference through `reply`. An error
/// means the payment was not taken and no answer will follow.
pub trait PaymentGateway: Send {
    fn initiate(&self, request: PaymentRequest, reply: EventSender) -> Result<(), MyfinError>;
}

/// Answers every request immediately, approving or declining all of them.
pub struct SimulatedGateway {
    pub approve: bool,
}

impl PaymentGateway for SimulatedGateway {
    fn initiate(&self, request: PaymentRequest, reply: EventSender) -> Result<(), MyfinError> {
        info!(
            reference = %request.reference,
            plan = %request.plan,
            amount_minor = request.amount_minor,
            approve = self.approve,
            "simulated payment"
        );
        let reference = request.reference;
        let event = if self.approve {
            Event::PaymentSucceeded { reference }
        } else {
            Event::PaymentClosed { reference }
        };
        reply.post_at(event, request.requested_at)
    }
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { level, title: title.into(), body: body.into() }
    }
}

/// Fire-and-forget user messages.
pub trait Notifier: Send {
    fn notify(&self, notice: Notice);
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        if notice.body.is_empty() {
            println!("[{}] {}", notice.level, notice.title);
        } else {
            println!("[{}] {}: {}", notice.level, notice.title, notice.body);
        }
    }
}

/// Keeps every notice; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MemoryNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut n) = self.notices.lock() {
            n.push(notice);
        }
    }
}

// ── Navigation ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Store,
    Tasks,
    History,
}

/// Moves between views, forwarding balance and quota as parameters.
pub trait Navigator: Send {
    fn navigate(&self, view: View, params: &Snapshot);
}

pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, view: View, params: &Snapshot) {
        println!(
            "-> {view:?} (balance ₦{}, taps {}/{})",
            params.balance, params.used_today, params.capacity
        );
    }
}

#[derive(Clone, Default)]
pub struct MemoryNavigator {
    visits: Arc<Mutex<Vec<(View, Snapshot)>>>,
}

impl MemoryNavigator {
    pub fn visits(&self) -> Vec<(View, Snapshot)> {
        self.visits.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Navigator for MemoryNavigator {
    fn navigate(&self, view: View, params: &Snapshot) {
        if let Ok(mut v) = self.visits.lock() {
            v.push((view, params.clone()));
        }
    }
}

/// The three capabilities a dispatcher needs.
pub struct Collaborators {
    pub gateway: Box<dyn PaymentGateway>,
    pub notifier: Box<dyn Notifier>,
    pub navigator: Box<dyn Navigator>,
}

impl Collaborators {
    /// Terminal output with a simulated payment provider.
    pub fn console(approve_payments: bool) -> Self {
        Self {
            gateway: Box::new(SimulatedGateway { approve: approve_payments }),
            notifier: Box::new(ConsoleNotifier),
            navigator: Box::new(ConsoleNavigator),
        }
    }
}
