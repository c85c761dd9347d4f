//! myfin-state
//!
//! Persistent per-identity state: ledger, daily quota, task completion
//! flags, claim flags and the reward engine that ties them together.
//! Time-triggered task tracking lives in myfin-tasks.

pub mod completions;
pub mod db;
pub mod engine;
pub mod ledger;
pub mod offers;
pub mod quota;
pub mod session;

pub use completions::CompletionFlags;
pub use db::{keys, StagedWrites, StateDb, UserTree};
pub use engine::{MineOutcome, PurchaseGate, RewardEngine, Snapshot, WithdrawalOutcome};
pub use ledger::LedgerStore;
pub use offers::{ClaimOutcome, OfferRegistry, SpecialEligibility};
pub use quota::QuotaTracker;
pub use session::{login, set_custom_password, LoginOutcome, Profile};
