pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod types;

pub use catalog::{MinerPlan, PlanKind, TaskSpec};
pub use config::AppConfig;
pub use constants::*;
pub use error::MyfinError;
pub use ledger::{EntryKind, EntryStatus, LedgerEntry};
pub use types::*;
