use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{default_plans, default_tasks, MinerPlan, PlanKind, TaskSpec};
use crate::constants::{
    BALANCE_MILESTONE, DAILY_FREE_TAPS, MINE_COOLDOWN_MS, MINIMUM_WITHDRAWAL_AMOUNT,
    MINIMUM_WITHDRAWAL_BALANCE, MINING_AMOUNT_PER_TAP, NEW_USER_OFFER_WINDOW_SECS,
};
use crate::error::MyfinError;
use crate::types::{Amount, TaskId, Taps};

/// Reward economics plus the plan and task catalogs.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Balance credited per mining tap.
    pub tap_reward: Amount,
    /// Free taps available every day on top of purchased capacity.
    pub daily_free_taps: Taps,
    /// Balance required before a withdrawal may be requested.
    pub withdrawal_threshold: Amount,
    /// Smallest amount one withdrawal may carry.
    pub min_withdrawal_amount: Amount,
    /// Balance milestone announced once per identity.
    pub balance_milestone: Amount,
    /// Re-entrancy window after a mining tap.
    pub mine_cooldown_ms: i64,
    /// Lifetime of the new-user special deal banner.
    pub new_user_offer_window_secs: i64,
    pub plans: Vec<MinerPlan>,
    pub tasks: Vec<TaskSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tap_reward: MINING_AMOUNT_PER_TAP,
            daily_free_taps: DAILY_FREE_TAPS,
            withdrawal_threshold: MINIMUM_WITHDRAWAL_BALANCE,
            min_withdrawal_amount: MINIMUM_WITHDRAWAL_AMOUNT,
            balance_milestone: BALANCE_MILESTONE,
            mine_cooldown_ms: MINE_COOLDOWN_MS,
            new_user_offer_window_secs: NEW_USER_OFFER_WINDOW_SECS,
            plans: default_plans(),
            tasks: default_tasks(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(s: &str) -> Result<Self, MyfinError> {
        let config: AppConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, MyfinError> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| MyfinError::Config(format!("reading {}: {e}", p.display())))?;
                Self::from_json_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), MyfinError> {
        if self.tap_reward <= 0 {
            return Err(MyfinError::Config("tap_reward must be positive".into()));
        }
        if self.mine_cooldown_ms < 0 {
            return Err(MyfinError::Config("mine_cooldown_ms must not be negative".into()));
        }

        let mut names = HashSet::new();
        for plan in &self.plans {
            if !names.insert(plan.name.as_str()) {
                return Err(MyfinError::Config(format!("duplicate plan '{}'", plan.name)));
            }
            if plan.taps == 0 {
                return Err(MyfinError::Config(format!("plan '{}' grants no taps", plan.name)));
            }
            if plan.price < 0 {
                return Err(MyfinError::Config(format!("plan '{}' has a negative price", plan.name)));
            }
        }
        for kind in [PlanKind::Special, PlanKind::Free] {
            if self.plans.iter().filter(|p| p.kind == kind).count() > 1 {
                return Err(MyfinError::Config(format!("more than one {kind:?} plan")));
            }
        }

        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(&task.id) {
                return Err(MyfinError::Config(format!("duplicate task '{}'", task.id)));
            }
        }
        Ok(())
    }

    pub fn plan(&self, name: &str) -> Result<&MinerPlan, MyfinError> {
        self.plans
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MyfinError::UnknownPlan(name.to_string()))
    }

    pub fn plan_of_kind(&self, kind: PlanKind) -> Option<&MinerPlan> {
        self.plans.iter().find(|p| p.kind == kind)
    }

    pub fn task(&self, id: &TaskId) -> Result<&TaskSpec, MyfinError> {
        self.tasks
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| MyfinError::UnknownTask(id.to_string()))
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|t| &t.id)
    }
}
