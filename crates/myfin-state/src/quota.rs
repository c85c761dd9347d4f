use std::sync::Arc;

use chrono::NaiveDate;
use myfin_core::error::MyfinError;
use myfin_core::types::Taps;
use tracing::info;

use crate::db::{keys, StagedWrites, StateDb};

/// Daily mining allowance.
///
/// Capacity is the purchased capacity (cumulative, never reset) plus the
/// configured daily free taps. Only `used_today` is reset on a new day.
#[derive(Clone)]
pub struct QuotaTracker {
    db: Arc<StateDb>,
    daily_free_taps: Taps,
}

impl QuotaTracker {
    pub fn new(db: Arc<StateDb>, daily_free_taps: Taps) -> Self {
        Self { db, daily_free_taps }
    }

    /// Capacity bought so far, excluding the daily free taps.
    pub fn purchased_capacity(&self) -> Result<Taps, MyfinError> {
        self.db.user()?.get_or_default(keys::QUOTA_CAPACITY)
    }

    pub fn current_capacity(&self) -> Result<Taps, MyfinError> {
        Ok(self.purchased_capacity()?.saturating_add(self.daily_free_taps))
    }

    pub fn used_today(&self) -> Result<Taps, MyfinError> {
        self.db.user()?.get_or_default(keys::QUOTA_USED_TODAY)
    }

    pub fn anchor_date(&self) -> Result<Option<NaiveDate>, MyfinError> {
        self.db.user()?.get(keys::QUOTA_ANCHOR_DATE)
    }

    pub fn remaining(&self) -> Result<Taps, MyfinError> {
        Ok(self.current_capacity()?.saturating_sub(self.used_today()?))
    }

    /// Consume `n` taps if they fit in today's capacity. Nothing changes on
    /// refusal.
    pub fn try_consume(&self, n: Taps) -> Result<bool, MyfinError> {
        let mut staged = StagedWrites::new();
        let ok = self.stage_consume(&mut staged, n)?;
        self.db.user()?.commit(staged)?;
        Ok(ok)
    }

    pub fn stage_consume(&self, staged: &mut StagedWrites, n: Taps) -> Result<bool, MyfinError> {
        let used = self.used_today()?;
        let capacity = self.current_capacity()?;
        match used.checked_add(n) {
            Some(next) if next <= capacity => {
                staged.put(keys::QUOTA_USED_TODAY, &next)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Permanently add `n` taps of capacity.
    pub fn grant_capacity(&self, n: Taps) -> Result<Taps, MyfinError> {
        let mut staged = StagedWrites::new();
        let capacity = self.stage_grant(&mut staged, n)?;
        self.db.user()?.commit(staged)?;
        Ok(capacity)
    }

    /// Stage a capacity grant; returns the capacity after the grant.
    pub fn stage_grant(&self, staged: &mut StagedWrites, n: Taps) -> Result<Taps, MyfinError> {
        let purchased = self.purchased_capacity()?.saturating_add(n);
        staged.put(keys::QUOTA_CAPACITY, &purchased)?;
        Ok(purchased.saturating_add(self.daily_free_taps))
    }

    /// Reset today's usage if `today` differs from the stored anchor date.
    /// Returns `true` when a rollover happened; the caller must then clear
    /// the date-scoped task and offer flags.
    pub fn rollover_if_new_day(&self, today: NaiveDate) -> Result<bool, MyfinError> {
        let mut staged = StagedWrites::new();
        let rolled = self.stage_rollover(&mut staged, today)?;
        self.db.user()?.commit(staged)?;
        Ok(rolled)
    }

    pub fn stage_rollover(&self, staged: &mut StagedWrites, today: NaiveDate) -> Result<bool, MyfinError> {
        let anchor = self.anchor_date()?;
        if anchor == Some(today) {
            return Ok(false);
        }
        staged.put(keys::QUOTA_USED_TODAY, &0u32)?;
        staged.put(keys::QUOTA_ANCHOR_DATE, &today)?;
        info!(?anchor, %today, "quota rolled over");
        Ok(true)
    }
}
