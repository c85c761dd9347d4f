//! Login, identity switching and per-identity profile flags.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use myfin_core::error::MyfinError;
use myfin_core::identity::{check_password, new_password_digest, Credentials, PasswordCheck};
use myfin_core::types::IdentityKey;
use tracing::info;

use crate::db::{keys, StagedWrites, StateDb};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
    pub identity: IdentityKey,
    pub password: PasswordCheck,
    /// First time this identity has logged in on this device.
    pub first_login: bool,
}

/// Validate credentials and make their identity the active one. A new
/// identity starts from empty state; a returning one finds its state as it
/// left it.
pub fn login(
    db: &StateDb,
    creds: &Credentials,
    now: DateTime<Utc>,
) -> Result<LoginOutcome, MyfinError> {
    creds.validate()?;
    let stored = db.password_digest(&creds.phone)?;
    let password = check_password(&creds.phone, &creds.password, stored.as_deref())?;

    let identity = creds.identity();
    db.switch_identity(&identity)?;

    let user = db.user()?;
    let first_login = user.get::<DateTime<Utc>>(keys::PROFILE_FIRST_SEEN_AT)?.is_none();
    if first_login {
        let mut staged = StagedWrites::new();
        staged.put(keys::PROFILE_FIRST_SEEN_AT, &now)?;
        staged.put(keys::PROFILE_WELCOME_ACKNOWLEDGED, &false)?;
        user.commit(staged)?;
        info!(identity = %identity, "new identity registered");
    }
    Ok(LoginOutcome { identity, password, first_login })
}

/// Replace the default password for `phone` with a custom one.
pub fn set_custom_password(
    db: &StateDb,
    phone: &str,
    verify_last_four: &str,
    new_password: &str,
    confirm: &str,
) -> Result<(), MyfinError> {
    let digest = new_password_digest(phone, verify_last_four, new_password, confirm)?;
    db.set_password_digest(phone, &digest)?;
    info!("custom password set");
    Ok(())
}

/// Presentation-facing flags of the active identity.
#[derive(Clone)]
pub struct Profile {
    db: Arc<StateDb>,
}

impl Profile {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    pub fn first_seen_at(&self) -> Result<Option<DateTime<Utc>>, MyfinError> {
        self.db.user()?.get(keys::PROFILE_FIRST_SEEN_AT)
    }

    pub fn needs_welcome(&self) -> Result<bool, MyfinError> {
        let acknowledged: bool = self.db.user()?.get_or_default(keys::PROFILE_WELCOME_ACKNOWLEDGED)?;
        Ok(!acknowledged)
    }

    pub fn acknowledge_welcome(&self) -> Result<(), MyfinError> {
        let mut staged = StagedWrites::new();
        staged.put(keys::PROFILE_WELCOME_ACKNOWLEDGED, &true)?;
        self.db.user()?.commit(staged)
    }

    pub fn milestone_notified(&self) -> Result<bool, MyfinError> {
        self.db.user()?.get_or_default(keys::PROFILE_MILESTONE_NOTIFIED)
    }

    pub fn stage_milestone_notified(&self, staged: &mut StagedWrites) -> Result<(), MyfinError> {
        staged.put(keys::PROFILE_MILESTONE_NOTIFIED, &true)
    }

    /// Time left on the new-user deal banner, or `None` once it has expired.
    pub fn new_user_offer_remaining(
        &self,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Duration>, MyfinError> {
        let Some(start) = self.first_seen_at()? else {
            return Ok(None);
        };
        let left = start + Duration::seconds(window_secs) - now;
        Ok((left > Duration::zero()).then_some(left))
    }
}
