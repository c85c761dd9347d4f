use std::path::Path;

use myfin_core::error::MyfinError;
use myfin_core::types::IdentityKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// Keys inside an identity's tree.
pub mod keys {
    pub const LEDGER: &str = "ledger";
    pub const QUOTA_USED_TODAY: &str = "quota.usedToday";
    pub const QUOTA_CAPACITY: &str = "quota.capacity";
    pub const QUOTA_ANCHOR_DATE: &str = "quota.anchorDate";
    pub const TASKS_COMPLETED: &str = "tasks.completed";
    pub const TASKS_ARMED: &str = "tasks.armed";
    pub const TASKS_STARTED: &str = "tasks.started";
    pub const OFFERS_SPECIAL_CLAIMED: &str = "offers.specialClaimed";
    pub const OFFERS_FREE_CLAIMED: &str = "offers.freeClaimed";
    pub const PROFILE_FIRST_SEEN_AT: &str = "profile.firstSeenAt";
    pub const PROFILE_WELCOME_ACKNOWLEDGED: &str = "profile.welcomeAcknowledged";
    pub const PROFILE_MILESTONE_NOTIFIED: &str = "profile.milestoneNotified";
}

const META_IDENTITY_CURRENT: &str = "identity.current";
const META_PASSWORD_PREFIX: &str = "password.";

/// Device-local state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   meta        : device-wide keys (`identity.current`, password digests)
///   user/<hash> : one tree per identity, keyed as in `keys`
///
/// Scalars and maps are bincode; the ledger is JSON so it can be
/// schema-checked and exported as-is.
pub struct StateDb {
    db: sled::Db,
    meta: sled::Tree,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MyfinError> {
        let db = sled::open(path).map_err(storage)?;
        Self::from_db(db)
    }

    /// In-memory database that disappears on drop.
    pub fn temporary() -> Result<Self, MyfinError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, MyfinError> {
        let meta = db.open_tree("meta").map_err(storage)?;
        Ok(Self { db, meta })
    }

    // ── Identity ─────────────────────────────────────────────────────────────

    pub fn current_identity(&self) -> Result<Option<IdentityKey>, MyfinError> {
        match self.get_meta(META_IDENTITY_CURRENT)? {
            Some(bytes) => {
                let s = String::from_utf8(bytes)
                    .map_err(|e| MyfinError::Serialization(e.to_string()))?;
                Ok(Some(IdentityKey(s)))
            }
            None => Ok(None),
        }
    }

    /// Make `identity` the active one. Returns `true` if this identity has
    /// never stored anything on this device.
    pub fn switch_identity(&self, identity: &IdentityKey) -> Result<bool, MyfinError> {
        let tree = self.db.open_tree(identity.namespace()).map_err(storage)?;
        let fresh = tree.is_empty();
        let previous = self.current_identity()?;
        self.put_meta(META_IDENTITY_CURRENT, identity.as_str().as_bytes())?;
        if previous.as_ref() != Some(identity) {
            info!(identity = %identity, fresh, "switched identity");
        }
        Ok(fresh)
    }

    /// State of the active identity.
    pub fn user(&self) -> Result<UserTree, MyfinError> {
        let identity = self.current_identity()?.ok_or(MyfinError::NoActiveIdentity)?;
        let tree = self.db.open_tree(identity.namespace()).map_err(storage)?;
        Ok(UserTree { tree })
    }

    // ── Ids ──────────────────────────────────────────────────────────────────

    /// Next value of sled's persisted monotonic counter. Strictly increasing
    /// across restarts.
    pub fn generate_id(&self) -> Result<u64, MyfinError> {
        self.db.generate_id().map_err(storage)
    }

    // ── Passwords ────────────────────────────────────────────────────────────

    pub fn password_digest(&self, phone: &str) -> Result<Option<String>, MyfinError> {
        match self.get_meta(&format!("{META_PASSWORD_PREFIX}{phone}"))? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|e| MyfinError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn set_password_digest(&self, phone: &str, digest: &str) -> Result<(), MyfinError> {
        self.put_meta(&format!("{META_PASSWORD_PREFIX}{phone}"), digest.as_bytes())
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), MyfinError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, MyfinError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), MyfinError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

// ── UserTree ──────────────────────────────────────────────────────────────────

/// One identity's keyed state.
#[derive(Clone)]
pub struct UserTree {
    tree: sled::Tree,
}

impl UserTree {
    pub fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, MyfinError> {
        self.tree
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    /// Overwrite a key with raw bytes, bypassing encoding.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> Result<(), MyfinError> {
        self.tree.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    /// Drop the key named by a validation failure. Any other error is handed
    /// back unchanged.
    pub fn discard(&self, invalid: MyfinError) -> Result<(), MyfinError> {
        let MyfinError::Validation { key, reason } = &invalid else {
            return Err(invalid);
        };
        warn!(%key, %reason, "discarding invalid persisted record");
        self.tree.remove(key.as_bytes()).map_err(storage)?;
        Ok(())
    }

    /// Decode a bincode value. A value that fails to decode is discarded and
    /// reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MyfinError> {
        let Some(bytes) = self.get_raw(key)? else {
            return Ok(None);
        };
        match decode(key, &bytes) {
            Ok(v) => Ok(Some(v)),
            Err(invalid) => {
                self.discard(invalid)?;
                Ok(None)
            }
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, MyfinError> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Apply every staged write in one atomic batch.
    pub fn commit(&self, staged: StagedWrites) -> Result<(), MyfinError> {
        if staged.is_empty() {
            return Ok(());
        }
        self.tree.apply_batch(staged.batch).map_err(storage)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

// ── StagedWrites ──────────────────────────────────────────────────────────────

/// Writes collected across components before one atomic commit.
#[derive(Default)]
pub struct StagedWrites {
    batch: sled::Batch,
    count: usize,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), MyfinError> {
        let bytes = bincode::serialize(value)
            .map_err(|e| MyfinError::Serialization(e.to_string()))?;
        self.batch.insert(key.as_bytes(), bytes);
        self.count += 1;
        Ok(())
    }

    pub fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), MyfinError> {
        let bytes = serde_json::to_vec(value)?;
        self.batch.insert(key.as_bytes(), bytes);
        self.count += 1;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.batch.remove(key.as_bytes());
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }
}

fn storage(e: sled::Error) -> MyfinError {
    MyfinError::Storage(e.to_string())
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, MyfinError> {
    bincode::deserialize(bytes).map_err(|e| MyfinError::validation(key, e))
}
