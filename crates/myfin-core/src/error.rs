use thiserror::Error;

#[derive(Debug, Error)]
pub enum MyfinError {
    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted state failed schema validation. Stores recover from this by
    /// discarding the offending key; it only escapes for explicit decodes.
    #[error("invalid persisted record under '{key}': {reason}")]
    Validation { key: String, reason: String },

    // ── Session ──────────────────────────────────────────────────────────────
    #[error("no identity is logged in")]
    NoActiveIdentity,

    // ── Catalog ──────────────────────────────────────────────────────────────
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    // ── Credentials ──────────────────────────────────────────────────────────
    #[error("phone number must be exactly {digits} digits")]
    InvalidPhone { digits: usize },

    #[error("account number must be exactly {digits} digits")]
    InvalidAccountNumber { digits: usize },

    #[error("account name is required")]
    MissingAccountName,

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("the 4 digits do not match the phone number provided")]
    PhoneVerificationFailed,

    #[error("password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error("passwords don't match")]
    PasswordMismatch,

    // ── Dispatch ─────────────────────────────────────────────────────────────
    #[error("event queue is closed")]
    QueueClosed,

    /// The queue is at capacity; a non-blocking post was refused.
    #[error("event queue is full")]
    QueueFull,

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MyfinError {
    pub fn validation(key: &str, reason: impl ToString) -> Self {
        MyfinError::Validation { key: key.to_string(), reason: reason.to_string() }
    }
}

impl From<serde_json::Error> for MyfinError {
    fn from(e: serde_json::Error) -> Self {
        MyfinError::Serialization(e.to_string())
    }
}
