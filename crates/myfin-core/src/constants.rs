/// ─── MyFin Reward Constants ─────────────────────────────────────────────────
///
/// Defaults for `AppConfig`. Amounts are whole Naira (NGN); the payment
/// collaborator works in kobo (1 NGN = 100 kobo).

// ── Mining ───────────────────────────────────────────────────────────────────

/// Balance credited by one successful mining tap.
pub const MINING_AMOUNT_PER_TAP: i64 = 250;

/// Free taps granted every day. Free capacity now comes from the one-time
/// free plan, so the daily allowance is zero.
pub const DAILY_FREE_TAPS: u32 = 0;

/// Window after a mining tap during which another tap is rejected.
pub const MINE_COOLDOWN_MS: i64 = 200;

/// Balance at which the user is told it is time to withdraw. Announced once.
pub const BALANCE_MILESTONE: i64 = 25_000;

// ── Withdrawal ───────────────────────────────────────────────────────────────

/// Balance required before any withdrawal may be requested.
pub const MINIMUM_WITHDRAWAL_BALANCE: i64 = 50_000;

/// Smallest amount a single withdrawal request may carry.
pub const MINIMUM_WITHDRAWAL_AMOUNT: i64 = 200;

// ── Offers ───────────────────────────────────────────────────────────────────

/// How long the new-user special deal banner stays up after first login.
pub const NEW_USER_OFFER_WINDOW_SECS: i64 = 3 * 24 * 3600;

/// Kobo per Naira, for payment amounts.
pub const KOBO_PER_NAIRA: i64 = 100;

// ── Credentials ──────────────────────────────────────────────────────────────

pub const PHONE_DIGITS: usize = 11;
pub const ACCOUNT_NUMBER_DIGITS: usize = 10;
pub const DEFAULT_PASSWORD_DIGITS: usize = 4;
pub const MIN_CUSTOM_PASSWORD_LEN: usize = 6;
