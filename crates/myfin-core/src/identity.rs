//! Login credentials and password rules.
//!
//! A new user's password is the last four digits of their phone number
//! until they choose a custom one. Custom passwords are only ever stored as
//! BLAKE3 digests.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ACCOUNT_NUMBER_DIGITS, DEFAULT_PASSWORD_DIGITS, MIN_CUSTOM_PASSWORD_LEN, PHONE_DIGITS,
};
use crate::error::MyfinError;
use crate::types::IdentityKey;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub phone: String,
    pub account_name: String,
    pub account_number: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), MyfinError> {
        if !is_digits(&self.phone, PHONE_DIGITS) {
            return Err(MyfinError::InvalidPhone { digits: PHONE_DIGITS });
        }
        if self.account_name.trim().is_empty() {
            return Err(MyfinError::MissingAccountName);
        }
        if !is_digits(&self.account_number, ACCOUNT_NUMBER_DIGITS) {
            return Err(MyfinError::InvalidAccountNumber { digits: ACCOUNT_NUMBER_DIGITS });
        }
        Ok(())
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey::from_login(&self.phone, &self.account_number)
    }
}

/// Which password rule accepted a login.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordCheck {
    /// Matched the stored custom password.
    Custom,
    /// Matched the default (last four phone digits); the presentation layer
    /// should offer to set a custom password.
    Default,
}

/// Default password for `phone`.
pub fn default_password(phone: &str) -> &str {
    match phone.char_indices().rev().nth(DEFAULT_PASSWORD_DIGITS - 1) {
        Some((start, _)) => &phone[start..],
        None => phone,
    }
}

pub fn password_digest(password: &str) -> String {
    hex::encode(blake3::hash(password.as_bytes()).as_bytes())
}

/// Check `password` against the stored custom digest, if any, else against
/// the default password.
pub fn check_password(
    phone: &str,
    password: &str,
    stored_digest: Option<&str>,
) -> Result<PasswordCheck, MyfinError> {
    match stored_digest {
        Some(digest) if password_digest(password) == digest => Ok(PasswordCheck::Custom),
        Some(_) => Err(MyfinError::IncorrectPassword),
        None if password == default_password(phone) => Ok(PasswordCheck::Default),
        None => Err(MyfinError::IncorrectPassword),
    }
}

/// Validate a custom-password request and return the digest to store.
pub fn new_password_digest(
    phone: &str,
    verify_last_four: &str,
    new_password: &str,
    confirm: &str,
) -> Result<String, MyfinError> {
    if !is_digits(phone, PHONE_DIGITS) {
        return Err(MyfinError::InvalidPhone { digits: PHONE_DIGITS });
    }
    if verify_last_four != default_password(phone) {
        return Err(MyfinError::PhoneVerificationFailed);
    }
    if new_password.chars().count() < MIN_CUSTOM_PASSWORD_LEN {
        return Err(MyfinError::PasswordTooShort { min: MIN_CUSTOM_PASSWORD_LEN });
    }
    if new_password != confirm {
        return Err(MyfinError::PasswordMismatch);
    }
    Ok(password_digest(new_password))
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}
