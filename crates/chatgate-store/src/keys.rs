//! Key encoding utilities for `RocksDB`.
//!
//! User ids are encoded as 8 big-endian bytes, days as the 4 big-endian bytes of
//! their day number since the common era, payment ids as the 16 ULID bytes.

use chatgate_core::{PaymentId, UserId};
use chrono::{Datelike, NaiveDate};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: UserId) -> Vec<u8> {
    user_id.to_bytes().to_vec()
}

/// Create a daily counter key.
///
/// Format: `user_id (8 bytes) || day (4 bytes)`
#[must_use]
pub fn counter_key(user_id: UserId, day: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&user_id.to_bytes());
    key.extend_from_slice(&day.num_days_from_ce().to_be_bytes());
    key
}

/// Create a payment key from a local payment ID.
#[must_use]
pub fn payment_key(payment_id: PaymentId) -> Vec<u8> {
    payment_id.to_bytes().to_vec()
}

/// Create an external-id index key.
#[must_use]
pub fn external_key(external_id: &str) -> Vec<u8> {
    external_id.as_bytes().to_vec()
}

/// Create a user-payment index key.
///
/// Format: `user_id (8 bytes) || payment_id (16 bytes)`
///
/// Since ULIDs are time-ordered, payments for a user will be sorted by time.
#[must_use]
pub fn user_payment_key(user_id: UserId, payment_id: PaymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&user_id.to_bytes());
    key.extend_from_slice(&payment_id.to_bytes());
    key
}

/// Create a prefix for iterating all payments for a user.
#[must_use]
pub fn user_payments_prefix(user_id: UserId) -> Vec<u8> {
    user_id.to_bytes().to_vec()
}

/// Extract the payment ID from a user-payment index key.
///
/// Returns `None` if the key is not 24 bytes long.
#[must_use]
pub fn payment_id_from_user_key(key: &[u8]) -> Option<PaymentId> {
    let bytes: [u8; 16] = key.get(8..24)?.try_into().ok()?;
    Some(PaymentId::from_bytes(bytes))
}

/// Decode a local payment ID stored as an index value.
#[must_use]
pub fn payment_id_from_value(value: &[u8]) -> Option<PaymentId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(PaymentId::from_bytes(bytes))
}
