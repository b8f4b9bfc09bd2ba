//! Storage layer for chatgate.
//!
//! This crate persists accounts, daily message counters and payments. Every mutation is an
//! atomic read-modify-write owned by the store; callers never read a record, change a field
//! and write it back themselves.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process maps behind a lock, used by tests and when no data
//!   directory is available.
//! - [`RocksStore`]: `RocksDB` with column families (feature `rocksdb-backend`):
//!   - `accounts`: account records, keyed by `user_id`
//!   - `daily_counters`: message counts, keyed by `user_id || day`
//!   - `payments`: payment records, keyed by `local_id` (ULID)
//!   - `payments_by_external`: processor id to local id
//!   - `payments_by_user`: index for listing payments by user
//!
//! # Example
//!
//! ```
//! use chatgate_core::{Cap, UserId};
//! use chatgate_store::{AccountStore, CounterStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let now = chrono::Utc::now();
//! let user = UserId::new(42);
//!
//! let status = store.get_status(user, now).unwrap();
//! assert!(!status.is_premium());
//!
//! let (allowed, used) = store
//!     .increment_if_below(user, now.date_naive(), Cap::Limited(5))
//!     .unwrap();
//! assert!(allowed);
//! assert_eq!(used, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chatgate_core::{
    Account, AccountStatus, Cap, Payment, PaymentId, PaymentStatus, TierCounts, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Persisted subscription state per user.
pub trait AccountStore: Send + Sync {
    /// Get an account without creating or normalizing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: UserId) -> Result<Option<Account>>;

    /// Resolve the user's current status.
    ///
    /// Creates a free account if none exists. A lapsed entitlement is downgraded to free and
    /// written back in the same atomic step before the status is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_status(&self, user_id: UserId, now: DateTime<Utc>) -> Result<AccountStatus>;

    /// Set the account to premium for `days` from `now`, creating it if absent.
    ///
    /// Repeated grants reset the expiry; they do not stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn grant(&self, user_id: UserId, days: u32, now: DateTime<Utc>) -> Result<Account>;

    /// Force the account back to free, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn revoke(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account>;

    /// Up to `limit` stored accounts, ordered by user id. Records are returned as stored,
    /// without lazy expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_accounts(&self, limit: usize) -> Result<Vec<Account>>;

    /// Count accounts by their effective tier at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_by_tier(&self, now: DateTime<Utc>) -> Result<TierCounts>;
}

/// Per-user, per-day message counters.
pub trait CounterStore: Send + Sync {
    /// Messages consumed by `user_id` on `day`; 0 when no counter exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_count(&self, user_id: UserId, day: NaiveDate) -> Result<u32>;

    /// Increment the counter if it is below `cap`, as one atomic step.
    ///
    /// Returns whether the increment happened and the count after the operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn increment_if_below(&self, user_id: UserId, day: NaiveDate, cap: Cap)
        -> Result<(bool, u32)>;

    /// Delete the counter for `day`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn reset_counter(&self, user_id: UserId, day: NaiveDate) -> Result<bool>;
}

/// Persisted payment attempts.
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the local or external id is already taken.
    fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// Get a payment by its local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_by_local_id(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Get a payment by its processor id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Payment>>;

    /// Get a payment by either identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_by_any_id(&self, id: &str) -> Result<Option<Payment>> {
        if let Ok(local_id) = id.parse::<PaymentId>() {
            if let Some(payment) = self.find_by_local_id(local_id)? {
                return Ok(Some(payment));
            }
        }
        self.find_by_external_id(id.trim())
    }

    /// Apply a forward-only status transition as a compare-and-set.
    ///
    /// Returns `false` without writing if the transition is not forward (including when the
    /// payment is already terminal) or the payment does not exist. Of several concurrent
    /// callers moving the same payment to the same status, exactly one observes `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_status(&self, id: PaymentId, next: PaymentStatus, now: DateTime<Utc>)
        -> Result<bool>;

    /// Move a payment to `succeeded` and make its owner premium for `days` from `now`, as one
    /// atomic step.
    ///
    /// Returns the owner's account after the grant, or `None` without writing anything if
    /// the payment does not exist or can no longer move to `succeeded`. Of several
    /// concurrent callers, exactly one observes `Some`. On error neither record changes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Invalid` if the grant duration is out of range, or an error if
    /// the database operation fails.
    fn activate_payment(
        &self,
        id: PaymentId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>>;

    /// Payments of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Payment>>;

    /// Every payment not yet in a terminal state, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_open(&self) -> Result<Vec<Payment>>;
}

/// Everything the engine needs from persistence.
pub trait Store: AccountStore + CounterStore + PaymentStore {}

impl<T: AccountStore + CounterStore + PaymentStore> Store for T {}
