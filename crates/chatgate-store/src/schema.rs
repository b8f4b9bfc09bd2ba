//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Daily message counters, keyed by `user_id || day`. Value is a big-endian `u32`.
    pub const DAILY_COUNTERS: &str = "daily_counters";

    /// Payment records, keyed by `local_id` (ULID).
    pub const PAYMENTS: &str = "payments";

    /// Index: processor id to local id, keyed by `external_id`.
    pub const PAYMENTS_BY_EXTERNAL: &str = "payments_by_external";

    /// Index: payments by user, keyed by `user_id || local_id`.
    /// Value is empty (index only).
    pub const PAYMENTS_BY_USER: &str = "payments_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::DAILY_COUNTERS,
        cf::PAYMENTS,
        cf::PAYMENTS_BY_EXTERNAL,
        cf::PAYMENTS_BY_USER,
    ]
}
