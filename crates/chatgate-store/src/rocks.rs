//! `RocksDB` storage implementation.
//!
//! Writes are serialized through a process-wide write lock held across each
//! read-modify-write, and multi-key updates go through a single `WriteBatch`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use chatgate_core::{
    Account, AccountStatus, Cap, Entitlement, Payment, PaymentId, PaymentStatus, TierCounts,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccountStore, CounterStore, PaymentStore};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Load an account or a fresh free one. Caller must hold the write lock.
    fn load_or_new(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account> {
        Ok(self
            .get_value(cf::ACCOUNTS, &keys::account_key(user_id))?
            .unwrap_or_else(|| Account::new(user_id, now)))
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.put_value(cf::ACCOUNTS, &keys::account_key(account.user_id), account)
    }
}

impl AccountStore for RocksStore {
    fn get_account(&self, user_id: UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn get_status(&self, user_id: UserId, now: DateTime<Utc>) -> Result<AccountStatus> {
        let _guard = self.lock()?;
        let mut account = match self.get_account(user_id)? {
            Some(account) => account,
            None => {
                let account = Account::new(user_id, now);
                self.put_account(&account)?;
                return Ok(account.status(now));
            }
        };

        if account.normalize(now) {
            self.put_account(&account)?;
            tracing::info!(user_id = %user_id, "Entitlement expired, downgraded to free");
        }

        Ok(account.status(now))
    }

    fn grant(&self, user_id: UserId, days: u32, now: DateTime<Utc>) -> Result<Account> {
        let entitlement = Entitlement::premium_for(days, now)?;
        let _guard = self.lock()?;
        let mut account = self.load_or_new(user_id, now)?;
        account.set_entitlement(entitlement, now);
        self.put_account(&account)?;
        Ok(account)
    }

    fn revoke(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account> {
        let _guard = self.lock()?;
        let mut account = self.load_or_new(user_id, now)?;
        account.revoke(now);
        self.put_account(&account)?;
        Ok(account)
    }

    fn list_accounts(&self, limit: usize) -> Result<Vec<Account>> {
        // Platform user ids are positive, so big-endian key order is numeric order
        let cf = self.cf(cf::ACCOUNTS)?;
        let mut accounts = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start).take(limit) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            accounts.push(Self::deserialize::<Account>(&value)?);
        }

        Ok(accounts)
    }

    fn count_by_tier(&self, now: DateTime<Utc>) -> Result<TierCounts> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let mut counts = TierCounts::default();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let account: Account = Self::deserialize(&value)?;
            counts.add(account.status(now).tier);
        }

        Ok(counts)
    }
}

impl CounterStore for RocksStore {
    fn get_count(&self, user_id: UserId, day: NaiveDate) -> Result<u32> {
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        let value = self
            .db
            .get_cf(&cf, keys::counter_key(user_id, day))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match value {
            None => Ok(0),
            Some(bytes) => {
                let bytes: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Serialization(format!(
                        "counter value has {} bytes, expected 4",
                        bytes.len()
                    ))
                })?;
                Ok(u32::from_be_bytes(bytes))
            }
        }
    }

    fn increment_if_below(
        &self,
        user_id: UserId,
        day: NaiveDate,
        cap: Cap,
    ) -> Result<(bool, u32)> {
        let _guard = self.lock()?;
        let used = self.get_count(user_id, day)?;
        if !cap.allows(used) {
            return Ok((false, used));
        }

        let next = used.saturating_add(1);
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        self.db
            .put_cf(&cf, keys::counter_key(user_id, day), next.to_be_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok((true, next))
    }

    fn reset_counter(&self, user_id: UserId, day: NaiveDate) -> Result<bool> {
        let _guard = self.lock()?;
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        let key = keys::counter_key(user_id, day);

        let existed = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if existed {
            self.db
                .delete_cf(&cf, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(existed)
    }
}

impl PaymentStore for RocksStore {
    fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let _guard = self.lock()?;
        let cf_payments = self.cf(cf::PAYMENTS)?;
        let cf_external = self.cf(cf::PAYMENTS_BY_EXTERNAL)?;
        let cf_by_user = self.cf(cf::PAYMENTS_BY_USER)?;

        let payment_key = keys::payment_key(payment.local_id);
        let exists = self
            .db
            .get_cf(&cf_payments, &payment_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Err(StoreError::Conflict(format!(
                "payment {} already exists",
                payment.local_id
            )));
        }

        let mut batch = WriteBatch::default();

        if let Some(external_id) = &payment.external_id {
            let external_key = keys::external_key(external_id);
            let taken = self
                .db
                .get_cf(&cf_external, &external_key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if taken {
                return Err(StoreError::Conflict(format!(
                    "external payment id {external_id} already recorded"
                )));
            }
            batch.put_cf(&cf_external, &external_key, payment.local_id.to_bytes());
        }

        let value = Self::serialize(payment)?;
        batch.put_cf(&cf_payments, &payment_key, &value);
        batch.put_cf(
            &cf_by_user,
            keys::user_payment_key(payment.user_id, payment.local_id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn find_by_local_id(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get_value(cf::PAYMENTS, &keys::payment_key(id))
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        let cf = self.cf(cf::PAYMENTS_BY_EXTERNAL)?;
        let Some(value) = self
            .db
            .get_cf(&cf, keys::external_key(external_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let local_id = keys::payment_id_from_value(&value).ok_or_else(|| {
            StoreError::Serialization(format!("corrupt external index entry for {external_id}"))
        })?;
        self.find_by_local_id(local_id)
    }

    fn update_status(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.lock()?;
        let Some(mut payment) = self.find_by_local_id(id)? else {
            return Ok(false);
        };

        if !payment.transition(next, now) {
            return Ok(false);
        }

        self.put_value(cf::PAYMENTS, &keys::payment_key(id), &payment)?;
        Ok(true)
    }

    fn activate_payment(
        &self,
        id: PaymentId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let entitlement = Entitlement::premium_for(days, now)?;
        let _guard = self.lock()?;
        let Some(mut payment) = self.find_by_local_id(id)? else {
            return Ok(None);
        };
        if !payment.transition(PaymentStatus::Succeeded, now) {
            return Ok(None);
        }

        let mut account = self.load_or_new(payment.user_id, now)?;
        account.set_entitlement(entitlement, now);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.cf(cf::PAYMENTS)?,
            keys::payment_key(id),
            Self::serialize(&payment)?,
        );
        batch.put_cf(
            &self.cf(cf::ACCOUNTS)?,
            keys::account_key(account.user_id),
            Self::serialize(&account)?,
        );
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Some(account))
    }

    fn list_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Payment>> {
        let cf_by_user = self.cf(cf::PAYMENTS_BY_USER)?;
        let prefix = keys::user_payments_prefix(user_id);

        // ULIDs are time-ordered, so index keys for a user sort oldest first
        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::payment_id_from_user_key(&key) {
                ids.push(id);
            }
        }

        let mut payments = Vec::with_capacity(limit.min(ids.len()));
        for id in ids.into_iter().rev().take(limit) {
            if let Some(payment) = self.find_by_local_id(id)? {
                payments.push(payment);
            }
        }

        Ok(payments)
    }

    fn list_open(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(cf::PAYMENTS)?;
        let mut open = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let payment: Payment = Self::deserialize(&value)?;
            if !payment.status.is_terminal() {
                open.push(payment);
            }
        }

        Ok(open)
    }
}
