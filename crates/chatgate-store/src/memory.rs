//! In-memory storage implementation.
//!
//! All state sits behind one `RwLock`, so every mutation is trivially atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chatgate_core::{
    Account, AccountStatus, Cap, Entitlement, Payment, PaymentId, PaymentStatus, TierCounts,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, StoreError};
use crate::{AccountStore, CounterStore, PaymentStore};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    counters: HashMap<(UserId, NaiveDate), u32>,
    payments: BTreeMap<PaymentId, Payment>,
    by_external: HashMap<String, PaymentId>,
}

/// Storage backed by in-process maps. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an account record wholesale. Test setup only; the engine never calls this.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn put_account(&self, account: Account) -> Result<()> {
        self.write()?.accounts.insert(account.user_id, account);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl AccountStore for MemoryStore {
    fn get_account(&self, user_id: UserId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(&user_id).cloned())
    }

    fn get_status(&self, user_id: UserId, now: DateTime<Utc>) -> Result<AccountStatus> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id, now));
        if account.normalize(now) {
            tracing::info!(user_id = %user_id, "Entitlement expired, downgraded to free");
        }
        Ok(account.status(now))
    }

    fn grant(&self, user_id: UserId, days: u32, now: DateTime<Utc>) -> Result<Account> {
        let entitlement = Entitlement::premium_for(days, now)?;
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id, now));
        account.set_entitlement(entitlement, now);
        Ok(account.clone())
    }

    fn revoke(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id, now));
        account.revoke(now);
        Ok(account.clone())
    }

    fn list_accounts(&self, limit: usize) -> Result<Vec<Account>> {
        let inner = self.read()?;
        let mut accounts: Vec<Account> = inner.accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.user_id);
        accounts.truncate(limit);
        Ok(accounts)
    }

    fn count_by_tier(&self, now: DateTime<Utc>) -> Result<TierCounts> {
        let inner = self.read()?;
        let mut counts = TierCounts::default();
        for account in inner.accounts.values() {
            counts.add(account.status(now).tier);
        }
        Ok(counts)
    }
}

impl CounterStore for MemoryStore {
    fn get_count(&self, user_id: UserId, day: NaiveDate) -> Result<u32> {
        Ok(self
            .read()?
            .counters
            .get(&(user_id, day))
            .copied()
            .unwrap_or(0))
    }

    fn increment_if_below(
        &self,
        user_id: UserId,
        day: NaiveDate,
        cap: Cap,
    ) -> Result<(bool, u32)> {
        let mut inner = self.write()?;
        let used = inner.counters.get(&(user_id, day)).copied().unwrap_or(0);
        if !cap.allows(used) {
            return Ok((false, used));
        }
        let next = used.saturating_add(1);
        inner.counters.insert((user_id, day), next);
        Ok((true, next))
    }

    fn reset_counter(&self, user_id: UserId, day: NaiveDate) -> Result<bool> {
        Ok(self.write()?.counters.remove(&(user_id, day)).is_some())
    }
}

impl PaymentStore for MemoryStore {
    fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut inner = self.write()?;
        if inner.payments.contains_key(&payment.local_id) {
            return Err(StoreError::Conflict(format!(
                "payment {} already exists",
                payment.local_id
            )));
        }
        if let Some(external_id) = &payment.external_id {
            if inner.by_external.contains_key(external_id) {
                return Err(StoreError::Conflict(format!(
                    "external payment id {external_id} already recorded"
                )));
            }
            inner
                .by_external
                .insert(external_id.clone(), payment.local_id);
        }
        inner.payments.insert(payment.local_id, payment.clone());
        Ok(())
    }

    fn find_by_local_id(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.read()?.payments.get(&id).cloned())
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        let inner = self.read()?;
        Ok(inner
            .by_external
            .get(external_id)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }

    fn update_status(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner
            .payments
            .get_mut(&id)
            .is_some_and(|payment| payment.transition(next, now)))
    }

    fn activate_payment(
        &self,
        id: PaymentId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let entitlement = Entitlement::premium_for(days, now)?;
        let mut inner = self.write()?;
        let Some(payment) = inner.payments.get_mut(&id) else {
            return Ok(None);
        };
        if !payment.transition(PaymentStatus::Succeeded, now) {
            return Ok(None);
        }

        let user_id = payment.user_id;
        let account = inner
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id, now));
        account.set_entitlement(entitlement, now);
        Ok(Some(account.clone()))
    }

    fn list_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Payment>> {
        let inner = self.read()?;
        Ok(inner
            .payments
            .values()
            .rev()
            .filter(|p| p.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn list_open(&self) -> Result<Vec<Payment>> {
        let inner = self.read()?;
        Ok(inner
            .payments
            .values()
            .filter(|p| !p.status.is_terminal())
            .cloned()
            .collect())
    }
}
