//! Administrative overrides.
//!
//! Direct, immediately consistent operations on accounts, counters and payments for a
//! fixed allow-list of operators. Nothing here can be undone; every call is logged with the
//! acting identity.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use chatgate_core::{
    check_days, utc_day, Account, AccountStatus, Clock, DailyCounter, GateError, Payment, Tier,
    TierCounts, UserId,
};
use chatgate_store::{Store, StoreError};

use crate::payments::PaymentLedger;
use crate::quota::QuotaLedger;
use crate::reconciler::{PaymentReconciler, PollOutcome};

/// Payments shown in a user report.
const REPORT_PAYMENTS: usize = 10;

/// Upper bound on accounts returned by one listing.
pub const MAX_USER_LIST: usize = 1000;

/// Error type for administrative operations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The caller is not on the allow-list.
    #[error("user {0} is not allowed to run admin commands")]
    Forbidden(UserId),

    /// Malformed input. Nothing was changed.
    #[error(transparent)]
    Invalid(#[from] GateError),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The processor could not be asked.
    #[error("payment check failed: {0}")]
    Processor(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything stored about one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    /// The stored account as found, before lazy expiry.
    pub account: Option<Account>,
    /// Current status after lazy expiry.
    pub status: AccountStatus,
    /// Today's message counter.
    pub today: DailyCounter,
    /// Most recent payments, newest first.
    pub payments: Vec<Payment>,
}

/// One line of the user listing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UserSummary {
    /// The user.
    pub user_id: UserId,
    /// Effective tier, expiry and days left.
    #[serde(flatten)]
    pub status: AccountStatus,
    /// Messages consumed today.
    pub used_today: u32,
}

/// Service-wide counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdminStats {
    /// Accounts per effective tier.
    pub tiers: TierCounts,
    /// Payments not yet settled.
    pub open_payments: usize,
    /// Daily cap for free and trial accounts.
    pub daily_cap: u32,
}

/// Privileged operations, gated on an identity allow-list.
pub struct AdminOverride {
    admins: HashSet<UserId>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    quota: Arc<QuotaLedger>,
    ledger: Arc<PaymentLedger>,
    reconciler: Arc<PaymentReconciler>,
}

impl AdminOverride {
    /// Create the override surface for `admins`.
    #[must_use]
    pub fn new(
        admins: HashSet<UserId>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        quota: Arc<QuotaLedger>,
        ledger: Arc<PaymentLedger>,
        reconciler: Arc<PaymentReconciler>,
    ) -> Self {
        Self {
            admins,
            store,
            clock,
            quota,
            ledger,
            reconciler,
        }
    }

    /// Whether `user` is on the allow-list.
    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    fn authorize(&self, caller: UserId, action: &str) -> Result<(), AdminError> {
        if self.is_admin(caller) {
            return Ok(());
        }
        tracing::warn!(caller = %caller, action, "Admin command rejected");
        Err(AdminError::Forbidden(caller))
    }

    /// Make `user` premium for `days` from now.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins, `AdminError::Invalid` if `days` is 0 or
    /// above [`MAX_GRANT_DAYS`](chatgate_core::MAX_GRANT_DAYS).
    pub fn grant(
        &self,
        caller: UserId,
        user: UserId,
        days: u32,
    ) -> Result<AccountStatus, AdminError> {
        self.authorize(caller, "grant")?;
        let days = check_days(days)?;

        let now = self.clock.now();
        let account = self.store.grant(user, days, now)?;
        tracing::info!(admin = %caller, user_id = %user, days, "Admin granted premium");
        Ok(account.status(now))
    }

    /// Force `user` back to free.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins.
    pub fn revoke(&self, caller: UserId, user: UserId) -> Result<AccountStatus, AdminError> {
        self.authorize(caller, "revoke")?;

        let now = self.clock.now();
        let account = self.store.revoke(user, now)?;
        tracing::info!(admin = %caller, user_id = %user, "Admin revoked premium");
        Ok(account.status(now))
    }

    /// Delete `user`'s counter for `day` (default: today). Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins.
    pub fn reset_counter(
        &self,
        caller: UserId,
        user: UserId,
        day: Option<NaiveDate>,
    ) -> Result<bool, AdminError> {
        self.authorize(caller, "reset_counter")?;
        let existed = self.quota.reset(user, day)?;
        tracing::info!(admin = %caller, user_id = %user, existed, "Admin reset daily counter");
        Ok(existed)
    }

    /// Everything stored about `user`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins.
    pub fn inspect(&self, caller: UserId, user: UserId) -> Result<UserReport, AdminError> {
        self.authorize(caller, "inspect")?;

        let now = self.clock.now();
        let account = self.store.get_account(user)?;
        let status = self.store.get_status(user, now)?;
        let day = utc_day(now);
        let count = self.store.get_count(user, day)?;
        let payments = self.ledger.history(user, REPORT_PAYMENTS)?;

        Ok(UserReport {
            account,
            status,
            today: DailyCounter {
                user_id: user,
                day,
                count,
            },
            payments,
        })
    }

    /// Look up a payment by local or processor id.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins, `AdminError::NotFound` if no payment
    /// matches.
    pub fn find_payment(&self, caller: UserId, id: &str) -> Result<Payment, AdminError> {
        self.authorize(caller, "find_payment")?;
        self.ledger
            .find_by_any_id(id)?
            .ok_or_else(|| AdminError::NotFound(format!("payment {id}")))
    }

    /// Ask the processor about a payment, activating it if paid.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins, `AdminError::NotFound` if no payment
    /// matches, `AdminError::Processor` if the processor could not be asked.
    pub async fn check_payment(
        &self,
        caller: UserId,
        id: &str,
    ) -> Result<PollOutcome, AdminError> {
        self.authorize(caller, "check_payment")?;
        let outcome = self.reconciler.poll(id).await;
        tracing::info!(admin = %caller, payment = %id, outcome = ?outcome, "Admin checked payment");
        outcome_result(id, outcome)
    }

    /// Mark a payment paid without asking the processor, granting the plan's duration.
    ///
    /// Goes through the same forward-only guard as every other activation, so a payment that
    /// is already settled is reported, not activated twice.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins, `AdminError::NotFound` if no payment
    /// matches.
    pub async fn complete_payment(
        &self,
        caller: UserId,
        id: &str,
    ) -> Result<PollOutcome, AdminError> {
        self.authorize(caller, "complete_payment")?;
        let outcome = self.reconciler.complete(id).await;
        tracing::info!(
            admin = %caller,
            payment = %id,
            outcome = ?outcome,
            "Admin completed payment"
        );
        outcome_result(id, outcome)
    }

    /// Known users with their tier and today's usage, premium first, then trial, then free.
    ///
    /// Reads up to `limit` accounts (capped at [`MAX_USER_LIST`]) in user id order. Lapsed
    /// entitlements are reported as free without being written back.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins.
    pub fn list_users(
        &self,
        caller: UserId,
        limit: usize,
    ) -> Result<Vec<UserSummary>, AdminError> {
        self.authorize(caller, "list_users")?;

        let now = self.clock.now();
        let day = utc_day(now);
        let mut users = self
            .store
            .list_accounts(limit.min(MAX_USER_LIST))?
            .into_iter()
            .map(|account| {
                Ok(UserSummary {
                    user_id: account.user_id,
                    status: account.status(now),
                    used_today: self.store.get_count(account.user_id, day)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        users.sort_by_key(|user| (tier_rank(user.status.tier), user.user_id));
        Ok(users)
    }

    /// Service-wide counts.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` for non-admins.
    pub fn stats(&self, caller: UserId) -> Result<AdminStats, AdminError> {
        self.authorize(caller, "stats")?;
        Ok(AdminStats {
            tiers: self.store.count_by_tier(self.clock.now())?,
            open_payments: self.ledger.open_payments()?.len(),
            daily_cap: self.quota.daily_cap(),
        })
    }
}

const fn tier_rank(tier: Tier) -> u8 {
    match tier {
        Tier::Premium => 0,
        Tier::Trial => 1,
        Tier::Free => 2,
    }
}

fn outcome_result(id: &str, outcome: PollOutcome) -> Result<PollOutcome, AdminError> {
    match outcome {
        PollOutcome::NotFound => Err(AdminError::NotFound(format!("payment {id}"))),
        PollOutcome::Error { reason } => Err(AdminError::Processor(reason)),
        outcome => Ok(outcome),
    }
}
