//! Daily message quota enforcement.

use std::sync::Arc;

use chatgate_core::{utc_day, AccountStatus, Cap, Clock, QuotaDecision, UserId};
use chatgate_store::{Result, Store};
use chrono::NaiveDate;

/// Decides whether a user may consume an AI reply, and counts the ones they do.
pub struct QuotaLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    daily_cap: u32,
}

impl QuotaLedger {
    /// Create a ledger enforcing `daily_cap` on free and trial accounts.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, daily_cap: u32) -> Self {
        Self {
            store,
            clock,
            daily_cap,
        }
    }

    /// The cap for free and trial accounts.
    #[must_use]
    pub const fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    /// Check the quota and, for real messages, consume one unit.
    ///
    /// Privileged actions (menus, status screens) never touch the counter and are always
    /// allowed. For real messages the check and the increment are a single atomic step in
    /// the store. The cap follows the tier at the moment of the check.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn check_and_consume(&self, user_id: UserId, privileged: bool) -> Result<QuotaDecision> {
        let now = self.clock.now();
        let status = self.store.get_status(user_id, now)?;
        let cap = Cap::for_tier(status.tier, self.daily_cap);
        let day = utc_day(now);

        if privileged {
            let used = self.store.get_count(user_id, day)?;
            return Ok(QuotaDecision {
                allowed: true,
                used,
                cap,
                tier: status.tier,
            });
        }

        let (allowed, used) = self.store.increment_if_below(user_id, day, cap)?;
        if !allowed {
            tracing::info!(user_id = %user_id, used, cap = %cap, "Daily message cap reached");
        }

        Ok(QuotaDecision {
            allowed,
            used,
            cap,
            tier: status.tier,
        })
    }

    /// Today's usage without consuming anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn usage(&self, user_id: UserId) -> Result<QuotaDecision> {
        self.check_and_consume(user_id, true)
    }

    /// The user's account status, normalizing a lapsed entitlement.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn status(&self, user_id: UserId) -> Result<AccountStatus> {
        self.store.get_status(user_id, self.clock.now())
    }

    /// Delete the counter for `day` (default: today). Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn reset(&self, user_id: UserId, day: Option<NaiveDate>) -> Result<bool> {
        let day = day.unwrap_or_else(|| utc_day(self.clock.now()));
        let existed = self.store.reset_counter(user_id, day)?;
        tracing::info!(user_id = %user_id, day = %day, existed, "Daily counter reset");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::{Account, Entitlement, ManualClock, Tier};
    use chatgate_store::{AccountStore, MemoryStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    fn ledger() -> (QuotaLedger, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let ledger = QuotaLedger::new(store.clone(), clock.clone(), 5);
        (ledger, store, clock)
    }

    #[test]
    fn sixth_message_is_denied_with_used_at_cap() {
        let (ledger, _, _) = ledger();
        let user = UserId::new(1);
        for n in 1..=5 {
            let decision = ledger.check_and_consume(user, false).unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.used, n);
        }
        let denied = ledger.check_and_consume(user, false).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.used, 5);
        assert_eq!(denied.cap, Cap::Limited(5));
    }

    #[test]
    fn menu_actions_never_consume_quota() {
        let (ledger, _, _) = ledger();
        let user = UserId::new(1);
        for _ in 0..4 {
            ledger.check_and_consume(user, false).unwrap();
        }
        for _ in 0..20 {
            let decision = ledger.check_and_consume(user, true).unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.used, 4);
        }
        assert_eq!(ledger.check_and_consume(user, false).unwrap().used, 5);
    }

    #[test]
    fn privileged_actions_are_allowed_past_the_cap() {
        let (ledger, _, _) = ledger();
        let user = UserId::new(1);
        for _ in 0..6 {
            ledger.check_and_consume(user, false).unwrap();
        }
        assert!(ledger.usage(user).unwrap().allowed);
    }

    #[test]
    fn premium_is_unlimited() {
        let (ledger, store, _) = ledger();
        let user = UserId::new(1);
        store.grant(user, 30, t0()).unwrap();
        for _ in 0..50 {
            assert!(ledger.check_and_consume(user, false).unwrap().allowed);
        }
        assert_eq!(ledger.usage(user).unwrap().used, 50);
    }

    #[test]
    fn downgrade_mid_day_keeps_accrued_count() {
        let (ledger, store, clock) = ledger();
        let user = UserId::new(1);
        let mut account = Account::new(user, t0());
        account.entitlement = Entitlement::Premium {
            expires_at: Some(t0() + Duration::hours(1)),
        };
        store.put_account(account).unwrap();

        for _ in 0..8 {
            ledger.check_and_consume(user, false).unwrap();
        }
        clock.advance(Duration::hours(2));

        let decision = ledger.check_and_consume(user, false).unwrap();
        assert_eq!(decision.tier, Tier::Free);
        assert!(!decision.allowed);
        assert_eq!(decision.used, 8);
    }

    #[test]
    fn counter_rolls_over_at_utc_midnight() {
        let (ledger, _, clock) = ledger();
        let user = UserId::new(1);
        for _ in 0..5 {
            ledger.check_and_consume(user, false).unwrap();
        }
        clock.set(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 1).unwrap());
        assert_eq!(ledger.check_and_consume(user, false).unwrap().used, 1);
    }

    #[test]
    fn reset_defaults_to_today() {
        let (ledger, _, _) = ledger();
        let user = UserId::new(1);
        ledger.check_and_consume(user, false).unwrap();
        assert!(ledger.reset(user, None).unwrap());
        assert_eq!(ledger.usage(user).unwrap().used, 0);
        assert!(!ledger.reset(user, None).unwrap());
    }
}
