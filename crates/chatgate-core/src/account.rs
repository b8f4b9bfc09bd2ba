//! Account types for chatgate.
//!
//! An account records a user's subscription tier and when it expires. The tier and the
//! expiry are kept together in [`Entitlement`] so that a free account with an expiry date
//! cannot be represented.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{GateError, UserId};

/// Subscription level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free tier, subject to the daily message cap.
    Free,
    /// Time-limited trial, capped like the free tier.
    Trial,
    /// Paid subscription with unlimited messages.
    Premium,
}

impl Tier {
    /// Get the tier name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Trial => "trial",
            Self::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an account is entitled to, and until when.
///
/// `expires_at = None` on a paid or trial entitlement means it never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "tier")]
pub enum Entitlement {
    /// No paid entitlement.
    Free,

    /// Trial entitlement.
    Trial {
        /// When the trial ends.
        expires_at: Option<DateTime<Utc>>,
    },

    /// Premium entitlement.
    Premium {
        /// When the subscription ends.
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Entitlement {
    /// Premium entitlement lasting `days` from `now`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidDuration` if the expiry falls outside the representable
    /// date range.
    pub fn premium_for(days: u32, now: DateTime<Utc>) -> crate::Result<Self> {
        let expires_at = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_add_signed(span))
            .ok_or_else(|| {
                GateError::InvalidDuration(format!("{days} days from {now} is out of range"))
            })?;
        Ok(Self::Premium {
            expires_at: Some(expires_at),
        })
    }

    /// The tier this entitlement grants.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        match self {
            Self::Free => Tier::Free,
            Self::Trial { .. } => Tier::Trial,
            Self::Premium { .. } => Tier::Premium,
        }
    }

    /// The expiry, if the entitlement has one.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Free => None,
            Self::Trial { expires_at } | Self::Premium { expires_at } => *expires_at,
        }
    }

    /// Whether the entitlement has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// The entitlement in effect at `now`: a lapsed trial or premium becomes `Free`.
    #[must_use]
    pub fn effective(self, now: DateTime<Utc>) -> Self {
        if self.is_expired(now) {
            Self::Free
        } else {
            self
        }
    }
}

/// A user's account.
///
/// Created lazily on first interaction (free), never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user this account belongs to.
    pub user_id: UserId,

    /// Current entitlement.
    pub entitlement: Entitlement,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new free account.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            entitlement: Entitlement::Free,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current tier as stored (may be stale until [`Account::normalize`] runs).
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.entitlement.tier()
    }

    /// Downgrade a lapsed entitlement to free.
    ///
    /// Returns `true` if the account changed and must be written back.
    pub fn normalize(&mut self, now: DateTime<Utc>) -> bool {
        if self.entitlement.is_expired(now) {
            self.entitlement = Entitlement::Free;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Set premium for `days` from `now`, replacing any existing expiry.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidDuration` if the expiry is out of range. The account is
    /// left unchanged.
    pub fn grant_premium(&mut self, days: u32, now: DateTime<Utc>) -> crate::Result<()> {
        self.set_entitlement(Entitlement::premium_for(days, now)?, now);
        Ok(())
    }

    /// Replace the entitlement.
    pub fn set_entitlement(&mut self, entitlement: Entitlement, now: DateTime<Utc>) {
        self.entitlement = entitlement;
        self.updated_at = now;
    }

    /// Force the account back to free.
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.set_entitlement(Entitlement::Free, now);
    }

    /// Snapshot of the account's status at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> AccountStatus {
        AccountStatus::of(self.entitlement.effective(now), now)
    }
}

/// The answer to "may this user consume a paid resource": tier, expiry and days left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    /// Effective tier.
    pub tier: Tier,
    /// Expiry of the entitlement, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whole days until expiry; 0 for free accounts and entitlements without expiry.
    pub days_left: i64,
}

impl AccountStatus {
    /// Build the status of an (already normalized) entitlement.
    #[must_use]
    pub fn of(entitlement: Entitlement, now: DateTime<Utc>) -> Self {
        let expires_at = entitlement.expires_at();
        let days_left = expires_at.map_or(0, |at| (at - now).num_days().max(0));
        Self {
            tier: entitlement.tier(),
            expires_at,
            days_left,
        }
    }

    /// Whether the account is currently premium.
    #[must_use]
    pub const fn is_premium(&self) -> bool {
        matches!(self.tier, Tier::Premium)
    }
}

/// Number of accounts per effective tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// Free accounts.
    pub free: u64,
    /// Trial accounts.
    pub trial: u64,
    /// Premium accounts.
    pub premium: u64,
}

impl TierCounts {
    /// Count one more account of `tier`.
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::Free => self.free += 1,
            Tier::Trial => self.trial += 1,
            Tier::Premium => self.premium += 1,
        }
    }

    /// Total number of accounts.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.free + self.trial + self.premium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_account_is_free() {
        let account = Account::new(UserId::new(1), t0());
        assert_eq!(account.tier(), Tier::Free);
        assert_eq!(account.entitlement.expires_at(), None);
    }

    #[test]
    fn grant_resets_expiry_instead_of_stacking() {
        let mut account = Account::new(UserId::new(1), t0());
        account.grant_premium(30, t0()).unwrap();
        let later = t0() + Duration::days(10);
        account.grant_premium(30, later).unwrap();
        assert_eq!(
            account.entitlement.expires_at(),
            Some(later + Duration::days(30))
        );
    }

    #[test]
    fn out_of_range_grant_leaves_account_unchanged() {
        let mut account = Account::new(UserId::new(1), t0());
        account.grant_premium(30, t0()).unwrap();
        let before = account.clone();

        let err = account.grant_premium(u32::MAX, t0() + Duration::days(1));

        assert!(matches!(err, Err(GateError::InvalidDuration(_))));
        assert_eq!(account, before);
    }

    #[test]
    fn normalize_downgrades_lapsed_premium() {
        let mut account = Account::new(UserId::new(1), t0());
        account.grant_premium(1, t0()).unwrap();
        let later = t0() + Duration::days(2);

        assert!(account.normalize(later));
        assert_eq!(account.entitlement, Entitlement::Free);
        assert_eq!(account.updated_at, later);
        assert!(!account.normalize(later));
    }

    #[test]
    fn normalize_keeps_active_and_unbounded_entitlements() {
        let mut account = Account::new(UserId::new(1), t0());
        account.entitlement = Entitlement::Premium { expires_at: None };
        assert!(!account.normalize(t0() + Duration::days(10_000)));

        account.grant_premium(30, t0()).unwrap();
        assert!(!account.normalize(t0() + Duration::days(29)));
    }

    #[test]
    fn status_reports_days_left() {
        let mut account = Account::new(UserId::new(1), t0());
        account.grant_premium(30, t0()).unwrap();

        let status = account.status(t0() + Duration::hours(36));
        assert_eq!(status.tier, Tier::Premium);
        assert_eq!(status.days_left, 28);

        let free = Account::new(UserId::new(2), t0()).status(t0());
        assert_eq!(free.days_left, 0);
    }

    #[test]
    fn status_of_lapsed_account_is_free() {
        let mut account = Account::new(UserId::new(1), t0());
        account.entitlement = Entitlement::Trial {
            expires_at: Some(t0()),
        };
        let status = account.status(t0() + Duration::seconds(1));
        assert_eq!(status.tier, Tier::Free);
        assert_eq!(status.expires_at, None);
        assert_eq!(status.days_left, 0);
    }

    #[test]
    fn entitlement_serializes_with_tier_tag() {
        let json = serde_json::to_value(Entitlement::Free).unwrap();
        assert_eq!(json, serde_json::json!({ "tier": "free" }));
    }

    #[test]
    fn tier_counts_total() {
        let mut counts = TierCounts::default();
        counts.add(Tier::Free);
        counts.add(Tier::Premium);
        counts.add(Tier::Premium);
        assert_eq!(counts.premium, 2);
        assert_eq!(counts.total(), 3);
    }
}
