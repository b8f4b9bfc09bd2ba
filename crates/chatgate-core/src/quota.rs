//! Daily message quota types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Tier, UserId};

/// Daily cap on real messages for free and trial accounts.
pub const DEFAULT_DAILY_CAP: u32 = 5;

/// The UTC calendar day containing `now`.
#[must_use]
pub fn utc_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Messages counted for one user on one UTC day.
///
/// A missing counter means zero messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    /// The user.
    pub user_id: UserId,
    /// UTC calendar day.
    pub day: NaiveDate,
    /// Number of real messages consumed that day.
    pub count: u32,
}

/// Maximum number of real messages per UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Cap {
    /// At most this many messages.
    Limited(u32),
    /// No limit.
    Unlimited,
}

impl Cap {
    /// The cap that applies to `tier` given the free-tier daily cap.
    #[must_use]
    pub const fn for_tier(tier: Tier, daily_cap: u32) -> Self {
        match tier {
            Tier::Premium => Self::Unlimited,
            Tier::Free | Tier::Trial => Self::Limited(daily_cap),
        }
    }

    /// Whether one more message is allowed when `used` have been consumed.
    #[must_use]
    pub const fn allows(&self, used: u32) -> bool {
        match self {
            Self::Limited(max) => used < *max,
            Self::Unlimited => true,
        }
    }

    /// The numeric limit, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unlimited => None,
        }
    }
}

impl std::fmt::Display for Cap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Messages consumed today, including this one if it was counted.
    pub used: u32,
    /// The cap evaluated against the current tier.
    pub cap: Cap,
    /// The tier the cap was derived from.
    pub tier: Tier,
}

impl QuotaDecision {
    /// Messages left today, `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.cap.limit().map(|max| max.saturating_sub(self.used))
    }
}
