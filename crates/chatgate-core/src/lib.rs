//! Core types for chatgate.
//!
//! This crate provides the domain model shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `PaymentId`
//! - **Accounts**: `Account`, `Entitlement`, `Tier`, `AccountStatus`
//! - **Quota**: `Cap`, `DailyCounter`, `QuotaDecision`
//! - **Payments**: `Payment`, `PaymentStatus`, `PaymentMode`
//! - **Plans**: `Plan`, `PlanId`, `PlanCatalog`
//! - **Time**: `Clock`, `SystemClock`, `ManualClock`
//!
//! # Money
//!
//! Amounts are stored as `i64` minor units (kopecks): 139.00 RUB is `13_900`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod clock;
pub mod error;
pub mod ids;
pub mod payment;
pub mod plan;
pub mod quota;

pub use account::{Account, AccountStatus, Entitlement, Tier, TierCounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{check_days, parse_day, parse_days, GateError, Result, MAX_GRANT_DAYS};
pub use ids::{IdError, PaymentId, UserId};
pub use payment::{format_minor, Payment, PaymentMode, PaymentStatus};
pub use plan::{Plan, PlanCatalog, PlanId, PREMIUM_MONTH_PRICE_MINOR, PREMIUM_YEAR_PRICE_MINOR};
pub use quota::{utc_day, Cap, DailyCounter, QuotaDecision, DEFAULT_DAILY_CAP};
