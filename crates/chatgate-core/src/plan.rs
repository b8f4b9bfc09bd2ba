//! Subscription plans.
//!
//! Plans are static configuration: a price, a duration and a display name.

use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Monthly premium plan price in kopecks (139.00 RUB).
pub const PREMIUM_MONTH_PRICE_MINOR: i64 = 13_900;

/// Yearly premium plan price in kopecks (990.00 RUB).
pub const PREMIUM_YEAR_PRICE_MINOR: i64 = 99_000;

/// A plan identifier such as `premium_month`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Create a plan id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Name shown to users.
    pub display_name: String,
    /// Short description for receipts and menus.
    pub description: String,
    /// Price in minor currency units.
    pub price_minor: i64,
    /// Premium days granted on payment.
    pub duration_days: u32,
}

/// The set of plans on offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog from a list of plans.
    #[must_use]
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Look up a plan.
    ///
    /// # Errors
    ///
    /// Returns `GateError::UnknownPlan` if no plan has this id.
    pub fn get(&self, id: &str) -> Result<&Plan, GateError> {
        self.plans
            .iter()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| GateError::UnknownPlan(id.to_string()))
    }

    /// All plans in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new(vec![
            Plan {
                id: PlanId::new("premium_month"),
                display_name: "Premium (1 month)".into(),
                description: "Unlimited conversations for 30 days".into(),
                price_minor: PREMIUM_MONTH_PRICE_MINOR,
                duration_days: 30,
            },
            Plan {
                id: PlanId::new("premium_year"),
                display_name: "Premium (1 year)".into(),
                description: "Unlimited conversations for a year, about 40% off monthly".into(),
                price_minor: PREMIUM_YEAR_PRICE_MINOR,
                duration_days: 365,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_month_and_year() {
        let catalog = PlanCatalog::default();
        let month = catalog.get("premium_month").unwrap();
        assert_eq!(month.price_minor, 13_900);
        assert_eq!(month.duration_days, 30);
        assert_eq!(catalog.get("premium_year").unwrap().duration_days, 365);
        assert_eq!(catalog.iter().count(), 2);
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let err = PlanCatalog::default().get("lifetime").unwrap_err();
        assert!(matches!(err, GateError::UnknownPlan(ref id) if id == "lifetime"));
    }
}
