//! Payment records and their lifecycle.
//!
//! A payment moves forward only:
//!
//! ```text
//! pending ──► waiting_confirmation ──┐
//!    │                               ├──► succeeded | canceled | failed
//!    └───────────────────────────────┘
//! ```
//!
//! Terminal states accept no further transitions, which is what makes repeated webhook
//! deliveries and repeated polls safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::{PaymentId, PlanId, UserId};

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, not yet paid.
    Pending,
    /// Paid, awaiting capture or confirmation by the processor.
    WaitingConfirmation,
    /// Paid and captured. Terminal.
    Succeeded,
    /// Canceled by the user or the processor. Terminal.
    Canceled,
    /// Failed. Terminal.
    Failed,
}

impl PaymentStatus {
    /// Whether no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a forward transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::WaitingConfirmation) => true,
            (Self::Pending | Self::WaitingConfirmation, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WaitingConfirmation => "waiting_confirmation",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Map a payment processor status string onto a local status.
    ///
    /// # Errors
    ///
    /// Returns `GateError::UnknownStatus` for strings outside the processor vocabulary.
    pub fn from_processor(status: &str) -> Result<Self, GateError> {
        match status {
            "pending" => Ok(Self::Pending),
            "waiting_for_capture" | "waiting_confirmation" => Ok(Self::WaitingConfirmation),
            "succeeded" => Ok(Self::Succeeded),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "failed" => Ok(Self::Failed),
            other => Err(GateError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the payment is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Backed by a real processor payment.
    Live,
    /// Created without processor credentials; completed by a poll or an administrator.
    Offline,
}

/// A payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Local identifier handed to the user.
    pub local_id: PaymentId,

    /// Processor identifier, once known. Absent for offline payments.
    pub external_id: Option<String>,

    /// The paying user.
    pub user_id: UserId,

    /// Purchased plan.
    pub plan_id: PlanId,

    /// Amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Lifecycle status.
    pub status: PaymentStatus,

    /// Live or offline.
    pub mode: PaymentMode,

    /// Where the user completes the payment.
    pub confirmation_url: Option<String>,

    /// When the payment was created.
    pub created_at: DateTime<Utc>,

    /// When the payment was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Whether `id` names this payment by either identifier.
    #[must_use]
    pub fn matches_id(&self, id: &str) -> bool {
        self.external_id.as_deref() == Some(id) || self.local_id.to_string() == id
    }

    /// Apply a forward transition.
    ///
    /// Returns `false` and leaves the payment untouched if the transition is not forward.
    pub fn transition(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    /// Amount formatted in major units, e.g. `139.00`.
    #[must_use]
    pub fn amount_display(&self) -> String {
        format_minor(self.amount_minor)
    }
}

/// Format a minor-unit amount as a decimal string with two places.
#[must_use]
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            local_id: PaymentId::generate(),
            external_id: Some("2d2b4f2a-000f-5000-9000-1b7c1ad4e1a1".into()),
            user_id: UserId::new(1),
            plan_id: PlanId::new("premium_month"),
            amount_minor: 13_900,
            currency: "RUB".into(),
            status,
            mode: PaymentMode::Live,
            confirmation_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_states_move_forward() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(WaitingConfirmation));
        assert!(Pending.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Canceled));
        assert!(WaitingConfirmation.can_transition_to(Succeeded));
        assert!(WaitingConfirmation.can_transition_to(Failed));
    }

    #[test]
    fn no_backward_or_self_transitions() {
        use PaymentStatus::*;
        assert!(!Pending.can_transition_to(Pending));
        assert!(!WaitingConfirmation.can_transition_to(Pending));
        assert!(!WaitingConfirmation.can_transition_to(WaitingConfirmation));
    }

    #[test]
    fn terminal_states_are_final() {
        use PaymentStatus::*;
        for terminal in [Succeeded, Canceled, Failed] {
            for next in [Pending, WaitingConfirmation, Succeeded, Canceled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn transition_on_succeeded_payment_is_rejected() {
        let mut p = payment(PaymentStatus::Succeeded);
        let before = p.clone();
        assert!(!p.transition(PaymentStatus::Canceled, Utc::now()));
        assert_eq!(p, before);
    }

    #[test]
    fn matches_either_identifier() {
        let p = payment(PaymentStatus::Pending);
        assert!(p.matches_id("2d2b4f2a-000f-5000-9000-1b7c1ad4e1a1"));
        assert!(p.matches_id(&p.local_id.to_string()));
        assert!(!p.matches_id("other"));
    }

    #[test]
    fn processor_vocabulary() {
        assert_eq!(
            PaymentStatus::from_processor("waiting_for_capture").unwrap(),
            PaymentStatus::WaitingConfirmation
        );
        assert_eq!(
            PaymentStatus::from_processor("canceled").unwrap(),
            PaymentStatus::Canceled
        );
        assert!(PaymentStatus::from_processor("refunded").is_err());
    }

    #[test]
    fn minor_units_format() {
        assert_eq!(format_minor(13_900), "139.00");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-250), "-2.50");
    }
}
