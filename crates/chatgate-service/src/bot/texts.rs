//! User-facing messages and keyboards.
//!
//! Everything is HTML for the messaging platform's `parse_mode`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use chatgate_core::{
    format_minor, AccountStatus, Cap, Payment, PaymentStatus, Plan, PlanCatalog, QuotaDecision,
    Tier,
};

use crate::admin::{AdminStats, UserReport, UserSummary};
use crate::messenger::{Button, Keyboard};
use crate::reconciler::PollOutcome;

/// Escape text for HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "Free",
        Tier::Trial => "Trial",
        Tier::Premium => "Premium",
    }
}

// ============================================================================
// Keyboards
// ============================================================================

/// Main menu buttons.
#[must_use]
pub fn menu_keyboard() -> Keyboard {
    Keyboard::default()
        .row(vec![
            Button::new("My status", "status"),
            Button::new("Premium", "plans"),
        ])
        .row(vec![
            Button::new("Payments", "history"),
            Button::new("Help", "help"),
        ])
}

/// One buy button per plan.
#[must_use]
pub fn plans_keyboard(plans: &PlanCatalog) -> Keyboard {
    plans
        .iter()
        .fold(Keyboard::default(), |keyboard, plan| {
            keyboard.row(vec![Button::new(
                format!("{} - {}", plan.display_name, format_minor(plan.price_minor)),
                format!("buy:{}", plan.id),
            )])
        })
        .row(vec![Button::new("Back", "menu")])
}

/// Button that re-checks a payment.
#[must_use]
pub fn check_keyboard(payment: &Payment) -> Keyboard {
    Keyboard::default()
        .row(vec![Button::new(
            "I have paid",
            format!("check:{}", payment.local_id),
        )])
        .row(vec![Button::new("Back", "menu")])
}

// ============================================================================
// Menu screens
// ============================================================================

/// Greeting shown on `/start` and `/menu`.
#[must_use]
pub fn welcome(daily_cap: u32) -> String {
    format!(
        "Hi! I am here to talk whenever you need it.\n\n\
         Just write a message. Free accounts get {daily_cap} replies per day; \
         Premium is unlimited."
    )
}

/// `/help`.
#[must_use]
pub fn help() -> String {
    "<b>Commands</b>\n\
     /menu - main menu\n\
     /status - your plan and today's usage\n\
     /plans - Premium plans\n\
     /buy &lt;plan&gt; - buy a plan\n\
     /check &lt;payment id&gt; - check a payment\n\
     /history - your payments\n\n\
     Menu buttons never count toward your daily limit."
        .to_string()
}

/// `/status`.
#[must_use]
pub fn status(status: &AccountStatus, usage: &QuotaDecision) -> String {
    let mut text = format!("<b>Plan:</b> {}\n", tier_name(status.tier));
    if let Some(expires_at) = status.expires_at {
        let _ = writeln!(
            text,
            "<b>Active until:</b> {} ({} days left)",
            date(expires_at),
            status.days_left
        );
    }
    match usage.cap {
        Cap::Limited(max) => {
            let _ = write!(text, "<b>Messages today:</b> {}/{max}", usage.used);
        }
        Cap::Unlimited => {
            let _ = write!(text, "<b>Messages today:</b> {} (unlimited)", usage.used);
        }
    }
    text
}

/// `/plans`.
#[must_use]
pub fn plans(plans: &PlanCatalog) -> String {
    let mut text = "<b>Premium</b>: unlimited conversations.\n\n".to_string();
    for plan in plans.iter() {
        let _ = writeln!(
            text,
            "<b>{}</b> - {} RUB\n{}",
            escape_html(&plan.display_name),
            format_minor(plan.price_minor),
            escape_html(&plan.description)
        );
    }
    text
}

/// `/history`.
#[must_use]
pub fn history(payments: &[Payment]) -> String {
    if payments.is_empty() {
        return "You have no payments yet.".to_string();
    }

    let mut text = "<b>Your payments</b>\n".to_string();
    for payment in payments {
        let _ = writeln!(
            text,
            "{} {} {} {} <code>{}</code>",
            date(payment.created_at),
            payment.plan_id,
            payment.amount_display(),
            payment.status,
            payment.local_id
        );
    }
    text
}

// ============================================================================
// Payments
// ============================================================================

/// Reply to a successful `/buy`.
#[must_use]
pub fn payment_created(payment: &Payment, plan: &Plan) -> String {
    let mut text = format!(
        "<b>{}</b>: {}\nPayment id: <code>{}</code>\n",
        escape_html(&plan.display_name),
        payment.amount_display(),
        payment.local_id
    );
    if let Some(url) = &payment.confirmation_url {
        let _ = writeln!(text, "Pay here: {}", escape_html(url));
    }
    text.push_str("Press the button below once you have paid.");
    text
}

/// Reply for a plan id that does not exist.
#[must_use]
pub fn unknown_plan(plan_id: &str) -> String {
    format!(
        "There is no plan called <code>{}</code>. See /plans.",
        escape_html(plan_id)
    )
}

/// Notification after activation.
#[must_use]
pub fn payment_succeeded(plan: &Plan, expires_at: Option<DateTime<Utc>>) -> String {
    let mut text = format!(
        "Payment received, thank you! <b>{}</b> is active.",
        escape_html(&plan.display_name)
    );
    if let Some(expires_at) = expires_at {
        let _ = write!(text, "\nActive until {}.", date(expires_at));
    }
    text
}

/// Notification after a cancellation or failure.
#[must_use]
pub fn payment_closed(payment: &Payment, status: PaymentStatus) -> String {
    format!(
        "Payment <code>{}</code> was {}. No money was taken; you can try again from /plans.",
        payment.local_id, status
    )
}

/// Reply to `/check`. `None` when the activation notification already went out.
#[must_use]
pub fn poll_outcome(outcome: &PollOutcome) -> Option<String> {
    let text = match outcome {
        PollOutcome::Succeeded { activated: true } => return None,
        PollOutcome::Succeeded { activated: false } => {
            "This payment is already confirmed. Premium is active.".to_string()
        }
        PollOutcome::Open { .. } => {
            "The payment is not confirmed yet. Try again in a minute.".to_string()
        }
        PollOutcome::Closed { status } => format!("This payment was {status}."),
        PollOutcome::NotFound => "Payment not found.".to_string(),
        PollOutcome::Error { .. } => try_again_later(),
    };
    Some(text)
}

// ============================================================================
// Quota
// ============================================================================

/// Footer appended to AI replies for capped accounts.
#[must_use]
pub fn usage_footer(decision: &QuotaDecision) -> Option<String> {
    decision
        .remaining()
        .map(|left| format!("\n\n<i>Messages left today: {left}</i>"))
}

/// Reply when the daily cap is reached.
#[must_use]
pub fn limit_reached(decision: &QuotaDecision) -> String {
    format!(
        "You have used all {} free messages for today. The limit resets at midnight UTC.\n\
         Premium removes the limit:",
        decision.used
    )
}

/// Generic failure reply; details go to the log only.
#[must_use]
pub fn try_again_later() -> String {
    "Something went wrong. Please try again later.".to_string()
}

// ============================================================================
// Admin
// ============================================================================

/// Reply to a non-admin issuing an admin command.
#[must_use]
pub fn forbidden() -> String {
    "This command is only available to administrators.".to_string()
}

/// Account status after an admin change.
#[must_use]
pub fn admin_status(user: impl std::fmt::Display, status: &AccountStatus) -> String {
    let until = status
        .expires_at
        .map_or_else(|| "-".to_string(), date);
    format!(
        "User <code>{user}</code>: {} until {until}",
        tier_name(status.tier)
    )
}

/// `/inspect`.
#[must_use]
pub fn report(report: &UserReport) -> String {
    let mut text = format!(
        "{}\n<b>Messages today:</b> {}\n",
        admin_status(report.today.user_id, &report.status),
        report.today.count
    );
    match &report.account {
        Some(account) => {
            let _ = writeln!(text, "Account created {}", date(account.created_at));
        }
        None => text.push_str("No stored account\n"),
    }
    text.push('\n');
    text.push_str(&history(&report.payments));
    text
}

/// `/users`.
#[must_use]
pub fn users(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "No users yet.".to_string();
    }

    let mut text = format!("<b>Users</b> ({})\n", users.len());
    for (n, user) in users.iter().enumerate() {
        let _ = write!(text, "\n{}. {}", n + 1, admin_status(user.user_id, &user.status));
        if user.status.expires_at.is_some() {
            let _ = write!(text, " ({} days)", user.status.days_left);
        }
        let _ = write!(text, ", {} today", user.used_today);
    }
    text
}

/// `/payment`.
#[must_use]
pub fn admin_payment(payment: &Payment) -> String {
    format!(
        "<code>{}</code>\nexternal: {}\nuser: <code>{}</code>\nplan: {}\namount: {}\n\
         status: {}\nmode: {:?}\ncreated: {}\nupdated: {}",
        payment.local_id,
        payment.external_id.as_deref().map_or_else(|| "-".to_string(), escape_html),
        payment.user_id,
        payment.plan_id,
        payment.amount_display(),
        payment.status,
        payment.mode,
        payment.created_at.to_rfc3339(),
        payment.updated_at.to_rfc3339()
    )
}

/// Result of an admin-driven poll or completion.
#[must_use]
pub fn admin_outcome(outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::Succeeded { activated: true } => "Activated.".to_string(),
        PollOutcome::Succeeded { activated: false } => "Already activated.".to_string(),
        PollOutcome::Open { status } => format!("Still open ({status})."),
        PollOutcome::Closed { status } => format!("Closed ({status})."),
        PollOutcome::NotFound => "Payment not found.".to_string(),
        PollOutcome::Error { reason } => format!("Check failed: {}", escape_html(reason)),
    }
}

/// `/stats`.
#[must_use]
pub fn stats(stats: &AdminStats) -> String {
    format!(
        "<b>Accounts:</b> {}\nfree {} / trial {} / premium {}\n<b>Open payments:</b> {}\n\
         <b>Daily cap:</b> {}",
        stats.tiers.total(),
        stats.tiers.free,
        stats.tiers.trial,
        stats.tiers.premium,
        stats.open_payments,
        stats.daily_cap
    )
}
