//! Chat command and callback parsing.

use chrono::NaiveDate;

use chatgate_core::{parse_day, parse_days, GateError, UserId};

/// What an incoming message or button press asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`.
    Start,
    /// `/menu` or the menu button.
    Menu,
    /// `/status`: tier, expiry and today's usage.
    Status,
    /// `/plans`: the plan catalog.
    Plans,
    /// `/help`, and any unrecognized slash command.
    Help,
    /// `/history`: recent payments.
    History,
    /// `/buy <plan>`: create a payment.
    Buy(String),
    /// `/check <payment id>`: poll a payment.
    Check(String),
    /// An operator command.
    Admin(AdminCommand),
    /// A malformed command; the string is the reply.
    Invalid(String),
    /// Anything else: a message for the language model.
    Chat(String),
}

impl Command {
    /// Whether handling this command leaves the quota untouched.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        !matches!(self, Self::Chat(_))
    }
}

/// Operator commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `/grant <user> <days>`.
    Grant {
        /// Target user.
        user: UserId,
        /// Premium days from now.
        days: u32,
    },
    /// `/revoke <user>`.
    Revoke {
        /// Target user.
        user: UserId,
    },
    /// `/reset_counter <user> [YYYY-MM-DD]`.
    ResetCounter {
        /// Target user.
        user: UserId,
        /// Day to reset; today when absent.
        day: Option<NaiveDate>,
    },
    /// `/inspect <user>`.
    Inspect {
        /// Target user.
        user: UserId,
    },
    /// `/payment <id>`.
    Payment {
        /// Local or processor id.
        id: String,
    },
    /// `/complete <id>`.
    Complete {
        /// Local or processor id.
        id: String,
    },
    /// `/users`.
    Users,
    /// `/stats`.
    Stats,
}

/// Parse a text message.
#[must_use]
pub fn parse_message(text: &str) -> Command {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Command::Chat(text.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match name.as_str() {
        "start" => Command::Start,
        "menu" => Command::Menu,
        "status" => Command::Status,
        "plans" => Command::Plans,
        "history" => Command::History,
        "buy" => args
            .first()
            .map_or(Command::Plans, |plan| Command::Buy((*plan).to_string())),
        "check" => args.first().map_or_else(
            || Command::Invalid("Usage: /check &lt;payment id&gt;".into()),
            |id| Command::Check((*id).to_string()),
        ),
        "grant" | "revoke" | "reset_counter" | "inspect" | "payment" | "complete" | "users"
        | "stats" => {
            match parse_admin(&name, &args) {
                Ok(command) => Command::Admin(command),
                Err(reply) => Command::Invalid(reply),
            }
        }
        _ => Command::Help,
    }
}

/// Parse inline button data.
#[must_use]
pub fn parse_callback(data: &str) -> Command {
    match data.split_once(':') {
        Some(("buy", plan)) if !plan.is_empty() => Command::Buy(plan.to_string()),
        Some(("check", id)) if !id.is_empty() => Command::Check(id.to_string()),
        _ => match data {
            "status" => Command::Status,
            "plans" => Command::Plans,
            "history" => Command::History,
            "help" => Command::Help,
            _ => Command::Menu,
        },
    }
}

fn parse_admin(name: &str, args: &[&str]) -> Result<AdminCommand, String> {
    let usage = match name {
        "grant" => "/grant &lt;user id&gt; &lt;days&gt;",
        "revoke" => "/revoke &lt;user id&gt;",
        "reset_counter" => "/reset_counter &lt;user id&gt; [YYYY-MM-DD]",
        "inspect" => "/inspect &lt;user id&gt;",
        "payment" => "/payment &lt;payment id&gt;",
        "complete" => "/complete &lt;payment id&gt;",
        "users" => "/users",
        _ => "/stats",
    };
    let invalid = |e: GateError| format!("{e}\nUsage: {usage}");

    let command = match (name, args) {
        ("grant", [user, days]) => AdminCommand::Grant {
            user: parse_user(user).map_err(invalid)?,
            days: parse_days(days).map_err(invalid)?,
        },
        ("revoke", [user]) => AdminCommand::Revoke {
            user: parse_user(user).map_err(invalid)?,
        },
        ("reset_counter", [user]) => AdminCommand::ResetCounter {
            user: parse_user(user).map_err(invalid)?,
            day: None,
        },
        ("reset_counter", [user, day]) => AdminCommand::ResetCounter {
            user: parse_user(user).map_err(invalid)?,
            day: Some(parse_day(day).map_err(invalid)?),
        },
        ("inspect", [user]) => AdminCommand::Inspect {
            user: parse_user(user).map_err(invalid)?,
        },
        ("payment", [id]) => AdminCommand::Payment {
            id: (*id).to_string(),
        },
        ("complete", [id]) => AdminCommand::Complete {
            id: (*id).to_string(),
        },
        ("users", []) => AdminCommand::Users,
        ("stats", []) => AdminCommand::Stats,
        _ => return Err(format!("Usage: {usage}")),
    };

    Ok(command)
}

fn parse_user(raw: &str) -> Result<UserId, GateError> {
    Ok(raw.parse::<UserId>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            parse_message("  how are you?  "),
            Command::Chat("how are you?".into())
        );
        assert!(!parse_message("hello").is_privileged());
    }

    #[test]
    fn menu_commands_are_privileged() {
        for text in ["/start", "/menu", "/status", "/plans", "/help", "/history"] {
            assert!(parse_message(text).is_privileged(), "{text}");
        }
        assert_eq!(parse_message("/status@chatgate_bot"), Command::Status);
        assert_eq!(parse_message("/whatever"), Command::Help);
    }

    #[test]
    fn buy_and_check_take_arguments() {
        assert_eq!(
            parse_message("/buy premium_month"),
            Command::Buy("premium_month".into())
        );
        assert_eq!(parse_message("/buy"), Command::Plans);
        assert_eq!(parse_message("/check 2c1f"), Command::Check("2c1f".into()));
        assert!(matches!(parse_message("/check"), Command::Invalid(_)));
    }

    #[test]
    fn callbacks() {
        assert_eq!(
            parse_callback("buy:premium_year"),
            Command::Buy("premium_year".into())
        );
        assert_eq!(parse_callback("check:abc"), Command::Check("abc".into()));
        assert_eq!(parse_callback("status"), Command::Status);
        assert_eq!(parse_callback("buy:"), Command::Menu);
        assert_eq!(parse_callback("garbage"), Command::Menu);
    }

    #[test]
    fn admin_commands_parse() {
        assert_eq!(
            parse_message("/grant 123 30"),
            Command::Admin(AdminCommand::Grant {
                user: UserId::new(123),
                days: 30
            })
        );
        assert_eq!(
            parse_message("/reset_counter 5 2025-03-01"),
            Command::Admin(AdminCommand::ResetCounter {
                user: UserId::new(5),
                day: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
            })
        );
        assert_eq!(parse_message("/stats"), Command::Admin(AdminCommand::Stats));
        assert_eq!(parse_message("/users"), Command::Admin(AdminCommand::Users));
    }

    #[test]
    fn malformed_admin_input_is_rejected() {
        for text in [
            "/grant abc 30",
            "/grant 123 0",
            "/grant 123 36501",
            "/grant 123 4294967295",
            "/grant 123",
            "/revoke",
            "/reset_counter 5 yesterday",
            "/inspect @bob",
        ] {
            assert!(matches!(parse_message(text), Command::Invalid(_)), "{text}");
        }
    }
}
