//! Bulk provisioning.
//!
//! Replays an add or remove command template once per user in a users
//! file. Each user gets one full fan-out round, and round k+1 never issues
//! a request before every outcome of round k is in.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use handlebars::Handlebars;
use tokio::sync::Mutex;

use crate::config::FleetConfig;
use crate::dispatch::{Dispatcher, RoundReport};
use crate::error::FleetError;
use crate::group::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    Add,
    Remove,
}

impl BulkMode {
    /// Exactly one of the two flags must be set.
    pub fn from_flags(add: bool, remove: bool) -> Result<Self, FleetError> {
        match (add, remove) {
            (true, false) => Ok(Self::Add),
            (false, true) => Ok(Self::Remove),
            _ => Err(FleetError::AmbiguousBulkMode),
        }
    }

    /// The configured template for this mode.
    pub fn template<'a>(&self, config: &'a FleetConfig) -> Option<&'a str> {
        match self {
            Self::Add => config.add_command.as_deref(),
            Self::Remove => config.remove_command.as_deref(),
        }
    }
}

const TEMPLATE_NAME: &str = "command";

/// A command with a hole for the user name.
///
/// A plain template gets the user appended (`/add_user?name=` + `alice`).
/// A template with handlebars placeholders is rendered with `{{user}}` set.
/// No escaping is applied either way.
pub struct CommandTemplate {
    raw: String,
    registry: Option<Handlebars<'static>>,
}

impl CommandTemplate {
    pub fn new(raw: &str) -> Result<Self, FleetError> {
        if raw.trim().is_empty() {
            return Err(FleetError::MissingCommand);
        }
        let registry = if raw.contains("{{") {
            let mut registry = Handlebars::new();
            registry.register_escape_fn(handlebars::no_escape);
            handlebars_misc_helpers::register(&mut registry);
            registry.register_template_string(TEMPLATE_NAME, raw)?;
            Some(registry)
        } else {
            None
        };
        Ok(Self {
            raw: raw.to_string(),
            registry,
        })
    }

    pub fn render(&self, user: &str) -> Result<String, FleetError> {
        match &self.registry {
            Some(registry) => {
                let mut params = HashMap::new();
                params.insert("user", user);
                Ok(registry.render(TEMPLATE_NAME, &params)?)
            }
            None => Ok(format!("{}{}", self.raw, user)),
        }
    }
}

/// Reads one user per non-empty line, in file order.
pub fn read_users(path: &Path) -> Result<Vec<String>, FleetError> {
    let unreadable = |source| FleetError::UsersFileUnreadable {
        path: path.to_owned(),
        source,
    };
    let file = File::open(path).map_err(unreadable)?;
    let mut users = vec![];
    for line in BufReader::new(file).lines() {
        let line = line.map_err(unreadable)?;
        let user = line.trim();
        if !user.is_empty() {
            users.push(user.to_string());
        }
    }
    Ok(users)
}

/// One bulk round: a user and the command rendered for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRound {
    pub user: String,
    pub command: String,
}

/// Renders every round up front so a bad template fails before any request.
pub fn plan_rounds(users: Vec<String>, template: &CommandTemplate) -> Result<Vec<BulkRound>, FleetError> {
    users
        .into_iter()
        .map(|user| {
            let command = template.render(&user)?;
            Ok(BulkRound { user, command })
        })
        .collect()
}

/// Runs the rounds strictly one after another.
///
/// Each round is awaited to completion before the next one starts, so at
/// most one user's fan-out is ever in flight. Once `cancelled` is set, the
/// running round finishes and no further round starts.
pub async fn provision_all(
    dispatcher: &Dispatcher,
    rounds: &[BulkRound],
    servers: &[Server],
    pacing: Duration,
    cancelled: &Arc<Mutex<bool>>,
) -> Vec<RoundReport> {
    let mut reports = Vec::with_capacity(rounds.len());
    for round in rounds {
        if *cancelled.lock().await {
            tracing::warn!(
                "Ctrl-c detected. Skipping the remaining {} user(s).",
                rounds.len() - reports.len()
            );
            break;
        }
        dispatcher.reporter().round_started(&round.user, &round.command);
        let report = dispatcher.dispatch(servers, &round.command, pacing).await;
        tracing::debug!(
            "Round for '{}' done, {} of {} server(s) failed",
            round.user,
            report.failures(),
            report.results.len()
        );
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mode_needs_exactly_one_flag() {
        assert_eq!(BulkMode::from_flags(true, false).unwrap(), BulkMode::Add);
        assert_eq!(BulkMode::from_flags(false, true).unwrap(), BulkMode::Remove);
        assert!(matches!(
            BulkMode::from_flags(true, true),
            Err(FleetError::AmbiguousBulkMode)
        ));
        assert!(matches!(
            BulkMode::from_flags(false, false),
            Err(FleetError::AmbiguousBulkMode)
        ));
    }

    #[test]
    fn test_plain_template_appends_user() {
        let template = CommandTemplate::new("/add_user?name=").unwrap();
        assert_eq!(template.render("alice").unwrap(), "/add_user?name=alice");
        // Operators own the escaping.
        assert_eq!(template.render("a&b").unwrap(), "/add_user?name=a&b");
    }

    #[test]
    fn test_handlebars_template() {
        let template = CommandTemplate::new("/users/{{user}}/enable?by=ops").unwrap();
        assert_eq!(template.render("bob").unwrap(), "/users/bob/enable?by=ops");
        let template = CommandTemplate::new("/add?user={{user}}&x=<1>").unwrap();
        assert_eq!(template.render("a&b").unwrap(), "/add?user=a&b&x=<1>");
        let template = CommandTemplate::new("/add?user={{to_lower_case user}}").unwrap();
        assert_eq!(template.render("ALICE").unwrap(), "/add?user=alice");
    }

    #[test]
    fn test_empty_template_is_missing_command() {
        assert!(matches!(
            CommandTemplate::new("  "),
            Err(FleetError::MissingCommand)
        ));
    }

    #[test]
    fn test_broken_template() {
        assert!(matches!(
            CommandTemplate::new("/add?user={{#if}}"),
            Err(FleetError::Template(_))
        ));
    }

    #[test]
    fn test_read_users_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "alice\n\n  bob \r\n\ncarol").unwrap();
        let users = read_users(file.path()).unwrap();
        assert_eq!(users, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_read_users_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_users(file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_users_missing_file() {
        let err = read_users(Path::new("/nonexistent/users.txt")).unwrap_err();
        assert!(matches!(err, FleetError::UsersFileUnreadable { .. }));
    }

    #[test]
    fn test_plan_rounds_keeps_order() {
        let template = CommandTemplate::new("/remove?user=").unwrap();
        let rounds = plan_rounds(vec!["b".into(), "a".into()], &template).unwrap();
        assert_eq!(
            rounds,
            vec![
                BulkRound {
                    user: "b".into(),
                    command: "/remove?user=b".into()
                },
                BulkRound {
                    user: "a".into(),
                    command: "/remove?user=a".into()
                },
            ]
        );
    }
}
