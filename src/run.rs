//! Turns command line arguments into a validated plan and runs it.
//!
//! Every fatal check happens in `Plan::from_cli`, before any request is
//! issued: a run either starts its first round with everything resolved, or
//! issues nothing at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::bulk::{plan_rounds, provision_all, read_users, BulkMode, BulkRound, CommandTemplate};
use crate::config::{resolve_pacing, Cli, FleetConfig};
use crate::dispatch::{Dispatcher, RoundReport};
use crate::error::FleetError;
use crate::group::ServerGroup;
use crate::transport::TransportOptions;

#[derive(Debug)]
pub enum Work {
    /// One command to every server.
    Single(String),
    /// One round per user, in users file order.
    Bulk(Vec<BulkRound>),
}

#[derive(Debug)]
pub struct Plan {
    pub group: ServerGroup,
    pub pacing: Duration,
    pub transport: TransportOptions,
    pub work: Work,
}

impl Plan {
    pub fn from_cli(cli: &Cli) -> Result<Self, FleetError> {
        let (config_path, group_name) = match (&cli.config, &cli.group) {
            (Some(config), Some(group)) => (config, group),
            _ => return Err(FleetError::MissingArguments),
        };
        let config = FleetConfig::load(config_path)?;
        let group = ServerGroup::resolve(&config, group_name)?;
        let pacing = resolve_pacing(cli.creation_timeout, config.creation_timeout);
        let transport = TransportOptions {
            skip_cert_verification: config.skip_cert_verification && !cli.verify_certs,
            request_timeout: cli.request_timeout.or(config.request_timeout),
        };

        let work = if cli.mass {
            let mode = BulkMode::from_flags(cli.add, cli.remove)?;
            let template = CommandTemplate::new(mode.template(&config).unwrap_or_default())?;
            let users_file = cli
                .file
                .as_ref()
                .or(config.users_file.as_ref())
                .ok_or(FleetError::MissingUsersFile)?;
            let users = read_users(users_file)?;
            if users.is_empty() {
                tracing::warn!("Users file {:?} is empty, nothing to provision", users_file);
            }
            Work::Bulk(plan_rounds(users, &template)?)
        } else {
            match cli.command.as_deref() {
                Some(command) if !command.is_empty() => Work::Single(command.to_string()),
                _ => return Err(FleetError::MissingCommand),
            }
        };

        tracing::info!(
            "Group '{}' with {} server(s), pacing {:?}",
            group.name,
            group.servers.len(),
            pacing
        );
        Ok(Self {
            group,
            pacing,
            transport,
            work,
        })
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub rounds: Vec<RoundReport>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.rounds.iter().map(RoundReport::failures).sum()
    }

    /// 0 when every request got a response, 2 when any server failed.
    pub fn exit_code(&self) -> i32 {
        if self.failures() == 0 {
            0
        } else {
            2
        }
    }
}

pub async fn execute(plan: &Plan, dispatcher: &Dispatcher, cancelled: &Arc<Mutex<bool>>) -> RunReport {
    let servers = &plan.group.servers;
    let rounds = match &plan.work {
        Work::Single(command) => vec![dispatcher.dispatch(servers, command, plan.pacing).await],
        Work::Bulk(rounds) => provision_all(dispatcher, rounds, servers, plan.pacing, cancelled).await,
    };
    let report = RunReport { rounds };
    if report.failures() > 0 {
        tracing::warn!("{} request(s) failed", report.failures());
    }
    report
}
