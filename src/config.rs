//! Configuration for Fleetcast.
//!
//! Holds the clap struct for command line arguments and flags, and the
//! YAML fleet file that maps group names to server base URLs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::FleetError;
use crate::serde::{parse_duration, seconds_or_string};

/// Pacing used when neither the command line nor the config file sets one.
pub const DEFAULT_PACING: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Default)]
#[command(version, author, about)]
pub struct Cli {
    /// Path to the fleet config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Name of the server group to broadcast to
    #[arg(long)]
    pub group: Option<String>,

    /// Command (path and query) to send to every server
    #[arg(long)]
    pub command: Option<String>,

    /// Interval between request launches, e.g. `10`, `500ms`, `2s`
    #[arg(long, value_parser = duration_arg)]
    pub creation_timeout: Option<Duration>,

    /// (Bulk mode) File with one user name per line
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Bulk mode: run the add or remove command once per user in the users file
    #[arg(long)]
    pub mass: bool,

    /// (Bulk mode) Add users to all servers
    #[arg(long)]
    pub add: bool,

    /// (Bulk mode) Remove users from all servers
    #[arg(long)]
    pub remove: bool,

    /// Verify TLS certificates even if the config file says to skip verification
    #[arg(long)]
    pub verify_certs: bool,

    /// Give up on a single server's request after this long
    #[arg(long, value_parser = duration_arg)]
    pub request_timeout: Option<Duration>,

    /// Print debug logs
    #[arg(long, short)]
    pub verbose: bool,

    /// Don't color server names in the output
    #[arg(long)]
    pub no_color: bool,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| FleetError::InvalidDuration(s.to_string()).to_string())
}

/// The fleet file.
#[derive(Debug, Deserialize)]
pub struct FleetConfig {
    /// Group name to ordered server base URLs.
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    /// Default interval between request launches.
    #[serde(default, deserialize_with = "seconds_or_string")]
    pub creation_timeout: Option<Duration>,
    #[serde(default)]
    pub users_file: Option<PathBuf>,
    #[serde(default)]
    pub add_command: Option<String>,
    #[serde(default)]
    pub remove_command: Option<String>,
    /// Accept any certificate the servers present. On unless turned off.
    #[serde(default = "skip_cert_verification_default")]
    pub skip_cert_verification: bool,
    #[serde(default, deserialize_with = "seconds_or_string")]
    pub request_timeout: Option<Duration>,
}

fn skip_cert_verification_default() -> bool {
    true
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, FleetError> {
        let data = std::fs::read_to_string(path).map_err(|source| FleetError::ConfigUnreadable {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&data).map_err(|source| FleetError::ConfigMalformed {
            path: path.to_owned(),
            source,
        })
    }

    pub fn parse(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }
}

/// Explicit override (zero included) wins, then a non-zero configured value,
/// then `DEFAULT_PACING`.
pub fn resolve_pacing(explicit: Option<Duration>, configured: Option<Duration>) -> Duration {
    match (explicit, configured) {
        (Some(pacing), _) => pacing,
        (None, Some(pacing)) if !pacing.is_zero() => pacing,
        _ => DEFAULT_PACING,
    }
}
