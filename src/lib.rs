//! Fleetcast: Broadcast HTTP commands to groups of servers.

// Serde helper module.
mod serde;
// Command line arguments and configuration.
pub mod config;
// How to parse and represent server groups.
pub mod group;
// HTTP requests and their outcomes.
pub mod transport;
// Paced concurrent fan-out.
pub mod dispatch;
// Bulk provisioning from a users file.
pub mod bulk;
// Operator-facing output.
pub mod report;
// Validation and orchestration of one run.
pub mod run;
// Logging setup.
pub mod logger;
// Error handling.
pub mod error;

pub use bulk::{plan_rounds, provision_all, read_users, BulkMode, BulkRound, CommandTemplate};
pub use config::{resolve_pacing, Cli, FleetConfig, DEFAULT_PACING};
pub use dispatch::{Dispatcher, RoundReport, ServerResult};
pub use error::FleetError;
pub use group::{Server, ServerGroup};
pub use report::{ConsoleReporter, Reporter};
pub use run::{execute, Plan, RunReport, Work};
pub use transport::{DispatchOutcome, HttpTransport, Transport, TransportOptions};
