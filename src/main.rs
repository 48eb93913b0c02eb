use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tokio::sync::Mutex;

use fleetcast::logger::init_logger;
use fleetcast::{execute, Cli, ConsoleReporter, Dispatcher, FleetError, HttpTransport, Plan};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let plan = match Plan::from_cli(&cli) {
        Ok(plan) => plan,
        Err(FleetError::MissingArguments) => {
            eprintln!("{}", Cli::command().render_usage());
            eprintln!("Example: fleetcast --config fleet.yaml --group testlocal1 --command '/add?user=user_u-2foo'");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let transport = match HttpTransport::new(&plan.transport) {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let reporter = ConsoleReporter::stdout(&plan.group.servers, !cli.no_color);
    let dispatcher = Dispatcher::new(Arc::new(transport), Arc::new(reporter));

    // The first ctrl-c lets the current bulk round finish and skips the rest.
    // The second one exits right away.
    let cancelled = Arc::new(Mutex::new(false));
    let cancelled_handler = Arc::clone(&cancelled);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-c detected. Finishing the current round, press again to abort.");
            *cancelled_handler.lock().await = true;
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let report = execute(&plan, &dispatcher, &cancelled).await;
    std::process::exit(report.exit_code());
}
