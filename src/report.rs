//! Operator-facing output.
//!
//! Every server result becomes exactly one line. Results from one round may
//! arrive in any order, so each line names its server.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use colored::ColoredString;
use colourado::{ColorPalette, PaletteType};

use crate::dispatch::ServerResult;
use crate::group::Server;
use crate::transport::DispatchOutcome;

pub trait Reporter: Send + Sync {
    /// A bulk round is about to fan out `command` for `user`.
    fn round_started(&self, user: &str, command: &str);
    fn server_result(&self, result: &ServerResult);
}

pub struct ConsoleReporter<W> {
    out: Mutex<W>,
    prefixes: HashMap<String, ColoredString>,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout(servers: &[Server], colorize: bool) -> Self {
        Self::new(std::io::stdout(), servers, colorize)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W, servers: &[Server], colorize: bool) -> Self {
        let mut prefixes = HashMap::with_capacity(servers.len());
        if colorize && !servers.is_empty() {
            let colors = ColorPalette::new(servers.len() as u32, PaletteType::Pastel, false).colors;
            for (color, server) in colors.into_iter().zip(servers) {
                prefixes.insert(server.base_url.clone(), server.prettify(color));
            }
        }
        Self {
            out: Mutex::new(out),
            prefixes,
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn prefix(&self, server: &Server) -> String {
        match self.prefixes.get(&server.base_url) {
            Some(colored) => colored.to_string(),
            None => server.to_string(),
        }
    }

    fn write_line(&self, line: &str) {
        // Without the lock, lines from different servers could get mixed.
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::error!("Failed to write result: {}", e);
        }
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn round_started(&self, user: &str, command: &str) {
        self.write_line(&format!("[fleetcast] user '{}': {}", user, command));
    }

    fn server_result(&self, result: &ServerResult) {
        let prefix = self.prefix(&result.server);
        let line = match &result.outcome {
            DispatchOutcome::Success { status, body } => {
                format!("{} {}: {}", prefix, status, body.trim_end())
            }
            DispatchOutcome::TransportError(cause) => {
                format!("{} error sending request: {}", prefix, cause)
            }
            DispatchOutcome::BodyReadError(cause) => {
                format!("{} error reading response body: {}", prefix, cause)
            }
        };
        self.write_line(&line);
    }
}
