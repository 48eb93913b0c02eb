//! Server groups.
//!
//! A group is a named, ordered list of server base URLs. Every request of a
//! fan-out round targets one `Server` and runs in its own tokio task.

use std::fmt;

use colored::*;
use colourado::Color;

use crate::config::FleetConfig;
use crate::error::FleetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// Scheme and host (and port), as written in the config, surrounding
    /// whitespace removed.
    pub base_url: String,
}

impl Server {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().to_string(),
        }
    }

    /// The URL a command is sent to. The command is appended verbatim.
    pub fn command_url(&self, command: &str) -> String {
        format!("{}{}", self.base_url, command)
    }

    /// For pretty-printing the server name.
    /// Surrounds with brackets and colors it with the given color.
    pub fn prettify(&self, color: Color) -> ColoredString {
        let r = (color.red * 255.0) as u8;
        let g = (color.green * 255.0) as u8;
        let b = (color.blue * 255.0) as u8;
        format!("{}", self).truecolor(r, g, b)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.base_url)
    }
}

#[derive(Debug, Clone)]
pub struct ServerGroup {
    pub name: String,
    pub servers: Vec<Server>,
}

impl ServerGroup {
    pub fn resolve(config: &FleetConfig, name: &str) -> Result<Self, FleetError> {
        let urls = config
            .groups
            .get(name)
            .ok_or_else(|| FleetError::GroupNotFound(name.to_string()))?;
        let servers = urls.iter().map(|url| Server::new(url)).collect();
        Ok(Self {
            name: name.to_string(),
            servers,
        })
    }
}
