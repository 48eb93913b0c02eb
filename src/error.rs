use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Both --config and --group are required")]
    MissingArguments,
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigMalformed {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Group {0} not found in config file")]
    GroupNotFound(String),
    #[error("Failed to read users file {path:?}: {source}")]
    UsersFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No users file given with --file or `users_file` in the config")]
    MissingUsersFile,
    #[error("Command is not specified")]
    MissingCommand,
    #[error("Bulk mode needs exactly one of --add or --remove")]
    AmbiguousBulkMode,
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
    #[error("Invalid command template: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("Failed to render command template: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}
