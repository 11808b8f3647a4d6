//! Command dispatch: bridges CLI args -> connection operations -> output formatting.

pub mod config_cmd;
pub mod info;
pub mod watch;

use jmxrest_core::ManagementConnection;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    connection: &ManagementConnection,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::server_info(connection, global),
        Command::Count => info::mbean_count(connection, global).await,
        Command::Domains => info::domains(connection, global).await,
        Command::Get { path } => info::get(connection, &path, global).await,
        Command::Watch(args) => watch::handle(connection, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a connection".into(),
        )),
    }
}
