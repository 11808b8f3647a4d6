//! Clap derive structures for the `jmxrest` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// jmxrest -- inspect JMX REST connector endpoints from the command line
#[derive(Debug, Parser)]
#[command(
    name = "jmxrest",
    version,
    about = "Query and watch JMX REST connector endpoints",
    long_about = "Connects to a server's /IBMJMXConnectorREST endpoint over HTTPS,\n\
        reports server information and streams MBean notifications.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Endpoint profile to use
    #[arg(long, short = 'p', env = "JMXREST_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server host (overrides profile)
    #[arg(long, short = 'H', env = "JMXREST_HOST", global = true)]
    pub host: Option<String>,

    /// Connector HTTPS port (overrides profile)
    #[arg(long, short = 'P', env = "JMXREST_PORT", global = true)]
    pub port: Option<u16>,

    /// Username for basic auth
    #[arg(long, short = 'u', env = "JMXREST_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for basic auth
    #[arg(long, env = "JMXREST_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Trust store with the server's CA certificates
    #[arg(long, env = "JMXREST_TRUST_STORE", global = true)]
    pub trust_store: Option<PathBuf>,

    /// Trust store password
    #[arg(long, env = "JMXREST_TRUST_STORE_PASSWORD", global = true, hide_env_values = true)]
    pub trust_store_password: Option<String>,

    /// Trust store encoding
    #[arg(long, global = true)]
    pub trust_store_type: Option<StoreType>,

    /// Skip host name verification of the server certificate
    #[arg(long, short = 'k', global = true)]
    pub disable_hostname_verification: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "JMXREST_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Extra connection option (repeatable), e.g. -O notification-fetch-interval=500
    #[arg(long = "option", short = 'O', value_name = "KEY=VALUE", global = true)]
    pub options: Vec<String>,

    /// Talk plain HTTP instead of HTTPS (local test rigs only)
    #[arg(long, global = true, hide = true)]
    pub insecure_http: bool,

    /// Output format
    #[arg(long, short = 'o', env = "JMXREST_OUTPUT", default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StoreType {
    Pkcs12,
    Pem,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the connector's server information
    Info,

    /// Print the number of registered MBeans
    Count,

    /// List MBean domains
    Domains,

    /// GET a raw connector resource as JSON
    Get {
        /// Path relative to the connector root, e.g. /IBMJMXConnectorREST/mbeans
        path: String,
    },

    /// Stream notifications until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only notifications emitted by this MBean (object name)
    #[arg(long, short = 's')]
    pub source: Option<String>,

    /// Only notification types starting with this prefix (repeatable)
    #[arg(long = "type", short = 't', value_name = "PREFIX")]
    pub types: Vec<String>,

    /// Only attribute-change notifications for this attribute (repeatable)
    #[arg(long = "attribute", short = 'a', value_name = "NAME")]
    pub attributes: Vec<String>,

    /// Stop after this many notifications
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Add or replace a profile
    Add {
        /// Profile name
        name: String,

        /// Server host
        #[arg(long)]
        host: String,

        /// Connector HTTPS port
        #[arg(long, default_value = "9443")]
        port: u16,

        /// Username for basic auth (omit for advanced mode)
        #[arg(long)]
        username: Option<String>,

        /// Trust store path
        #[arg(long)]
        trust_store: Option<PathBuf>,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,

        /// Store the trust store password instead of the login password
        #[arg(long)]
        trust_store: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
