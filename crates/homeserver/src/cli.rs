//! Clap derive structures for the `homeserver` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

use homeserver_core::DeviceKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// homeserver -- talk to a HomeServer over its QUAD protocol
#[derive(Debug, Parser)]
#[command(
    name = "homeserver",
    version,
    about = "Inspect and control HomeServer devices from the command line",
    long_about = "Logs in to a HomeServer, discovers its device project and reads or\n\
        writes device slot values over the persistent QUAD socket.",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "HOMESERVER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server host (overrides profile)
    #[arg(long, short = 'H', env = "HOMESERVER_HOST", global = true)]
    pub host: Option<String>,

    /// QUAD socket port (overrides profile)
    #[arg(long, env = "HOMESERVER_PORT", global = true)]
    pub port: Option<u16>,

    /// Port serving the project file, if not the socket port
    #[arg(long, env = "HOMESERVER_HTTP_PORT", global = true)]
    pub http_port: Option<u16>,

    /// Login name (overrides profile)
    #[arg(long, short = 'u', env = "HOMESERVER_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HOMESERVER_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Connect timeout in seconds (overrides profile)
    #[arg(long, env = "HOMESERVER_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and inspect discovered devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Write a value to a device slot
    Set(SetArgs),

    /// Ask the server for the values of one device (legacy poll)
    Poll {
        /// Device ID
        device: String,
    },

    /// Stream slot value changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send a raw, pre-encoded frame
    Raw {
        /// Frame body without the trailing NUL, e.g. "1|12345|1"
        frame: String,
    },

    /// Download the project again and report the device count
    Refresh,

    /// Inspect and edit configuration
    Config(ConfigArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List discovered devices
    #[command(alias = "ls")]
    List {
        /// Only devices of this kind
        #[arg(long, short = 'k', value_parser = parse_kind)]
        kind: Option<DeviceKind>,

        /// Milliseconds to wait for current values after connecting
        #[arg(long, default_value = "500")]
        wait_ms: u64,
    },

    /// Show one device with its slots
    Get {
        /// Device ID
        device: String,

        /// Milliseconds to wait for current values after connecting
        #[arg(long, default_value = "500")]
        wait_ms: u64,
    },
}

fn parse_kind(raw: &str) -> Result<DeviceKind, String> {
    raw.parse::<DeviceKind>()
        .map_err(|_| format!("unknown device kind '{raw}' (light, dimmer, switch, cover, climate)"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SET / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device ID
    pub device: String,

    /// Logical slot name, e.g. "switch" or "brightness"
    pub slot: String,

    /// Value to write
    pub value: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only updates of this device
    #[arg(long, short = 'd')]
    pub device: Option<String>,

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
    /// Print the config file path
    Path,

    /// Show the loaded configuration (passwords redacted)
    Show,

    /// Show the effective device template table
    Templates,

    /// Set a key on the active profile
    Set {
        /// host, port, http_port, username, password_env or connect_timeout
        key: String,
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's password in the system keyring
    SetPassword {
        /// Password to store (read from HOMESERVER_PASSWORD if omitted)
        #[arg(long, env = "HOMESERVER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}
