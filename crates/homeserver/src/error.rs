//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use homeserver_config::ConfigError;
use homeserver_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to HomeServer at {address}")]
    #[diagnostic(
        code(homeserver::connection_failed),
        help(
            "Check that the HomeServer is running and reachable.\n\
             Address: {address}\n\
             Try: homeserver --host <host> --port <port> devices list"
        )
    )]
    ConnectionFailed {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Lost the connection to the HomeServer")]
    #[diagnostic(code(homeserver::disconnected))]
    Disconnected,

    #[error("The server could not process '{command}'")]
    #[diagnostic(
        code(homeserver::command_failed),
        help("Run with -v to see why the frame was not sent.")
    )]
    CommandFailed { command: String },

    #[error("Protocol error: {message}")]
    #[diagnostic(code(homeserver::protocol))]
    Protocol { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(homeserver::auth_failed),
        help(
            "Verify the username and password.\n\
             Server said: {message}\n\
             Store a password with: homeserver config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(homeserver::no_credentials),
        help(
            "Set username in the profile or HOMESERVER_USERNAME, and a password\n\
             via HOMESERVER_PASSWORD or: homeserver config set-password"
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(homeserver::not_found),
        help("Run: homeserver {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Device discovery failed: {message}")]
    #[diagnostic(
        code(homeserver::discovery),
        help("The project file could not be downloaded or parsed. Run with -vv for details.")
    )]
    Discovery { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(homeserver::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(homeserver::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(homeserver::no_config),
        help(
            "Pass --host and --username, or create a profile.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(homeserver::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(
        code(homeserver::timeout),
        help("Increase the timeout with --timeout or check the server's responsiveness.")
    )]
    Timeout { operation: String, seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not serialize output: {0}")]
    #[diagnostic(code(homeserver::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => CliError::ConnectionFailed {
                address,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Disconnected | CoreError::NotLoggedIn | CoreError::Cancelled => {
                CliError::Disconnected
            }
            CoreError::Timeout {
                operation,
                timeout_secs,
            } => CliError::Timeout {
                operation,
                seconds: timeout_secs,
            },
            CoreError::Discovery { message } => CliError::Discovery { message },
            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device_id,
                list_command: "devices list".into(),
            },
            CoreError::SlotNotFound { device_id, slot } => CliError::NotFound {
                resource_type: "slot".into(),
                identifier: slot,
                list_command: format!("devices get {device_id}"),
            },
            CoreError::Protocol { message } => CliError::Protocol { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
