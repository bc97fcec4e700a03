// ── Core error types ──
//
// User-facing errors from homeserver-core. Consumers never see raw socket
// or XML failures directly: the `From<homeserver_api::Error>` impl
// translates wire-level errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to HomeServer at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("HomeServer disconnected")]
    Disconnected,

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Connection attempt cancelled")]
    Cancelled,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device discovery failed: {message}")]
    Discovery { message: String },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device {device_id} has no slot named {slot}")]
    SlotNotFound { device_id: String, slot: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether a connect attempt that failed with this error may be
    /// retried. Configuration mistakes and cancellation never are.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config { .. } | Self::Cancelled)
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<homeserver_api::Error> for CoreError {
    fn from(err: homeserver_api::Error) -> Self {
        use homeserver_api::Error as Api;

        match err {
            Api::Io(e) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: e.to_string(),
            },
            Api::ConnectionClosed => CoreError::Disconnected,
            Api::Codec(message) => CoreError::Protocol { message },
            Api::Timeout {
                operation,
                timeout_secs,
            } => CoreError::Timeout {
                operation: operation.to_owned(),
                timeout_secs,
            },
            Api::MalformedFrame { raw } => CoreError::Protocol {
                message: format!("malformed frame {raw:?}"),
            },
            Api::LoginFailed { message } => CoreError::AuthenticationFailed { message },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        operation: "project download".into(),
                        timeout_secs: 0,
                    }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        address: e.url().map(ToString::to_string).unwrap_or_default(),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Discovery {
                        message: e.to_string(),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Topology { message } => CoreError::Discovery { message },
        }
    }
}
