use thiserror::Error;

/// Top-level error type for the `homeserver-api` crate.
///
/// Covers every failure mode of the wire layer: the QUAD socket session,
/// the login handshake, and the HTTP topology download.
/// `homeserver-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Socket ──────────────────────────────────────────────────────
    /// I/O error on the session socket (refused, reset, broken pipe).
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the socket (read returned no data).
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Frame codec failure while splitting the NUL-delimited stream.
    #[error("frame codec error: {0}")]
    Codec(String),

    /// Operation did not complete in time.
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },

    // ── Protocol ────────────────────────────────────────────────────
    /// A frame with too few tokens to carry an action and a payload.
    #[error("malformed frame: {raw:?}")]
    MalformedFrame { raw: String },

    /// The login handshake could not be completed.
    #[error("login failed: {message}")]
    LoginFailed { message: String },

    // ── Topology (HTTP) ─────────────────────────────────────────────
    /// HTTP transport error while fetching the project file.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The project XML could not be parsed.
    #[error("invalid project topology: {message}")]
    Topology { message: String },
}

impl Error {
    /// Returns `true` if the socket is unusable and the session must be
    /// re-established before further reads can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed | Self::Codec(_))
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::ConnectionClosed
            | Self::Timeout { .. }
            | Self::MalformedFrame { .. }
            | Self::LoginFailed { .. } => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Codec(_) | Self::InvalidUrl(_) | Self::Topology { .. } => false,
        }
    }
}

impl From<tokio_util::codec::AnyDelimiterCodecError> for Error {
    fn from(err: tokio_util::codec::AnyDelimiterCodecError) -> Self {
        match err {
            tokio_util::codec::AnyDelimiterCodecError::Io(e) => Self::Io(e),
            other @ tokio_util::codec::AnyDelimiterCodecError::MaxChunkLengthExceeded => {
                Self::Codec(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_socket_is_fatal_and_transient() {
        let err = Error::ConnectionClosed;
        assert!(err.is_fatal());
        assert!(err.is_transient());
    }

    #[test]
    fn malformed_frame_is_recoverable() {
        let err = Error::MalformedFrame { raw: "7".into() };
        assert!(!err.is_fatal());
    }

    #[test]
    fn topology_errors_are_not_retried() {
        let err = Error::Topology {
            message: "unexpected end of stream".into(),
        };
        assert!(!err.is_transient());
    }
}
