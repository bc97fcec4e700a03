//! QUAD frame format.
//!
//! Every frame on the socket is pipe-delimited text terminated by a single
//! NUL byte: `action|arg|arg|...\0`. Value-carrying frames group their
//! arguments in triples of `connection id, value, flags`.

use std::fmt;

use crate::error::Error;

/// Known action codes.
pub mod action {
    /// Decoded from a frame whose action token is not an integer.
    pub const NONE: i32 = 0;
    /// Unsolicited value change, or a value write from the client.
    pub const VALUE_PUSH: i32 = 1;
    /// Bulk value listing keyed by connection id.
    pub const VALUE_BULK: i32 = 2;
    /// Client identifies itself with its username.
    pub const IDENTIFY: i32 = 90;
    /// Server sends the login salt.
    pub const SALT: i32 = 91;
    /// Client answers the salt with the salted hash.
    pub const AUTH_RESPONSE: i32 = 92;
    /// Server accepts the login and hands out the session token.
    pub const LOGIN_OK: i32 = 93;
    /// Client asks for every current value.
    pub const REQUEST_ALL_VALUES: i32 = 94;
    /// Server asks the client to identify.
    pub const WHO_ARE_YOU: i32 = 100;
}

/// Bootstrap request that opens the QUAD session on the socket.
pub const LOGIN_REQUEST: &str = "GET /QUAD/LOGIN \r\n\r\n";

const MIN_TOKENS: usize = 2;

// ── Incoming ─────────────────────────────────────────────────────────

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub action: i32,
    args: Vec<String>,
}

/// One `(connection id, value, flags)` triple of a value frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<'a> {
    pub connection_id: &'a str,
    pub value: &'a str,
    pub flags: &'a str,
}

impl Frame {
    pub fn new(action: i32, args: Vec<String>) -> Self {
        Self { action, args }
    }

    /// Decode the text of one frame (terminator already stripped).
    ///
    /// Fewer than two tokens is a [`Error::MalformedFrame`]. A non-numeric
    /// action decodes as [`action::NONE`] with no arguments so callers can
    /// skip it without tearing down the session.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let text = text.trim_matches('\0');
        let tokens: Vec<&str> = text.split('|').collect();
        if tokens.len() < MIN_TOKENS {
            return Err(Error::MalformedFrame { raw: text.to_owned() });
        }

        let Ok(action) = tokens[0].trim().parse::<i32>() else {
            return Ok(Self::new(action::NONE, Vec::new()));
        };

        let args = tokens[1..].iter().map(|t| (*t).to_owned()).collect();
        Ok(Self::new(action, args))
    }

    /// Raw argument tokens following the action code.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// First argument; carries the salt and token during login.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Complete argument triples. A trailing partial group is dropped.
    pub fn messages(&self) -> impl Iterator<Item = Message<'_>> {
        self.args.chunks_exact(3).map(|chunk| Message {
            connection_id: &chunk[0],
            value: &chunk[1],
            flags: &chunk[2],
        })
    }

    pub fn message_count(&self) -> usize {
        self.args.len() / 3
    }
}

// ── Outgoing ─────────────────────────────────────────────────────────

/// A command the client writes to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Opens the QUAD session.
    Login,
    Identify { username: String },
    AuthResponse { hash: String },
    SetValue { connection_id: String, value: String },
    RequestAllValues,
    /// Legacy single-device poll.
    PollDevice { device_id: String },
    /// Pre-encoded frame body, passed through untouched.
    Raw(String),
}

impl Command {
    /// Encode the frame body. The NUL terminator is added by the codec.
    pub fn encode(&self) -> String {
        match self {
            Self::Login => LOGIN_REQUEST.to_owned(),
            Self::Identify { username } => format!("{}|{username}|", action::IDENTIFY),
            Self::AuthResponse { hash } => format!("{}|{hash}|", action::AUTH_RESPONSE),
            Self::SetValue {
                connection_id,
                value,
            } => format!("{}|{connection_id}|{value}", action::VALUE_PUSH),
            Self::RequestAllValues => format!("{}||", action::REQUEST_ALL_VALUES),
            Self::PollDevice { device_id } => format!("{}|{device_id}|0", action::VALUE_BULK),
            Self::Raw(body) => body.clone(),
        }
    }

    /// Short name for logging; never includes credentials.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Identify { .. } => "identify",
            Self::AuthResponse { .. } => "auth-response",
            Self::SetValue { .. } => "set-value",
            Self::RequestAllValues => "request-all-values",
            Self::PollDevice { .. } => "poll-device",
            Self::Raw(_) => "raw",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
