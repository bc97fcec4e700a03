// ── Runtime session configuration ──
//
// Describes *how* to reach one HomeServer. Carries credentials and
// connection tuning but never touches disk: the binary (or any other
// consumer) builds a `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use crate::model::TemplateTable;

/// Default QUAD/HTTP port of the HomeServer.
pub const DEFAULT_PORT: u16 = 80;

/// Configuration for a session with a single HomeServer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host name or IP address.
    pub host: String,
    /// Port of the QUAD socket.
    pub port: u16,
    /// Port serving the project file; `None` means the socket port.
    pub http_port: Option<u16>,
    pub username: String,
    pub password: SecretString,
    /// Bound on opening the TCP connection.
    pub connect_timeout: Duration,
    /// Bound on the whole login handshake.
    pub login_timeout: Duration,
    /// Timeout of the project download.
    pub http_timeout: Duration,
    /// Pause between reconnect attempts when retrying.
    pub retry_delay: Duration,
    /// Device classification vocabulary.
    pub templates: TemplateTable,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password,
            ..Self::default()
        }
    }

    /// Port the project file is fetched from.
    pub fn effective_http_port(&self) -> u16 {
        self.http_port.unwrap_or(self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            http_port: None,
            username: String::new(),
            password: SecretString::from(String::new()),
            connect_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(3),
            templates: TemplateTable::default(),
        }
    }
}
