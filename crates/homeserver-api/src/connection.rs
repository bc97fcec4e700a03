//! QUAD socket session.
//!
//! A [`Connection`] owns one TCP stream split into a framed read half and a
//! framed write half, each behind its own async mutex. Holding the read lock
//! makes a caller the only reader on the socket; holding the write lock
//! keeps a frame from being interleaved with another writer's.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

use crate::auth::salted_hash;
use crate::error::Error;
use crate::protocol::{Command, Frame, action};

const TERMINATOR: &[u8] = b"\0";

/// Upper bound on a single frame; a bulk listing of a large project stays
/// well below this.
const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

type Reader = FramedRead<OwnedReadHalf, AnyDelimiterCodec>;
type Writer = FramedWrite<OwnedWriteHalf, AnyDelimiterCodec>;

/// Result of a completed login handshake.
#[derive(Debug, Clone, Default)]
pub struct LoginOutcome {
    /// Session token, used to authorize the project download.
    pub token: String,
    /// Values delivered with the login (action `2`), keyed by connection id.
    pub initial_values: HashMap<String, String>,
}

/// An open QUAD socket.
pub struct Connection {
    reader: Mutex<Reader>,
    writer: Mutex<Writer>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a TCP connection to `host:port`, bounded by `timeout`.
    pub async fn open(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        debug!(host, port, "opening QUAD socket");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Timeout {
                operation: "connect",
                timeout_secs: timeout.as_secs(),
            })??;
        stream.set_nodelay(true)?;

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Mutex::new(FramedRead::new(read_half, codec())),
            writer: Mutex::new(FramedWrite::new(write_half, codec())),
        }
    }

    /// Write one command and flush it.
    pub async fn send(&self, command: &Command) -> Result<(), Error> {
        trace!(command = %command, "sending frame");
        let body = command.encode();
        let mut writer = self.writer.lock().await;
        writer.send(body).await?;
        Ok(())
    }

    /// Read the next non-empty frame.
    ///
    /// A [`Error::MalformedFrame`] leaves the stream usable; errors for which
    /// [`Error::is_fatal`] holds mean the socket is gone.
    pub async fn read_frame(&self) -> Result<Frame, Error> {
        let mut reader = self.reader.lock().await;
        loop {
            let chunk = match reader.next().await {
                Some(chunk) => chunk?,
                None => return Err(Error::ConnectionClosed),
            };
            if chunk.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(&chunk);
            trace!(frame = %text, "received frame");
            return Frame::decode(&text);
        }
    }

    /// Flush and shut down the write half. The read half sees EOF once the
    /// server closes its side.
    pub async fn close(&self) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        SinkExt::<String>::close(&mut *writer).await?;
        Ok(())
    }

    /// Run the challenge-response login.
    ///
    /// Sends the login request, identifies on `100`, answers the salt on
    /// `91` and finishes on `93`. Bulk values that arrive meanwhile are
    /// returned in [`LoginOutcome::initial_values`].
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, Error> {
        self.send(&Command::Login).await?;

        let mut initial_values = HashMap::new();
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "skipping frame during login");
                    continue;
                }
            };

            match frame.action {
                action::WHO_ARE_YOU => {
                    debug!("server requested identification");
                    self.send(&Command::Identify {
                        username: username.to_owned(),
                    })
                    .await?;
                }
                action::SALT => {
                    let salt = frame.first_arg().unwrap_or_default();
                    debug!("received login salt");
                    let hash = salted_hash(username, password.expose_secret(), salt);
                    self.send(&Command::AuthResponse { hash }).await?;
                }
                action::LOGIN_OK => {
                    let token = frame.first_arg().unwrap_or_default();
                    if token.is_empty() {
                        return Err(Error::LoginFailed {
                            message: "server accepted login without a session token".into(),
                        });
                    }
                    debug!(
                        initial_values = initial_values.len(),
                        "login accepted"
                    );
                    return Ok(LoginOutcome {
                        token: token.to_owned(),
                        initial_values,
                    });
                }
                action::VALUE_BULK => {
                    for message in frame.messages() {
                        initial_values
                            .insert(message.connection_id.to_owned(), message.value.to_owned());
                    }
                }
                other => warn!(action = other, "unhandled action during login"),
            }
        }
    }
}

fn codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(TERMINATOR.to_vec(), TERMINATOR.to_vec(), MAX_FRAME_LEN)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::from_stream(client), server)
    }

    #[tokio::test]
    async fn send_appends_terminator() {
        let (conn, mut server) = pair().await;
        conn.send(&Command::RequestAllValues).await.unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"94||\0");
    }

    #[tokio::test]
    async fn read_skips_empty_frames() {
        let (conn, mut server) = pair().await;
        server.write_all(b"\0\x001|C1|5|0\0").await.unwrap();

        let frame = conn.read_frame().await.unwrap();
        assert_eq!(frame.action, action::VALUE_PUSH);
        assert_eq!(frame.message_count(), 1);
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_stream() {
        let (conn, mut server) = pair().await;
        server.write_all(b"garbage\x002|C1|1|0\0").await.unwrap();

        assert!(matches!(
            conn.read_frame().await,
            Err(Error::MalformedFrame { .. })
        ));
        let frame = conn.read_frame().await.unwrap();
        assert_eq!(frame.action, action::VALUE_BULK);
    }

    #[tokio::test]
    async fn eof_is_connection_closed() {
        let (conn, server) = pair().await;
        drop(server);
        assert!(matches!(
            conn.read_frame().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn open_times_out_or_fails_fast_on_unroutable_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::open("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
