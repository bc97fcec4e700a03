// End-to-end session tests against a scripted QUAD server and a mocked
// project download.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homeserver_core::{ConnectionState, CoreError, DeviceKind, Session, SessionConfig};

const PROJECT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
  <devices>
    <device id="1" txt="EG\Kitchen\Ceiling">
      <connect slot="switch" tag="C1"/>
    </device>
    <device id="2" txt="EG\Hall\Spots">
      <connect slot="dim_s" tag="C2"/>
      <connect slot="dim_val" tag="C3"/>
    </device>
    <device id="3" txt="EG\Hall\Sensor">
      <connect slot="slot_lux" tag="C4"/>
    </device>
  </devices>
</project>"#;

const WAIT: Duration = Duration::from_secs(5);

// ── Scripted server ─────────────────────────────────────────────────

struct ServerConn {
    reader: BufReader<TcpStream>,
}

impl ServerConn {
    async fn recv(&mut self) -> String {
        let mut buf = Vec::new();
        let n = timeout(WAIT, self.reader.read_until(0, &mut buf))
            .await
            .expect("client frame in time")
            .unwrap();
        assert!(n > 0, "client closed the socket");
        assert_eq!(buf.pop(), Some(0));
        String::from_utf8(buf).unwrap()
    }

    async fn send(&mut self, frame: &str) {
        let stream = self.reader.get_mut();
        stream.write_all(frame.as_bytes()).await.unwrap();
        stream.write_all(b"\0").await.unwrap();
    }

    /// Serve the login exchange up to and including the token.
    async fn handshake(&mut self, initial_values: &str) {
        assert_eq!(self.recv().await, "GET /QUAD/LOGIN \r\n\r\n");
        self.send("100|").await;
        assert_eq!(self.recv().await, "90|alice|");
        self.send("91|saltvalue|").await;
        assert_eq!(self.recv().await, "92|DEE4D9FF4390E4008C3AEEDBBA6BFBE8|");
        if !initial_values.is_empty() {
            self.send(initial_values).await;
        }
        self.send("93|tok123|").await;
    }
}

async fn accept(listener: &TcpListener) -> ServerConn {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client connects in time")
        .unwrap();
    ServerConn {
        reader: BufReader::new(stream),
    }
}

async fn mock_project() -> MockServer {
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quad/client/client_project.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PROJECT_XML))
        .mount(&http)
        .await;
    http
}

fn config(listener: &TcpListener, http: &MockServer) -> SessionConfig {
    let mut config = SessionConfig::new(
        "127.0.0.1",
        "alice",
        SecretString::from("secret".to_owned()),
    );
    config.port = listener.local_addr().unwrap().port();
    config.http_port = Some(http.address().port());
    config.connect_timeout = Duration::from_secs(2);
    config.login_timeout = Duration::from_secs(5);
    config.retry_delay = Duration::from_millis(50);
    config
}

/// Connect a session and return it with the server side of the socket,
/// positioned after the client's initial `94||`.
async fn connected(listener: &TcpListener, http: &MockServer) -> (Session, ServerConn) {
    let session = Session::new(config(listener, http));

    let client = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(false).await })
    };
    let mut server = accept(listener).await;
    server.handshake("2|C1|1|0").await;
    assert_eq!(server.recv().await, "94||");

    timeout(WAIT, client).await.unwrap().unwrap().unwrap();
    (session, server)
}

async fn wait_for_value(session: &Session, device: &str, slot: &str, expected: &str) {
    timeout(WAIT, async {
        loop {
            if session.slot_value(device, slot).as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("value arrives in time");
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_logs_in_and_discovers_devices() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, _server) = connected(&listener, &http).await;

    assert_eq!(session.state(), ConnectionState::LoggedIn);
    assert_eq!(session.token().as_deref(), Some("tok123"));

    let devices = session.devices(None);
    assert_eq!(devices.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    assert_eq!(devices["2"].kind, DeviceKind::Dimmer);
    assert_eq!(session.devices(Some(DeviceKind::Light)).len(), 1);
    assert_eq!(session.device_name("1").as_deref(), Some("Kitchen Ceiling"));
    assert_eq!(session.slot_id("2", "brightness").as_deref(), Some("C3"));

    // Delivered during login, applied after discovery.
    assert_eq!(session.slot_value("1", "switch").as_deref(), Some("1"));

    let requests = http.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("tok123"));

    session.disconnect().await;
}

#[tokio::test]
async fn test_pushes_update_registry_and_notify() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, mut server) = connected(&listener, &http).await;
    let mut updates = session.subscribe();

    server.send("2|C2|1|0|C3|55|0").await;
    server.send("not a frame").await;
    server.send("1|C3|80|0").await;

    wait_for_value(&session, "2", "brightness", "80").await;
    assert_eq!(session.slot_value("2", "switch").as_deref(), Some("1"));

    let mut seen = Vec::new();
    while let Ok(Ok(update)) = timeout(Duration::from_millis(200), updates.recv()).await {
        seen.push((update.slot.clone(), update.value.clone()));
    }
    assert_eq!(
        seen,
        vec![
            ("switch".to_owned(), "1".to_owned()),
            ("brightness".to_owned(), "55".to_owned()),
            ("brightness".to_owned(), "80".to_owned()),
        ]
    );

    session.disconnect().await;
}

#[tokio::test]
async fn test_write_while_monitor_reads() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, mut server) = connected(&listener, &http).await;
    let mut updates = session.subscribe();

    let pushes: Vec<String> = (0..50).map(|i| (i % 2).to_string()).collect();

    let writer = {
        let session = session.clone();
        tokio::spawn(async move { session.set_slot("2", "brightness", "42").await })
    };
    for value in &pushes {
        server.send(&format!("1|C1|{value}|0")).await;
    }

    assert!(timeout(WAIT, writer).await.unwrap().unwrap());
    assert_eq!(server.recv().await, "1|C3|42");
    assert_eq!(session.slot_value("2", "brightness").as_deref(), Some("42"));

    // Echo of the write, then a marker push to know everything arrived.
    server.send("1|C3|42|0").await;
    server.send("1|C1|7|0").await;

    let mut switch = Vec::new();
    let mut brightness = Vec::new();
    timeout(WAIT, async {
        loop {
            let update = updates.recv().await.unwrap();
            match (update.device_id.as_str(), update.slot.as_str()) {
                ("1", "switch") if update.value == "7" => return,
                ("1", "switch") => switch.push(update.value.clone()),
                ("2", "brightness") => brightness.push(update.value.clone()),
                other => panic!("unexpected update {other:?}"),
            }
        }
    })
    .await
    .expect("marker push arrives in time");

    // Each push notified exactly once; the local write itself did not.
    assert_eq!(switch, pushes);
    assert_eq!(brightness, vec!["42".to_owned()]);
    assert_eq!(session.slot_value("1", "switch").as_deref(), Some("7"));
    assert_eq!(session.slot_value("2", "brightness").as_deref(), Some("42"));

    session.disconnect().await;
}

#[tokio::test]
async fn test_echoed_write_notifies_subscribers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, mut server) = connected(&listener, &http).await;
    let mut updates = session.subscribe();

    assert!(session.set_slot("2", "brightness", "42").await);
    assert_eq!(server.recv().await, "1|C3|42");

    // Same value as the local write, same value as the login snapshot,
    // then a new one.
    server.send("1|C3|42|0").await;
    server.send("1|C1|1|0").await;
    server.send("1|C2|9|0").await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let update = timeout(WAIT, updates.recv())
            .await
            .expect("notification in time")
            .unwrap();
        seen.push(format!("{}/{}={}", update.device_id, update.slot, update.value));
    }
    assert_eq!(seen, vec!["2/brightness=42", "1/switch=1", "2/switch=9"]);

    session.disconnect().await;
}

#[tokio::test]
async fn test_update_rejects_unknown_device_and_missing_login() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;

    let idle = Session::new(config(&listener, &http));
    assert!(!idle.update_device_value("1", "C1", "1").await);
    assert!(!idle.request_all_values().await);

    let (session, _server) = connected(&listener, &http).await;
    assert!(!session.update_device_value("99", "C1", "1").await);
    assert!(!session.set_slot("1", "brightness", "1").await);

    session.disconnect().await;
}

#[tokio::test]
async fn test_double_disconnect_is_harmless() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, mut server) = connected(&listener, &http).await;

    session.disconnect().await;
    session.disconnect().await;

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.token().is_none());
    assert!(session.devices(None).is_empty());
    assert!(session.slot_value("1", "switch").is_none());

    // The server sees the client close its side.
    let mut buf = Vec::new();
    let n = timeout(WAIT, server.reader.read_until(0, &mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_connect_without_retry_surfaces_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let config = config(&listener, &http);
    drop(listener);

    let session = Session::new(config);
    let err = session.connect(false).await.unwrap_err();
    assert!(
        matches!(err, CoreError::ConnectionFailed { .. } | CoreError::Timeout { .. }),
        "got {err:?}"
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_retrying_connect_can_be_cancelled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let config = config(&listener, &http);
    drop(listener);

    let session = Session::new(config);
    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(true).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    session.disconnect().await;

    let result = timeout(WAIT, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(CoreError::Cancelled)), "got {result:?}");
}

#[tokio::test]
async fn test_monitor_reconnects_when_retrying() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let session = Session::new(config(&listener, &http));

    let client = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(true).await })
    };
    let mut server = accept(&listener).await;
    server.handshake("").await;
    assert_eq!(server.recv().await, "94||");
    timeout(WAIT, client).await.unwrap().unwrap().unwrap();

    // Server hangs up; the monitor logs in again on a new socket.
    drop(server);
    let mut server = accept(&listener).await;
    server.handshake("").await;
    assert_eq!(server.recv().await, "94||");

    server.send("2|C3|12|0").await;
    wait_for_value(&session, "2", "brightness", "12").await;
    assert_eq!(session.state(), ConnectionState::LoggedIn);

    session.disconnect().await;
}

#[tokio::test]
async fn test_second_connect_is_a_no_op() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = mock_project().await;
    let (session, _server) = connected(&listener, &http).await;

    timeout(WAIT, session.connect(false)).await.unwrap().unwrap();
    assert_eq!(session.state(), ConnectionState::LoggedIn);

    session.disconnect().await;
}
