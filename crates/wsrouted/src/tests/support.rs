//! Shared harness: a daemon on an ephemeral port and a blocking client.

use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tungstenite::handshake::HandshakeError;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{Message, WebSocket};

use wsroute_config::{Config, SocketEndpoint};

use crate::bootstrap::{Daemon, StaticConfigLoader, bootstrap_with};
use crate::builtin::{builtin_endpoints, builtin_services};
use crate::health::StructuredHealthReporter;
use crate::session::{GlobalHooks, ServerOptions, SessionRegistry};
use crate::transport::ListenerHandle;

pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Path the gate refuses.
pub(crate) const FORBIDDEN_PATH: &str = "/forbidden";

pub(crate) type Disconnects = Arc<Mutex<Vec<Option<u16>>>>;

/// A running daemon serving the built-in endpoints.
pub(crate) struct TestServer {
    daemon: Daemon,
    listener: Option<ListenerHandle>,
    addr: SocketAddr,
    disconnects: Disconnects,
}

impl TestServer {
    pub(crate) fn start() -> Self {
        Self::start_with(Config::default())
    }

    pub(crate) fn start_with(config: Config) -> Self {
        let config = Config {
            listen: SocketEndpoint::tcp("127.0.0.1", 0),
            log_filter: String::from("off"),
            ..config
        };
        let sessions = Arc::new(SessionRegistry::new());
        let disconnects: Disconnects = Arc::default();
        let recorded = Arc::clone(&disconnects);
        let hooks = GlobalHooks::new()
            .before_connection(|context| context.path() != FORBIDDEN_PATH)
            .on_disconnected(move |_, status| {
                recorded
                    .lock()
                    .expect("disconnect lock")
                    .push(status.map(|status| status.code()));
                Ok(())
            });
        let options = ServerOptions::new()
            .with_services(Arc::new(builtin_services(Arc::clone(&sessions))))
            .with_sessions(sessions)
            .with_global_hooks(hooks);
        let daemon = bootstrap_with(
            &StaticConfigLoader::new(config),
            Arc::new(StructuredHealthReporter::new()),
            Arc::new(builtin_endpoints().expect("builtin endpoints")),
            options,
        )
        .expect("bootstrap daemon");
        let listener = daemon.serve().expect("serve");
        let addr = listener.local_addr().expect("tcp listener address");
        Self {
            daemon,
            listener: Some(listener),
            addr,
            disconnects,
        }
    }

    pub(crate) fn daemon(&self) -> &Daemon {
        &self.daemon
    }

    pub(crate) fn connect(&self, path: &str) -> Result<Client, String> {
        Client::connect(self.addr, path)
    }

    pub(crate) fn sessions(&self) -> &Arc<SessionRegistry> {
        self.daemon.sessions()
    }

    /// Waits for `count` disconnect notifications and returns them.
    pub(crate) fn wait_for_disconnects(&self, count: usize) -> Result<Vec<Option<u16>>, String> {
        let deadline = Instant::now() + IO_TIMEOUT;
        loop {
            let seen = self.disconnects.lock().expect("disconnect lock").clone();
            if seen.len() >= count {
                return Ok(seen);
            }
            if Instant::now() >= deadline {
                return Err(format!("saw {} of {count} disconnects", seen.len()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Waits until the registry holds exactly `count` sessions.
    pub(crate) fn wait_for_sessions(&self, count: usize) -> Result<(), String> {
        let deadline = Instant::now() + IO_TIMEOUT;
        while self.sessions().len() != count {
            if Instant::now() >= deadline {
                return Err(format!(
                    "expected {count} live sessions, found {}",
                    self.sessions().len()
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown();
            self.daemon.close_sessions();
            let _ = listener.join();
        }
    }
}

/// How a client observed the end of its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ending {
    Close { code: u16, reason: String },
    Dropped,
}

/// Blocking WebSocket client with read timeouts.
pub(crate) struct Client {
    socket: WebSocket<TcpStream>,
}

impl Client {
    pub(crate) fn connect(addr: SocketAddr, path: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .map_err(|error| error.to_string())?;
        match tungstenite::client(format!("ws://{addr}{path}"), stream) {
            Ok((socket, _)) => Ok(Self { socket }),
            Err(HandshakeError::Failure(tungstenite::Error::Http(response))) => {
                Err(format!("http {}", response.status().as_u16()))
            }
            Err(error) => Err(error.to_string()),
        }
    }

    pub(crate) fn send_text(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_owned()))
            .expect("send text");
    }

    pub(crate) fn send_binary(&mut self, payload: &[u8]) {
        self.socket
            .send(Message::Binary(payload.to_vec()))
            .expect("send binary");
    }

    /// Reads the next data message; `Err` carries how the connection ended.
    pub(crate) fn read(&mut self) -> Result<Message, Ending> {
        loop {
            match self.socket.read() {
                Ok(message @ (Message::Text(_) | Message::Binary(_))) => return Ok(message),
                Ok(Message::Close(frame)) => {
                    return Err(frame.map_or(
                        Ending::Close {
                            code: 1005,
                            reason: String::new(),
                        },
                        |frame| Ending::Close {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                        },
                    ));
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(_) => return Err(Ending::Dropped),
            }
        }
    }

    pub(crate) fn read_json(&mut self) -> Value {
        match self.read().expect("response message") {
            Message::Text(text) => serde_json::from_str(&text).expect("json response"),
            Message::Binary(payload) => serde_json::from_slice(&payload).expect("json response"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    /// Sends a request and returns the parsed response.
    pub(crate) fn call(&mut self, request: &Value) -> Value {
        self.send_text(&request.to_string());
        self.read_json()
    }

    /// Reads until the server ends the connection.
    pub(crate) fn wait_for_end(&mut self) -> Ending {
        loop {
            if let Err(ending) = self.read() {
                return ending;
            }
        }
    }

    pub(crate) fn close(&mut self, code: u16, reason: &str) {
        self.socket
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_owned().into(),
            }))
            .expect("send close");
        while self.socket.read().is_ok() {}
    }
}
