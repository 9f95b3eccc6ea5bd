//! Scripted in-process Stratum server for tests.
//!
//! Accepts any number of connections on `127.0.0.1`. Every request line is
//! handed to an optional responder for an automatic reply and then queued
//! for the test to inspect. The test can push arbitrary lines to the most
//! recent connection or drop it.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;

/// Automatic reply for a request: `Ok(result)` or `Err(error)`; `None` to
/// leave the request for the test to answer.
pub type Responder = Arc<dyn Fn(&str, &[Value]) -> Option<Result<Value, Value>> + Send + Sync>;

/// How long `next_request` waits.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

enum ServerCommand {
    Line(String),
    Close,
}

/// Scripted Stratum server.
pub struct MockStratumServer {
    addr: SocketAddr,
    requests: Mutex<mpsc::UnboundedReceiver<Value>>,
    current: Arc<parking_lot::Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    connections: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockStratumServer {
    /// Server that answers only `server.version`.
    pub async fn start() -> io::Result<Self> {
        Self::with_responder(Arc::new(|method: &str, _params: &[Value]| {
            (method == "server.version").then(|| Ok(json!("MockServer 1.0")))
        }))
        .await
    }

    /// Server with a custom responder.
    pub async fn with_responder(responder: Responder) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let current = Arc::new(parking_lot::Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            responder,
            request_tx,
            Arc::clone(&current),
            Arc::clone(&connections),
        ));

        Ok(Self {
            addr,
            requests: Mutex::new(request_rx),
            current,
            connections,
            accept_task,
        })
    }

    /// Listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Client config pointing at this server.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::for_testing(self.addr.to_string())
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next request received, in arrival order.
    pub async fn next_request(&self) -> Option<Value> {
        let mut requests = self.requests.lock().await;
        tokio::time::timeout(REQUEST_TIMEOUT, requests.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next request for `method`, skipping others.
    pub async fn next_request_for(&self, method: &str) -> Option<Value> {
        loop {
            let request = self.next_request().await?;
            if request["method"] == method {
                return Some(request);
            }
        }
    }

    /// Send a raw line (newline appended) on the current connection.
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        match self.current.lock().as_ref() {
            Some(connection) => connection.send(ServerCommand::Line(line.into())).is_ok(),
            None => false,
        }
    }

    /// Send a JSON message.
    pub fn send(&self, message: &Value) -> bool {
        self.send_line(message.to_string())
    }

    /// Answer request `id` with `result`.
    pub fn reply(&self, id: &Value, result: Value) -> bool {
        self.send(&json!({ "id": id, "result": result }))
    }

    /// Answer request `id` with an error object.
    pub fn reply_error(&self, id: &Value, error: Value) -> bool {
        self.send(&json!({ "id": id, "error": error }))
    }

    /// Push a notification.
    pub fn notify(&self, method: &str, params: Vec<Value>) -> bool {
        self.send(&json!({ "method": method, "params": params }))
    }

    /// Drop the current connection.
    pub fn close_connection(&self) -> bool {
        match self.current.lock().take() {
            Some(connection) => connection.send(ServerCommand::Close).is_ok(),
            None => false,
        }
    }
}

impl Drop for MockStratumServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Some(connection) = self.current.lock().take() {
            let _ = connection.send(ServerCommand::Close);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    responder: Responder,
    requests: mpsc::UnboundedSender<Value>,
    current: Arc<parking_lot::Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    connections: Arc<AtomicUsize>,
) {
    while let Ok((socket, _)) = listener.accept().await {
        connections.fetch_add(1, Ordering::SeqCst);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *current.lock() = Some(command_tx.clone());
        tokio::spawn(serve(
            socket,
            Arc::clone(&responder),
            requests.clone(),
            command_tx,
            command_rx,
        ));
    }
}

async fn serve(
    socket: TcpStream,
    responder: Responder,
    requests: mpsc::UnboundedSender<Value>,
    commands: mpsc::UnboundedSender<ServerCommand>,
    mut command_rx: mpsc::UnboundedReceiver<ServerCommand>,
) {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let Ok(request) = serde_json::from_str::<Value>(&line) else { continue };
                let method = request["method"].as_str().unwrap_or_default().to_string();
                let params = request["params"].as_array().cloned().unwrap_or_default();
                if let Some(reply) = responder(&method, &params) {
                    let message = match reply {
                        Ok(result) => json!({ "id": request["id"], "result": result }),
                        Err(error) => json!({ "id": request["id"], "error": error }),
                    };
                    let _ = commands.send(ServerCommand::Line(message.to_string()));
                }
                let _ = requests.send(request);
            }
            command = command_rx.recv() => match command {
                Some(ServerCommand::Line(mut line)) => {
                    line.push('\n');
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(ServerCommand::Close) | None => break,
            }
        }
    }
}
