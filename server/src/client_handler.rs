//! Per-connection handler
//!
//! One `ClientHandler` exists per accepted socket. It owns the outbound side
//! of the connection (an unbounded channel drained by a single writer task,
//! so lines never interleave) and the connection state machine:
//!
//! ```text
//! CONNECTED --disconnect()--> DISCONNECTED --reconnect()--> RECONNECTING --> CONNECTED
//!      \______________________ stop() ______________________/  (terminal)
//! ```
//!
//! A handler without a transport ("detached") behaves exactly the same and
//! records every message in its outbound log, which is what sessions and the
//! matchmaking service are tested against.

use crate::health::ConnectionHealth;
use crate::network::GameServer;
use log::{debug, info, warn};
use shared::{PlayerId, ServerMessage};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Messages kept in the outbound log
const SENT_LOG_CAPACITY: usize = 256;
/// Messages held back while the transport is gone
const BACKLOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

#[derive(Debug)]
struct HandlerInner {
    client_id: Option<PlayerId>,
    state: ConnectionState,
    running: bool,
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Undelivered messages, flushed on reconnect
    backlog: VecDeque<String>,
    sent: VecDeque<String>,
    disconnected_at: Option<Instant>,
}

#[derive(Debug)]
pub struct ClientHandler {
    connection_id: u64,
    addr: Option<SocketAddr>,
    server: Weak<GameServer>,
    inner: Mutex<HandlerInner>,
    shutdown: watch::Sender<bool>,
}

impl ClientHandler {
    pub fn new(
        connection_id: u64,
        addr: Option<SocketAddr>,
        server: Weak<GameServer>,
        outbound: Option<mpsc::UnboundedSender<String>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            connection_id,
            addr,
            server,
            inner: Mutex::new(HandlerInner {
                client_id: None,
                state: ConnectionState::Connected,
                running: true,
                outbound,
                backlog: VecDeque::new(),
                sent: VecDeque::new(),
                disconnected_at: None,
            }),
            shutdown,
        }
    }

    /// A handler with no transport and no server, bound to `client_id`
    pub fn detached(client_id: &str) -> Self {
        let handler = Self::new(0, None, Weak::new(), None);
        handler.set_client_id(client_id);
        handler
    }

    fn lock(&self) -> MutexGuard<'_, HandlerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn client_id(&self) -> Option<PlayerId> {
        self.lock().client_id.clone()
    }

    pub fn set_client_id(&self, client_id: &str) {
        self.lock().client_id = Some(client_id.to_string());
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn send(&self, message: &ServerMessage) {
        self.send_message(&message.to_string());
    }

    /// Queues a line for the writer; held back while disconnected
    pub fn send_message(&self, message: &str) {
        let mut inner = self.lock();
        if !inner.running {
            debug!("Dropping message for stopped connection {}", self.connection_id);
            return;
        }

        inner.sent.push_back(message.to_string());
        if inner.sent.len() > SENT_LOG_CAPACITY {
            inner.sent.pop_front();
        }

        let delivered = match (&inner.outbound, inner.state) {
            (Some(tx), ConnectionState::Connected) => tx.send(message.to_string()).is_ok(),
            _ => false,
        };

        // Detached handlers only keep the log
        let holds_back = inner.outbound.is_some() || inner.state != ConnectionState::Connected;
        if !delivered && holds_back {
            inner.backlog.push_back(message.to_string());
            if inner.backlog.len() > BACKLOG_CAPACITY {
                inner.backlog.pop_front();
            }
        }
    }

    /// Every message sent through this handler, oldest first
    pub fn sent_messages(&self) -> Vec<String> {
        self.lock().sent.iter().cloned().collect()
    }

    pub fn last_message(&self) -> Option<String> {
        self.lock().sent.back().cloned()
    }

    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    /// Transport lost; keeps the handler alive for a later `reconnect()`
    pub fn disconnect(&self) -> bool {
        let mut inner = self.lock();
        if !inner.running || inner.state == ConnectionState::Disconnected {
            return false;
        }
        inner.state = ConnectionState::Disconnected;
        inner.outbound = None;
        inner.disconnected_at = Some(Instant::now());
        info!(
            "Connection {} ({}) disconnected",
            self.connection_id,
            inner.client_id.as_deref().unwrap_or("anonymous")
        );
        true
    }

    /// Hands this handler's transport over to another handler
    pub(crate) fn take_outbound(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.lock().outbound.take()
    }

    pub fn reconnect(&self) -> bool {
        self.reattach(None)
    }

    /// Reconnects onto a new transport and flushes the backlog through it
    pub fn reconnect_with(&self, outbound: mpsc::UnboundedSender<String>) -> bool {
        self.reattach(Some(outbound))
    }

    fn reattach(&self, outbound: Option<mpsc::UnboundedSender<String>>) -> bool {
        let mut inner = self.lock();
        if !inner.running || inner.state != ConnectionState::Disconnected {
            return false;
        }

        inner.state = ConnectionState::Reconnecting;
        if outbound.is_some() {
            inner.outbound = outbound;
        }

        if let Some(tx) = inner.outbound.clone() {
            while let Some(message) = inner.backlog.pop_front() {
                if tx.send(message).is_err() {
                    warn!("Transport for connection {} closed during reconnect", self.connection_id);
                    inner.outbound = None;
                    inner.state = ConnectionState::Disconnected;
                    return false;
                }
            }
        }

        inner.state = ConnectionState::Connected;
        inner.disconnected_at = None;
        info!(
            "Connection {} ({}) reconnected",
            self.connection_id,
            inner.client_id.as_deref().unwrap_or("anonymous")
        );
        true
    }

    /// Halts the handler for good; it can no longer reconnect
    pub fn stop(&self) {
        {
            let mut inner = self.lock();
            if !inner.running {
                return;
            }
            inner.running = false;
            inner.state = ConnectionState::Disconnected;
            inner.outbound = None;
            inner.backlog.clear();
        }
        self.shutdown.send_replace(true);
        debug!("Connection {} stopped", self.connection_id);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// True once the handler has been disconnected for longer than `window`
    pub fn is_expired(&self, window: Duration) -> bool {
        let inner = self.lock();
        inner.running
            && inner.state == ConnectionState::Disconnected
            && inner
                .disconnected_at
                .map_or(false, |since| since.elapsed() > window)
    }

    pub fn send_friend_request(&self, recipient_id: &str) -> bool {
        match (self.server.upgrade(), self.client_id()) {
            (Some(server), Some(me)) => server.send_friend_request(&me, recipient_id).is_some(),
            _ => false,
        }
    }

    pub fn accept_friend_request(&self, sender_id: &str) -> bool {
        match (self.server.upgrade(), self.client_id()) {
            (Some(server), Some(me)) => server.accept_friend_request(sender_id, &me).is_some(),
            _ => false,
        }
    }

    pub fn decline_friend_request(&self, sender_id: &str) -> bool {
        match (self.server.upgrade(), self.client_id()) {
            (Some(server), Some(me)) => server.decline_friend_request(sender_id, &me).is_some(),
            _ => false,
        }
    }

    /// Sends and returns the one-line health status for this connection's player
    pub fn monitor_connection_health(&self, health: &ConnectionHealth) -> String {
        let client_id = self.client_id().unwrap_or_default();
        let sample = health.sample(&client_id).unwrap_or_default();
        let message = ServerMessage::ConnectionHealth {
            latency_ms: sample.latency_ms,
            packet_loss: sample.packet_loss,
            classification: health.check_connection_health(&client_id).to_string(),
        };
        let line = message.to_string();
        self.send_message(&line);
        line
    }
}

/// Per-connection worker: runs the read loop and the single writer for `stream`
pub async fn serve_connection(server: Arc<GameServer>, stream: TcpStream, addr: SocketAddr) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let result = async {
                write_half.write_all(line.as_bytes()).await?;
                write_half.write_all(b"\n").await
            }
            .await;
            if let Err(e) = result {
                warn!("Failed to write to {}: {}", addr, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut handler = server.open_connection(Some(addr), tx);
    let mut shutdown = handler.shutdown_signal();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(attached) = server.handle_line(&handler, &line) {
                        handler = attached;
                        shutdown = handler.shutdown_signal();
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Read error from {}: {}", addr, e);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    server.connection_lost(&handler);
    drop(handler);
    let _ = writer.await;
}
