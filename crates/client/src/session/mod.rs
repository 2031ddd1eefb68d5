// Socket session: the one WebSocket connection a running app instance
// owns, tied to auth state and foreground transitions.
//
// Transport is abstracted via `ChatTransport` for testability; the real
// implementation wraps the platform WebSocket. Reconnection is
// opportunistic — triggered by app-foreground and auth-state changes,
// never a free-running retry loop — with capped exponential backoff
// between attempts.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use roomline_common::protocol::ws::ChatEvent;
use tracing::info;
use url::Url;
use uuid::Uuid;

// ── Transport trait ─────────────────────────────────────────────────

/// Abstraction over the network transport.
///
/// In production this wraps the platform WebSocket client; in tests it
/// is a mock with scripted frames.
pub trait ChatTransport {
    /// Open a WebSocket connection to the given URL.
    fn connect(&mut self, ws_url: &str) -> Result<()>;

    /// Send an event over the WebSocket.
    fn send(&mut self, event: &ChatEvent) -> Result<()>;

    /// Receive the next event (blocking). Returns None on clean close.
    fn recv(&mut self) -> Result<Option<ChatEvent>>;

    /// Close the WebSocket.
    fn close(&mut self);
}

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token, or torn down. The transport holds nothing.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Registered with the server; events flow.
    Connected,
}

/// Reconnection parameters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(250), max_delay: Duration::from_secs(30) }
    }
}

// ── Session events ──────────────────────────────────────────────────

/// What the session surfaces to the hub / app loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake completed; the server registered this connection.
    Connected { conn_id: Uuid },
    /// An inbound chat event.
    Event(ChatEvent),
    /// Connection lost or torn down.
    Dropped { reason: String },
}

// ── Session ─────────────────────────────────────────────────────────

/// Owns exactly one transport connection per running app instance.
pub struct SocketSession<T: ChatTransport> {
    server_url: String,
    transport: T,
    state: SessionState,
    auth_token: Option<String>,
    conn_id: Option<Uuid>,
    policy: ReconnectPolicy,
    consecutive_failures: u32,
}

impl<T: ChatTransport> SocketSession<T> {
    pub fn new(server_url: impl Into<String>, transport: T) -> Self {
        Self {
            server_url: server_url.into(),
            transport,
            state: SessionState::Idle,
            auth_token: None,
            conn_id: None,
            policy: ReconnectPolicy::default(),
            consecutive_failures: 0,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conn_id(&self) -> Option<Uuid> {
        self.conn_id
    }

    /// Direct access to the transport (scripting in tests, platform
    /// hooks in embedders).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Update the stored credential. Losing the token (logout, expiry)
    /// tears the connection down immediately.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        let had_token = self.auth_token.is_some();
        self.auth_token = token;
        if self.auth_token.is_none() && had_token {
            self.disconnect();
        }
    }

    /// Attempt to connect. Requires a token; validates the server URL;
    /// performs the hello handshake.
    pub fn connect(&mut self) -> Result<SessionEvent> {
        let Some(token) = self.auth_token.clone() else {
            return Err(anyhow!("cannot connect without an auth token"));
        };
        validate_ws_url(&self.server_url)?;
        self.state = SessionState::Connecting;

        if let Err(error) = self.transport.connect(&self.server_url) {
            return Ok(self.drop_with(format!("WebSocket connection failed: {error}")));
        }

        if let Err(error) = self.transport.send(&ChatEvent::Hello { token }) {
            self.transport.close();
            return Ok(self.drop_with(format!("failed to send hello: {error}")));
        }

        match self.transport.recv() {
            Ok(Some(ChatEvent::HelloAck { conn_id, .. })) => {
                self.state = SessionState::Connected;
                self.conn_id = Some(conn_id);
                self.consecutive_failures = 0;
                info!(conn_id = %conn_id, "chat session established");
                Ok(SessionEvent::Connected { conn_id })
            }
            Ok(Some(ChatEvent::Error { code, message, .. })) => {
                self.transport.close();
                Ok(self.drop_with(format!("hello rejected: {code}: {message}")))
            }
            Ok(Some(_)) => {
                self.transport.close();
                Ok(self.drop_with("unexpected frame in response to hello".to_string()))
            }
            Ok(None) => Ok(self.drop_with("connection closed during handshake".to_string())),
            Err(error) => {
                self.transport.close();
                Ok(self.drop_with(format!("error during handshake: {error}")))
            }
        }
    }

    /// App came to the foreground: re-validate auth and reconnect if
    /// not already connected. No token or already connected is a no-op.
    pub fn handle_foreground(&mut self) -> Result<Option<SessionEvent>> {
        if self.auth_token.is_none() || self.state == SessionState::Connected {
            return Ok(None);
        }
        self.connect().map(Some)
    }

    /// Pull the next event off the transport.
    ///
    /// While the session is not active, anything still in flight on the
    /// old transport is discarded — callers never see events from a
    /// logically torn-down connection.
    pub fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        if self.state != SessionState::Connected {
            return Ok(None);
        }

        match self.transport.recv()? {
            Some(
                event @ (ChatEvent::NewMessage { .. }
                | ChatEvent::NewUserMessage { .. }
                | ChatEvent::NewConversation { .. }
                | ChatEvent::MessagesRead { .. }
                | ChatEvent::Error { .. }),
            ) => Ok(Some(SessionEvent::Event(event))),

            // Remaining names are client-to-server or handshake frames.
            Some(_) => Ok(None),

            None => {
                self.state = SessionState::Idle;
                self.conn_id = None;
                Ok(Some(SessionEvent::Dropped {
                    reason: "connection closed by server".to_string(),
                }))
            }
        }
    }

    /// Join a conversation room (chat-detail screen mounted).
    pub fn join_room(&mut self, room_id: &str) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(anyhow!("cannot join room: not connected"));
        }
        self.transport.send(&ChatEvent::JoinRoom { room_id: room_id.to_string() })
    }

    /// Leave a conversation room (chat-detail screen unmounted).
    pub fn leave_room(&mut self, room_id: &str) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(anyhow!("cannot leave room: not connected"));
        }
        self.transport.send(&ChatEvent::LeaveRoom { room_id: room_id.to_string() })
    }

    /// Tear down immediately. Not globally atomic: a frame already in
    /// flight may still arrive at the transport and is discarded by
    /// `next_event`.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.state = SessionState::Idle;
        self.conn_id = None;
    }

    /// Backoff before the next opportunistic reconnection attempt.
    pub fn reconnect_delay(&self) -> Duration {
        let exp = self.consecutive_failures.min(7);
        let delay = saturating_mul(self.policy.base_delay, 1u64 << exp);
        delay.min(self.policy.max_delay)
    }

    fn drop_with(&mut self, reason: String) -> SessionEvent {
        self.state = SessionState::Idle;
        self.conn_id = None;
        self.consecutive_failures += 1;
        SessionEvent::Dropped { reason }
    }
}

fn validate_ws_url(value: &str) -> Result<()> {
    let parsed = Url::parse(value).map_err(|error| anyhow!("invalid ws url `{value}`: {error}"))?;
    match parsed.scheme() {
        "wss" => Ok(()),
        "ws" if is_loopback_host(parsed.host_str()) => Ok(()),
        _ => Err(anyhow!("ws url must use wss (ws is allowed only for localhost testing)")),
    }
}

fn is_loopback_host(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}

fn saturating_mul(duration: Duration, rhs: u64) -> Duration {
    let nanos = duration.as_nanos().saturating_mul(rhs as u128);
    if nanos > u64::MAX as u128 {
        Duration::from_secs(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
