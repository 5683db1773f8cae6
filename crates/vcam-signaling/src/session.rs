//! Signaling session implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::SignalingError;
use crate::keepalive::KeepAliveTracker;
use crate::peer::{NegotiationOutcome, PeerConnectorFactory, PeerStats};
use crate::protocol::SignalMessage;
use crate::state::{ReconnectPolicy, SessionState};
use crate::{
    SignalingResult, DEFAULT_ROOM_ID, KEEPALIVE_INTERVAL_MS, MAX_MISSED_KEEPALIVES,
    STATS_INTERVAL_MS,
};

/// Callback invoked with a human-readable string on every state transition.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Manages the connection lifecycle to the remote signaling endpoint.
///
/// All session-state mutation happens on the network worker the session
/// spawns; external callers only enqueue intents (`connect`, `disconnect`)
/// and read immutable snapshots.
pub struct SignalingSession {
    state: Arc<RwLock<SessionState>>,
    stats: Arc<RwLock<PeerStats>>,
    connector_factory: PeerConnectorFactory,
    status_callback: Option<StatusCallback>,
    reconnect_policy: ReconnectPolicy,
    room_id: String,
    runtime: Option<Runtime>,
    should_stop: Arc<AtomicBool>,
    clean_stop: Arc<AtomicBool>,
    force_drop: Arc<AtomicBool>,
}

impl SignalingSession {
    /// Create a new session. The factory produces one peer connector per
    /// connection attempt; decoded frames flow from the connector into
    /// whatever sink the embedder wired it to.
    pub fn new(connector_factory: PeerConnectorFactory) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            stats: Arc::new(RwLock::new(PeerStats::default())),
            connector_factory,
            status_callback: None,
            reconnect_policy: ReconnectPolicy::default(),
            room_id: DEFAULT_ROOM_ID.to_string(),
            runtime: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            clean_stop: Arc::new(AtomicBool::new(false)),
            force_drop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the status callback.
    pub fn set_status_callback(&mut self, callback: StatusCallback) {
        self.status_callback = Some(callback);
    }

    /// Override the reconnect policy.
    pub fn set_reconnect_policy(&mut self, policy: ReconnectPolicy) {
        self.reconnect_policy = policy;
    }

    /// Override the signaling room.
    pub fn set_room(&mut self, room_id: impl Into<String>) {
        self.room_id = room_id.into();
    }

    /// Connect to the signaling server.
    ///
    /// Valid only from `Disconnected` or `Error`. Fails fast (no retry) if
    /// the address is malformed.
    #[instrument(name = "signaling_connect", skip(self))]
    pub fn connect(&mut self, address: &str) -> SignalingResult<()> {
        if !self.state.read().can_connect() {
            return Err(SignalingError::AlreadyConnected);
        }

        let parsed = Url::parse(address)
            .map_err(|e| SignalingError::InvalidAddress(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(SignalingError::InvalidAddress(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        info!(address = %address, "Connecting to signaling server");

        self.should_stop.store(false, Ordering::SeqCst);
        self.clean_stop.store(false, Ordering::SeqCst);
        self.force_drop.store(false, Ordering::SeqCst);

        let runtime = Runtime::new().map_err(SignalingError::Io)?;

        // Leave the connectable states before the worker spawns so a
        // second connect cannot slip in and start a second runtime.
        set_state(
            &self.state,
            &self.status_callback,
            SessionState::Connecting,
        );

        let ctx = ConnectionContext {
            address: address.to_string(),
            room_id: self.room_id.clone(),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            connector_factory: Arc::clone(&self.connector_factory),
            status_callback: self.status_callback.clone(),
            policy: self.reconnect_policy.clone(),
            should_stop: Arc::clone(&self.should_stop),
            clean_stop: Arc::clone(&self.clean_stop),
            force_drop: Arc::clone(&self.force_drop),
        };

        runtime.spawn(async move {
            if let Err(e) = run_signaling_connection(ctx).await {
                error!("Signaling connection error: {}", e);
            }
        });

        self.runtime = Some(runtime);
        Ok(())
    }

    /// Disconnect from the signaling server.
    ///
    /// A user-initiated disconnect cancels all timers, sends a best-effort
    /// `bye` if connected, and lands in `Disconnected`. A non-user-initiated
    /// call while connected or connecting is routed through the failure
    /// path (reconnect with backoff) instead of a clean stop.
    #[instrument(name = "signaling_disconnect", skip(self))]
    pub fn disconnect(&mut self, user_initiated: bool) {
        if !user_initiated && (self.state.read().is_connected() || self.state.read().is_transient())
        {
            info!("Forcing transport drop (non-user disconnect)");
            self.force_drop.store(true, Ordering::SeqCst);
            return;
        }

        info!("Disconnecting from signaling server");
        self.clean_stop.store(true, Ordering::SeqCst);
        self.should_stop.store(true, Ordering::SeqCst);

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
        }

        set_state(
            &self.state,
            &self.status_callback,
            SessionState::Disconnected,
        );
    }

    /// Current session state snapshot.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Latest peer statistics snapshot.
    pub fn stats(&self) -> PeerStats {
        *self.stats.read()
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.disconnect(true);
    }
}

/// Everything the connection worker needs, bundled to keep the spawn tidy.
struct ConnectionContext {
    address: String,
    room_id: String,
    state: Arc<RwLock<SessionState>>,
    stats: Arc<RwLock<PeerStats>>,
    connector_factory: PeerConnectorFactory,
    status_callback: Option<StatusCallback>,
    policy: ReconnectPolicy,
    should_stop: Arc<AtomicBool>,
    clean_stop: Arc<AtomicBool>,
    force_drop: Arc<AtomicBool>,
}

/// How a single connection attempt ended.
enum ConnectionEnd {
    /// Stop was requested; the worker should exit.
    Stopped,

    /// The remote description was unusable; retrying cannot help.
    NegotiationFailed(String),
}

fn set_state(
    state: &Arc<RwLock<SessionState>>,
    callback: &Option<StatusCallback>,
    new_state: SessionState,
) {
    let message = new_state.message();
    {
        let mut guard = state.write();
        debug!(from = ?*guard, to = ?new_state, "Session state transition");
        *guard = new_state;
    }
    if let Some(cb) = callback {
        cb(&message);
    }
}

async fn run_signaling_connection(ctx: ConnectionContext) -> SignalingResult<()> {
    let mut attempt = 0u32;

    loop {
        if ctx.should_stop.load(Ordering::SeqCst) {
            break;
        }

        set_state(&ctx.state, &ctx.status_callback, SessionState::Connecting);

        match run_connection_once(&ctx, &mut attempt).await {
            Ok(ConnectionEnd::Stopped) => break,
            Ok(ConnectionEnd::NegotiationFailed(reason)) => {
                // Retrying with the same bad description cannot succeed.
                warn!("Negotiation failed: {}", reason);
                set_state(
                    &ctx.state,
                    &ctx.status_callback,
                    SessionState::Error {
                        reason: format!("Negotiation failed: {}", reason),
                    },
                );
                return Err(SignalingError::Negotiation(reason));
            }
            Err(e) => {
                warn!("Connection attempt {} failed: {}", attempt + 1, e);
                attempt += 1;

                if !ctx.policy.should_retry(attempt) {
                    set_state(
                        &ctx.state,
                        &ctx.status_callback,
                        SessionState::Error {
                            reason: format!("Failed after {} attempts: {}", attempt, e),
                        },
                    );
                    return Err(SignalingError::ReconnectExhausted(attempt));
                }

                set_state(
                    &ctx.state,
                    &ctx.status_callback,
                    SessionState::Reconnecting { attempt },
                );
                let delay = ctx.policy.delay_for_attempt(attempt);
                info!("Reconnecting in {:?}...", delay);
                tokio::time::sleep(delay).await;
            }
        }
    }

    set_state(&ctx.state, &ctx.status_callback, SessionState::Disconnected);
    Ok(())
}

/// Run one connection attempt: open the socket, negotiate, then service
/// keep-alive and inbound messages until stop or failure.
async fn run_connection_once(
    ctx: &ConnectionContext,
    attempt: &mut u32,
) -> SignalingResult<ConnectionEnd> {
    let (ws, _response) = connect_async(&ctx.address).await?;
    let (mut write, mut read) = ws.split();

    debug!("Signaling socket open, joining room '{}'", ctx.room_id);

    send_message(
        &mut write,
        SignalMessage::Join {
            room_id: ctx.room_id.clone(),
        },
    )
    .await?;

    let mut connector = (ctx.connector_factory)();
    let sdp = connector.create_offer()?;
    send_message(&mut write, SignalMessage::Offer { sdp }).await?;

    let mut keepalive = KeepAliveTracker::new(
        Duration::from_millis(KEEPALIVE_INTERVAL_MS),
        MAX_MISSED_KEEPALIVES,
    );
    let mut keepalive_tick =
        tokio::time::interval(Duration::from_millis(KEEPALIVE_INTERVAL_MS));
    let mut stats_tick = tokio::time::interval(Duration::from_millis(STATS_INTERVAL_MS));
    let mut connected = false;

    let outcome = loop {
        if ctx.should_stop.load(Ordering::SeqCst) {
            if ctx.clean_stop.load(Ordering::SeqCst) && connected {
                // Best-effort goodbye; failure here is irrelevant.
                let _ = send_message(&mut write, SignalMessage::Bye).await;
            }
            break Ok(ConnectionEnd::Stopped);
        }
        if ctx.force_drop.swap(false, Ordering::SeqCst) {
            break Err(SignalingError::Transport(
                "transport dropped (forced)".to_string(),
            ));
        }

        tokio::select! {
            incoming = read.next() => {
                let message = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        keepalive.record_inbound();
                        match SignalMessage::from_json(text.as_ref()) {
                            Ok(msg) => msg,
                            Err(e) => {
                                // Malformed signaling payloads are a
                                // transport-class failure.
                                break Err(SignalingError::Transport(format!(
                                    "malformed signaling message: {}",
                                    e
                                )));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        keepalive.record_inbound();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break Err(SignalingError::Transport(
                            "signaling socket closed".to_string(),
                        ));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break Err(SignalingError::WebSocket(e)),
                };

                match message {
                    SignalMessage::Answer { sdp } => {
                        match connector.accept_answer(&sdp)? {
                            NegotiationOutcome::Accepted => {
                                debug!("Remote answer accepted");
                            }
                            NegotiationOutcome::Rejected { reason } => {
                                connector.close();
                                break Ok(ConnectionEnd::NegotiationFailed(reason));
                            }
                        }
                    }
                    SignalMessage::IceCandidate {
                        candidate,
                        sdp_mid,
                        sdp_mline_index,
                    } => {
                        connector.add_remote_candidate(&candidate, &sdp_mid, sdp_mline_index)?;
                    }
                    SignalMessage::Pong { .. } => {
                        if let Some(rtt) = keepalive.rtt_ms() {
                            ctx.stats.write().rtt_ms = rtt;
                        }
                    }
                    SignalMessage::Ping { timestamp } => {
                        send_message(&mut write, SignalMessage::Pong { timestamp }).await?;
                    }
                    SignalMessage::Bye => {
                        break Err(SignalingError::Transport(
                            "remote peer left the room".to_string(),
                        ));
                    }
                    SignalMessage::Join { .. }
                    | SignalMessage::Offer { .. }
                    | SignalMessage::Unknown => {
                        debug!("Ignoring signaling message: {:?}", message);
                    }
                }
            }
            _ = keepalive_tick.tick() => {
                if connected {
                    if keepalive.timed_out() {
                        break Err(SignalingError::KeepAliveTimeout(MAX_MISSED_KEEPALIVES));
                    }
                    let timestamp = now_millis();
                    send_message(&mut write, SignalMessage::Ping { timestamp }).await?;
                    keepalive.record_ping_sent();
                }

                // First successful media attach completes the connection.
                if !connected && connector.media_attached() {
                    connected = true;
                    *attempt = 0;
                    keepalive.record_inbound();
                    set_state(&ctx.state, &ctx.status_callback, SessionState::Connected);
                }
            }
            _ = stats_tick.tick() => {
                if connected {
                    let peer = connector.stats();
                    let mut stats = ctx.stats.write();
                    stats.packet_loss_pct = peer.packet_loss_pct;
                    stats.jitter_ms = peer.jitter_ms;
                    if peer.rtt_ms > 0.0 {
                        stats.rtt_ms = peer.rtt_ms;
                    }
                }
            }
        }
    };

    connector.close();
    outcome
}

async fn send_message(
    write: &mut futures::stream::SplitSink<WsStream, Message>,
    message: SignalMessage,
) -> SignalingResult<()> {
    write
        .send(Message::Text(message.to_json().into()))
        .await
        .map_err(SignalingError::WebSocket)
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerConnector;
    use parking_lot::Mutex;

    struct FakeConnector {
        attached: bool,
    }

    impl PeerConnector for FakeConnector {
        fn create_offer(&mut self) -> SignalingResult<String> {
            Ok("v=0\r\n".to_string())
        }

        fn accept_answer(&mut self, _sdp: &str) -> SignalingResult<NegotiationOutcome> {
            Ok(NegotiationOutcome::Accepted)
        }

        fn add_remote_candidate(
            &mut self,
            _candidate: &str,
            _sdp_mid: &str,
            _sdp_mline_index: u32,
        ) -> SignalingResult<()> {
            Ok(())
        }

        fn media_attached(&self) -> bool {
            self.attached
        }

        fn stats(&self) -> PeerStats {
            PeerStats::default()
        }

        fn close(&mut self) {}
    }

    fn fake_factory(attached: bool) -> PeerConnectorFactory {
        Arc::new(move || Box::new(FakeConnector { attached }) as Box<dyn PeerConnector>)
    }

    fn test_context(
        address: String,
        policy: ReconnectPolicy,
        statuses: Arc<Mutex<Vec<String>>>,
    ) -> ConnectionContext {
        let log = Arc::clone(&statuses);
        ConnectionContext {
            address,
            room_id: DEFAULT_ROOM_ID.to_string(),
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            stats: Arc::new(RwLock::new(PeerStats::default())),
            connector_factory: fake_factory(true),
            status_callback: Some(Arc::new(move |s: &str| log.lock().push(s.to_string()))),
            policy,
            should_stop: Arc::new(AtomicBool::new(false)),
            clean_stop: Arc::new(AtomicBool::new(false)),
            force_drop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_connect_rejects_malformed_address() {
        let mut session = SignalingSession::new(fake_factory(false));
        assert!(matches!(
            session.connect("not a url"),
            Err(SignalingError::InvalidAddress(_))
        ));
        assert!(matches!(
            session.connect("http://example.com"),
            Err(SignalingError::InvalidAddress(_))
        ));
        assert!(matches!(session.state(), SessionState::Disconnected));
    }

    #[test]
    fn test_second_connect_rejected_while_first_in_flight() {
        let mut session = SignalingSession::new(fake_factory(false));

        // Nothing listens here; the worker will churn through retries,
        // but the state must already be Connecting when connect returns.
        session.connect("ws://127.0.0.1:9").unwrap();
        assert!(session.state().is_transient());
        assert!(matches!(
            session.connect("ws://127.0.0.1:9"),
            Err(SignalingError::AlreadyConnected)
        ));

        session.disconnect(true);
        assert!(matches!(session.state(), SessionState::Disconnected));
    }

    #[tokio::test]
    async fn test_reconnect_attempts_are_bounded() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let policy = ReconnectPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        };
        // Nothing listens on this port.
        let ctx = test_context("ws://127.0.0.1:9".to_string(), policy, Arc::clone(&statuses));
        let state = Arc::clone(&ctx.state);

        let result = run_signaling_connection(ctx).await;
        assert!(matches!(result, Err(SignalingError::ReconnectExhausted(2))));
        assert!(state.read().is_error());

        let log = statuses.lock();
        assert!(log.iter().any(|s| s.starts_with("Reconnecting (1/")));
        assert!(log.last().unwrap().starts_with("Error"));
    }

    #[tokio::test]
    async fn test_transport_drop_goes_through_reconnecting() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept exactly one connection, hold it briefly, then drop both
        // the socket and the listener so retries are refused.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Drain the join/offer the client sends.
            let _ = ws.next().await;
            let _ = ws.next().await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(ws);
            drop(listener);
        });

        let statuses = Arc::new(Mutex::new(Vec::new()));
        // Two attempts: the drop triggers one Reconnecting round before the
        // refused retry exhausts the budget.
        let policy = ReconnectPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        };
        let ctx = test_context(format!("ws://{}", addr), policy, Arc::clone(&statuses));
        let state = Arc::clone(&ctx.state);

        let result = run_signaling_connection(ctx).await;
        assert!(result.is_err());
        assert!(state.read().is_error());

        let log = statuses.lock();
        let connected = log.iter().position(|s| s == "Connected");
        let reconnecting = log.iter().position(|s| s.starts_with("Reconnecting"));
        assert!(connected.is_some(), "never reached Connected: {:?}", *log);
        assert!(
            reconnecting.is_some() && reconnecting > connected,
            "expected Connected before Reconnecting: {:?}",
            *log
        );
    }
}
