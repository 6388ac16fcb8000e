//! Channel lifecycle management
//!
//! Maintains the long-lived WebSocket channels feeding the snapshot: one
//! primary channel and an optional, independently addressable logs
//! channel. Each open channel is a spawned task that dials, pumps frames
//! into the store, and on any close or error sleeps a fixed delay and
//! dials again, indefinitely, until an explicit `disconnect()`.
//!
//! Every `connect()`/`disconnect()` bumps a per-channel generation
//! counter. A task (or its reconnect sleeper) that wakes up holding a
//! stale generation exits instead of dialing, so a timer scheduled before
//! a disconnect can never resurrect the connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::message::{ClientMessage, Message};
use crate::store::Store;

/// Connection status of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Not connected, not dialing
    #[default]
    Disconnected,
    /// Dialing the server
    Connecting,
    /// Channel is up
    Connected,
}

/// Which stream a channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Primary,
    Logs,
}

/// Observable state of one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    pub status: Status,
    pub last_error: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Result of a best-effort send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Channel was not connected; the message was dropped, not queued
    Dropped,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

struct ChannelShared {
    purpose: Purpose,
    state: watch::Sender<ConnectionState>,
    generation: AtomicU64,
    last_attempted: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelShared {
    fn new(purpose: Purpose) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::default());
        Arc::new(Self {
            purpose,
            state,
            generation: AtomicU64::new(0),
            last_attempted: Mutex::new(None),
            outbound: Mutex::new(None),
        })
    }

    fn current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate the running task and any pending reconnect timer.
    async fn supersede(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.outbound.lock().await.take();
        generation
    }

    fn set_connecting(&self) {
        self.state.send_modify(|s| s.status = Status::Connecting);
    }

    fn set_connected(&self) {
        self.state.send_modify(|s| {
            s.status = Status::Connected;
            s.last_error = None;
        });
    }

    fn set_disconnected(&self, reason: Option<String>) {
        self.state.send_modify(|s| {
            s.status = Status::Disconnected;
            if reason.is_some() {
                s.last_error = reason;
            }
        });
    }

    fn set_config_error(&self, err: &SyncError) {
        self.state.send_modify(|s| {
            s.status = Status::Disconnected;
            s.last_error = Some(err.to_string());
        });
    }

    fn touch_sync(&self) {
        self.state.send_modify(|s| s.last_sync_at = Some(Utc::now()));
    }
}

/// Owns the push channels and their reconnect loops
pub struct ConnectionManager {
    store: Arc<Store>,
    reconnect_delay: Duration,
    default_primary_url: Option<String>,
    default_logs_url: Option<String>,
    primary: Arc<ChannelShared>,
    logs: Arc<ChannelShared>,
    logs_alias: AtomicBool,
}

impl ConnectionManager {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Self {
            store,
            reconnect_delay: config.reconnect_delay(),
            default_primary_url: config.server_url.clone(),
            default_logs_url: config.logs_url.clone(),
            primary: ChannelShared::new(Purpose::Primary),
            logs: ChannelShared::new(Purpose::Logs),
            logs_alias: AtomicBool::new(false),
        }
    }

    /// Open the primary channel.
    ///
    /// URL precedence: explicit argument, then the last attempted URL,
    /// then the configured default. With none of the three this is a
    /// configuration error and no retry loop starts.
    pub async fn connect(&self, url: Option<&str>) -> SyncResult<()> {
        self.open_channel(&self.primary, url, self.default_primary_url.clone())
            .await
    }

    /// Open the logs channel.
    ///
    /// If the resolved URL matches the primary channel's, the logs stream
    /// shares the primary connection instead of opening a second socket.
    pub async fn connect_logs(&self, url: Option<&str>) -> SyncResult<()> {
        let default = self
            .default_logs_url
            .clone()
            .or_else(|| self.default_primary_url.clone());
        let last = self.logs.last_attempted.lock().await.clone();
        let Some(resolved) = resolve_url(url, last, default) else {
            let err = SyncError::Configuration("no logs channel URL available".to_string());
            self.logs.set_config_error(&err);
            return Err(err);
        };

        let primary_url = self.primary.last_attempted.lock().await.clone();
        if primary_url.as_deref() == Some(resolved.as_str()) {
            debug!("logs channel shares the primary connection");
            self.logs_alias.store(true, Ordering::SeqCst);
            return self.connect(Some(&resolved)).await;
        }

        self.logs_alias.store(false, Ordering::SeqCst);
        self.open_channel(&self.logs, Some(&resolved), None).await
    }

    /// Transmit a message if the primary channel is up; otherwise the
    /// message is dropped with a warning. At-most-once, no queue.
    pub async fn send(&self, message: &ClientMessage) -> SendOutcome {
        if self.primary.state.borrow().status == Status::Connected {
            if let Some(tx) = self.primary.outbound.lock().await.as_ref() {
                if tx.send(message.encode()).is_ok() {
                    return SendOutcome::Sent;
                }
            }
        }
        warn!("dropping outbound message: primary channel not connected");
        SendOutcome::Dropped
    }

    /// Re-dial the last attempted URL.
    pub async fn retry(&self) -> SyncResult<()> {
        let last = self.primary.last_attempted.lock().await.clone();
        match last {
            Some(url) => self.connect(Some(&url)).await,
            None => {
                let err =
                    SyncError::Configuration("no previous connection attempt to retry".to_string());
                self.primary.set_config_error(&err);
                Err(err)
            }
        }
    }

    /// Close both channels and invalidate any pending reconnect timers.
    pub async fn disconnect(&self) {
        for channel in [&self.primary, &self.logs] {
            channel.supersede().await;
            channel.set_disconnected(None);
        }
        info!("channels disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        self.primary.state.borrow().clone()
    }

    pub fn logs_state(&self) -> ConnectionState {
        if self.logs_alias.load(Ordering::SeqCst) {
            self.state()
        } else {
            self.logs.state.borrow().clone()
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.primary.state.subscribe()
    }

    pub fn subscribe_logs(&self) -> watch::Receiver<ConnectionState> {
        if self.logs_alias.load(Ordering::SeqCst) {
            self.primary.state.subscribe()
        } else {
            self.logs.state.subscribe()
        }
    }

    async fn open_channel(
        &self,
        channel: &Arc<ChannelShared>,
        explicit: Option<&str>,
        default: Option<String>,
    ) -> SyncResult<()> {
        let last = channel.last_attempted.lock().await.clone();
        let Some(url) = resolve_url(explicit, last.clone(), default) else {
            let err = SyncError::Configuration("no channel URL available".to_string());
            channel.set_config_error(&err);
            return Err(err);
        };

        // Reconnecting to the same URL while connected is a no-op
        if channel.state.borrow().status == Status::Connected
            && last.as_deref() == Some(url.as_str())
        {
            return Ok(());
        }

        let generation = channel.supersede().await;
        *channel.last_attempted.lock().await = Some(url.clone());

        let channel = channel.clone();
        let store = self.store.clone();
        let delay = self.reconnect_delay;
        tokio::spawn(run_channel(channel, store, url, generation, delay));
        Ok(())
    }
}

fn resolve_url(
    explicit: Option<&str>,
    last_attempted: Option<String>,
    default: Option<String>,
) -> Option<String> {
    explicit
        .map(str::to_string)
        .or(last_attempted)
        .or(default)
        .filter(|url| !url.is_empty())
}

/// Dials and pumps in a loop until this generation is superseded.
async fn run_channel(
    channel: Arc<ChannelShared>,
    store: Arc<Store>,
    url: String,
    generation: u64,
    reconnect_delay: Duration,
) {
    loop {
        if !channel.current(generation) {
            return;
        }
        channel.set_connecting();
        info!(purpose = ?channel.purpose, %url, "opening channel");

        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                if !channel.current(generation) {
                    return;
                }
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                *channel.outbound.lock().await = Some(outbound_tx);
                channel.set_connected();

                let reason = drive(&channel, &store, socket, outbound_rx).await;

                if !channel.current(generation) {
                    // disconnect() or a newer connect() owns the state now
                    return;
                }
                channel.outbound.lock().await.take();
                channel.set_disconnected(reason);
            }
            Err(e) => {
                warn!(purpose = ?channel.purpose, "channel connect failed: {e}");
                if !channel.current(generation) {
                    return;
                }
                channel.set_disconnected(Some(e.to_string()));
            }
        }

        debug!(
            delay_ms = reconnect_delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::time::sleep(reconnect_delay).await;
        // A stale timer must not redial after disconnect or a newer connect
        if !channel.current(generation) {
            return;
        }
    }
}

/// Pump frames both ways until the socket closes or we are superseded.
/// Returns the close reason, if the server gave one.
async fn drive(
    channel: &ChannelShared,
    store: &Store,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) -> Option<String> {
    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        return Some(e.to_string());
                    }
                }
                None => {
                    // Sender was taken: superseded or disconnected
                    let _ = write.close().await;
                    return None;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    apply_frame(channel, store, Message::decode(&text)).await;
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    apply_frame(channel, store, Message::decode_bytes(&bytes)).await;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    return frame.map(|f| format!("closed: {}", f.reason));
                }
                Some(Ok(_)) => {} // websocket-level ping/pong
                Some(Err(e)) => return Some(e.to_string()),
                None => return None,
            },
        }
    }
}

async fn apply_frame(channel: &ChannelShared, store: &Store, decoded: SyncResult<Message>) {
    match decoded {
        Ok(message) => {
            store.apply(&message).await;
            channel.touch_sync();
        }
        // Malformed payloads are dropped; the channel stays up
        Err(e) => warn!("dropping malformed inbound message: {e}"),
    }
}
