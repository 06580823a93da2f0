//! Dhan Feed Client
//!
//! Long-lived WebSocket connection to the Dhan v2 market feed.
//!
//! # Lifecycle
//!
//! `Disconnected → Cooldown → Connecting → Subscribed`. A transport error
//! drops back to `Disconnected`, the backoff delay is slept out in
//! `Cooldown`, and the connection is retried. The backoff returns to its
//! floor only after a subscription has been sent successfully.
//!
//! # Protocol
//!
//! Subscriptions are JSON text frames; market data arrives as little-endian
//! binary frames decoded by [`DhanCodec`]. A frame that fails to decode is
//! counted and skipped without closing the connection.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::DhanCodec;
use super::messages::{FeedMode, SubscriptionInstrument, SubscriptionRequest};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::domain::market_data::FeedPacket;
use crate::infrastructure::config::{DhanCredentials, FeedSettings};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Subscription message could not be encoded.
    #[error("failed to encode subscription: {0}")]
    Encode(#[from] serde_json::Error),

    /// Network operation timed out.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// Server sent a disconnect packet.
    #[error("server requested disconnect (code {0})")]
    ServerDisconnect(u16),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Command queue closed or full.
    #[error("feed command channel unavailable")]
    ChannelSend,

    /// Reconnect budget exhausted.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),
}

// =============================================================================
// Events and Commands
// =============================================================================

/// Events emitted by the feed client.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connected and subscription sent.
    Connected {
        /// Subscribed instrument count.
        instruments: usize,
    },
    /// Disconnected from server.
    Disconnected,
    /// Sleeping before the next connection attempt.
    Reconnecting {
        /// Attempt number since the last successful subscription.
        attempt: u32,
        /// Backoff delay.
        delay: Duration,
    },
    /// A decoded market-data packet.
    Packet(FeedPacket),
    /// The subscription was replaced on the live connection.
    Resubscribed {
        /// New instrument set.
        instruments: Vec<SubscriptionInstrument>,
    },
    /// Server sent a disconnect packet.
    ServerDisconnect {
        /// Reason code.
        code: u16,
    },
}

/// Commands accepted by a running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Replace the subscription with a new instrument set.
    Resubscribe(Vec<SubscriptionInstrument>),
}

/// Cloneable handle for sending commands to the client.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
    state: Arc<FeedState>,
}

impl FeedHandle {
    /// Queue a resubscribe. Applied between reads of the transport.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::ChannelSend`] if the queue is full or the
    /// client has stopped.
    pub fn resubscribe(&self, instruments: Vec<SubscriptionInstrument>) -> Result<(), FeedClientError> {
        self.commands
            .try_send(FeedCommand::Resubscribe(instruments))
            .map_err(|_| FeedClientError::ChannelSend)
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> &Arc<FeedState> {
        &self.state
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Clone)]
pub struct FeedClientConfig {
    /// Full connect URL including auth query.
    pub url: String,
    /// Subscription mode.
    pub mode: FeedMode,
    /// Initial subscription.
    pub instruments: Vec<SubscriptionInstrument>,
    /// Backoff configuration.
    pub reconnect: ReconnectConfig,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Send timeout.
    pub send_timeout: Duration,
    /// Ping cadence.
    pub ping_interval: Duration,
}

impl FeedClientConfig {
    /// Build from feed settings and the resolved subscription list.
    #[must_use]
    pub fn from_settings(
        settings: &FeedSettings,
        credentials: &DhanCredentials,
        instruments: Vec<SubscriptionInstrument>,
    ) -> Self {
        Self {
            url: settings.connect_url(credentials),
            mode: settings.mode,
            instruments,
            reconnect: ReconnectConfig::from_feed_settings(settings),
            connect_timeout: settings.connect_timeout,
            send_timeout: settings.send_timeout,
            ping_interval: settings.ping_interval,
        }
    }

    fn redacted_url(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(base, _)| base)
    }
}

impl fmt::Debug for FeedClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClientConfig")
            .field("url", &self.redacted_url())
            .field("mode", &self.mode)
            .field("instruments", &self.instruments.len())
            .field("reconnect", &self.reconnect)
            .field("connect_timeout", &self.connect_timeout)
            .field("send_timeout", &self.send_timeout)
            .field("ping_interval", &self.ping_interval)
            .finish()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Dhan feed client.
///
/// The only producer of [`FeedEvent::Packet`]; resubscribe commands are
/// drained from a single-consumer queue inside the read loop so they never
/// run concurrently with a transport read.
pub struct DhanFeedClient {
    config: FeedClientConfig,
    codec: DhanCodec,
    state: Arc<FeedState>,
    event_tx: mpsc::Sender<FeedEvent>,
    commands: Mutex<mpsc::Receiver<FeedCommand>>,
    cancel: CancellationToken,
    subscriptions: parking_lot::RwLock<Vec<SubscriptionInstrument>>,
}

impl DhanFeedClient {
    /// Create a client and the handle used to command it.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        state: Arc<FeedState>,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> (Self, FeedHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let subscriptions = parking_lot::RwLock::new(config.instruments.clone());
        state.set_subscription_count(config.instruments.len());
        let handle = FeedHandle {
            commands: command_tx,
            state: Arc::clone(&state),
        };
        let client = Self {
            config,
            codec: DhanCodec::new(),
            state,
            event_tx,
            commands: Mutex::new(command_rx),
            cancel,
            subscriptions,
        };
        (client, handle)
    }

    /// Current subscription.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionInstrument> {
        self.subscriptions.read().clone()
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Reconnect`] if a finite reconnect budget
    /// is exhausted.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.state.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!("Feed connection closed for shutdown");
                    self.state.set_state(ConnectionState::Disconnected);
                    metrics::set_feed_connected(false);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    self.state.set_error(e.to_string());
                    metrics::set_feed_connected(false);
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    let Some(delay) = policy.next_delay() else {
                        return Err(ReconnectError::MaxAttemptsExceeded(policy.attempt_count()).into());
                    };
                    let attempt = policy.attempt_count();
                    self.state.set_state(ConnectionState::Cooldown);
                    self.state.increment_reconnect_attempts();
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );
                    let _ = self
                        .event_tx
                        .send(FeedEvent::Reconnecting { attempt, delay })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during backoff");
                            self.state.set_state(ConnectionState::Disconnected);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, subscribe and read until error or cancellation.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        self.state.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.redacted_url(), "Connecting to feed");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| FeedClientError::Timeout("connect", self.config.connect_timeout))??;
        let (mut write, mut read) = ws_stream.split();

        let instruments = self.subscriptions();
        for request in SubscriptionRequest::subscribe(self.config.mode, &instruments) {
            self.send_request(&mut write, &request).await?;
        }

        policy.reset();
        self.state.set_state(ConnectionState::Subscribed);
        self.state.set_subscription_count(instruments.len());
        metrics::set_feed_connected(true);
        tracing::info!(
            instruments = instruments.len(),
            mode = self.config.mode.as_str(),
            "Feed subscribed"
        );
        let _ = self
            .event_tx
            .send(FeedEvent::Connected {
                instruments: instruments.len(),
            })
            .await;

        let mut commands = self.commands.lock().await;
        let mut commands_open = true;
        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    self.send_with_timeout(&mut write, Message::Ping(Vec::new().into())).await?;
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(FeedCommand::Resubscribe(next)) => {
                            self.apply_resubscribe(&mut write, next).await?;
                        }
                        None => commands_open = false,
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(packet) = self.decode_frame(&data) {
                                if let FeedPacket::ServerDisconnect(body) = packet {
                                    tracing::warn!(code = body.error_code, "Server sent disconnect packet");
                                    let _ = self
                                        .event_tx
                                        .send(FeedEvent::ServerDisconnect { code: body.error_code })
                                        .await;
                                    return Err(FeedClientError::ServerDisconnect(body.error_code));
                                }
                                let _ = self.event_tx.send(FeedEvent::Packet(packet)).await;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            tracing::debug!(message = %text, "Feed text message");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.send_with_timeout(&mut write, Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("Feed stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one binary frame, counting failures.
    fn decode_frame(&self, data: &[u8]) -> Option<FeedPacket> {
        self.state.increment_packets();
        match self.codec.decode(data) {
            Ok(packet) => {
                metrics::record_packet(packet.packet_type());
                Some(packet)
            }
            Err(e) => {
                self.state.increment_decode_errors();
                metrics::record_decode_error(e.kind());
                tracing::debug!(kind = e.kind(), error = %e, "Dropping undecodable frame");
                None
            }
        }
    }

    /// Swap the subscription on the live connection: unsubscribe what was
    /// dropped, then subscribe the new set.
    async fn apply_resubscribe<W>(
        &self,
        write: &mut W,
        next: Vec<SubscriptionInstrument>,
    ) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let current = self.subscriptions();
        let removed = removed_instruments(&current, &next);

        for request in SubscriptionRequest::unsubscribe(self.config.mode, &removed) {
            self.send_request(write, &request).await?;
        }
        for request in SubscriptionRequest::subscribe(self.config.mode, &next) {
            self.send_request(write, &request).await?;
        }

        *self.subscriptions.write() = next.clone();
        self.state.set_subscription_count(next.len());
        metrics::record_resubscribe();
        tracing::info!(
            removed = removed.len(),
            instruments = next.len(),
            "Feed resubscribed"
        );
        let _ = self
            .event_tx
            .send(FeedEvent::Resubscribed { instruments: next })
            .await;
        Ok(())
    }

    async fn send_request<W>(
        &self,
        write: &mut W,
        request: &SubscriptionRequest,
    ) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let json = request.to_json()?;
        tracing::debug!(
            request_code = request.request_code,
            count = request.instrument_count,
            "Sending subscription request"
        );
        self.send_with_timeout(write, Message::Text(json.into())).await
    }

    async fn send_with_timeout<W>(&self, write: &mut W, message: Message) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        tokio::time::timeout(self.config.send_timeout, write.send(message))
            .await
            .map_err(|_| FeedClientError::Timeout("send", self.config.send_timeout))??;
        Ok(())
    }
}

/// Instruments in `current` that are absent from `next`.
fn removed_instruments(
    current: &[SubscriptionInstrument],
    next: &[SubscriptionInstrument],
) -> Vec<SubscriptionInstrument> {
    let keep: HashSet<&SubscriptionInstrument> = next.iter().collect();
    current
        .iter()
        .filter(|inst| !keep.contains(inst))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_data::{PacketHeader, PacketType, TickerPacket};
    use tokio::net::TcpListener;

    fn config(url: String) -> FeedClientConfig {
        FeedClientConfig {
            url,
            mode: FeedMode::Ticker,
            instruments: vec![
                SubscriptionInstrument::new("NSE_FNO", "35001"),
                SubscriptionInstrument::new("NSE_FNO", "35002"),
            ],
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                max_attempts: 2,
                ..ReconnectConfig::default()
            },
            connect_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(30),
        }
    }

    fn ticker_frame(security_id: u32, price: f32) -> Vec<u8> {
        DhanCodec::new().encode(&FeedPacket::Ticker(TickerPacket {
            header: PacketHeader {
                packet_type: PacketType::Ticker.as_byte(),
                message_length: 16,
                exchange_segment: 2,
                security_id,
            },
            last_price: price,
            last_trade_time: 1_700_000_000,
        }))
    }

    #[test]
    fn debug_hides_token() {
        let cfg = config("wss://api-feed.dhan.co?version=2&token=secret&clientId=1&authType=2".into());
        let debug = format!("{cfg:?}");
        assert!(debug.contains("wss://api-feed.dhan.co"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn removed_instruments_diffs_sets() {
        let a = SubscriptionInstrument::new("NSE_FNO", "1");
        let b = SubscriptionInstrument::new("NSE_FNO", "2");
        let c = SubscriptionInstrument::new("NSE_FNO", "3");
        let removed = removed_instruments(&[a.clone(), b.clone()], &[b, c]);
        assert_eq!(removed, vec![a]);
    }

    #[test]
    fn decode_failures_are_counted_not_fatal() {
        let (tx, _rx) = mpsc::channel(8);
        let state = Arc::new(FeedState::new());
        let (client, _handle) = DhanFeedClient::new(
            config("ws://unused".into()),
            Arc::clone(&state),
            tx,
            CancellationToken::new(),
        );

        assert!(client.decode_frame(&[]).is_none());
        assert!(client.decode_frame(&[2, 0, 0]).is_none());
        assert!(client.decode_frame(&ticker_frame(35_001, 101.5)).is_some());

        let status = state.snapshot();
        assert_eq!(status.packets_received, 3);
        assert_eq!(status.decode_errors, 2);
        assert_eq!(status.subscription_count, 2);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::channel(32);
        let state = Arc::new(FeedState::new());
        let (client, _handle) = DhanFeedClient::new(
            config(format!("ws://{addr}")),
            Arc::clone(&state),
            tx,
            CancellationToken::new(),
        );

        let result = Arc::new(client).run().await;
        assert!(matches!(
            result,
            Err(FeedClientError::Reconnect(ReconnectError::MaxAttemptsExceeded(2)))
        ));

        let mut delays = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let FeedEvent::Reconnecting { delay, .. } = event {
                delays.push(delay);
            }
        }
        assert_eq!(delays, vec![Duration::from_millis(5), Duration::from_millis(10)]);
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert!(state.snapshot().error_message.is_some());
    }

    #[tokio::test]
    async fn cancelled_client_exits_immediately() {
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (client, _handle) =
            DhanFeedClient::new(config("ws://127.0.0.1:1".into()), Arc::new(FeedState::new()), tx, cancel);
        assert!(Arc::new(client).run().await.is_ok());
    }

    #[tokio::test]
    async fn subscribes_streams_and_resubscribes_in_place() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let mut received = Vec::new();
            let first = ws.next().await.unwrap().unwrap();
            received.push(first.into_text().unwrap().to_string());

            ws.send(Message::Binary(vec![0xFF, 1, 2].into())).await.unwrap();
            ws.send(Message::Binary(ticker_frame(35_001, 101.5).into()))
                .await
                .unwrap();

            while received.len() < 3 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => received.push(text.to_string()),
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            received
        });

        let (tx, mut rx) = mpsc::channel(32);
        let state = Arc::new(FeedState::new());
        let cancel = CancellationToken::new();
        let mut cfg = config(format!("ws://{addr}"));
        cfg.reconnect.max_attempts = 0;
        let (client, handle) = DhanFeedClient::new(
            cfg,
            Arc::clone(&state),
            tx,
            cancel.clone(),
        );
        let client = Arc::new(client);
        let task = tokio::spawn(Arc::clone(&client).run());

        assert!(matches!(
            rx.recv().await,
            Some(FeedEvent::Connected { instruments: 2 })
        ));
        match rx.recv().await {
            Some(FeedEvent::Packet(packet)) => assert_eq!(packet.security_id(), Some(35_001)),
            other => panic!("expected packet, got {other:?}"),
        }
        assert_eq!(state.snapshot().decode_errors, 1);

        let next = vec![
            SubscriptionInstrument::new("NSE_FNO", "35002"),
            SubscriptionInstrument::new("NSE_FNO", "35003"),
        ];
        handle.resubscribe(next.clone()).unwrap();
        match rx.recv().await {
            Some(FeedEvent::Resubscribed { instruments }) => assert_eq!(instruments, next),
            other => panic!("expected resubscribe, got {other:?}"),
        }
        assert_eq!(client.subscriptions(), next);

        let received = server.await.unwrap();
        assert!(received[0].contains("\"RequestCode\":15"));
        assert!(received[1].contains("\"RequestCode\":16"));
        assert!(received[1].contains("35001"));
        assert!(received[2].contains("35003"));

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
