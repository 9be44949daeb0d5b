//! Durable WebSocket sessions with reconnect, heartbeat and TLS pinning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use config::{BackoffConfig, WsConfig};

use crate::adapters::ExchangeAdapter;
use crate::error::{IngestError, Result};
use crate::metrics::{
    mark_ws_connect, mark_ws_error, mark_ws_msg, mark_ws_overflow_drop, mark_ws_reconnect,
    observe_connect_duration,
};
use crate::queue::EventQueue;
use crate::tls;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle states of a consumer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

/// Always-on stream of normalized events from one venue endpoint.
///
/// On any disconnect or error the consumer reconnects with exponential
/// backoff plus jitter; the retry counter resets on a successful connect and
/// `max_retries = 0` retries forever. Events land in a bounded queue that
/// drops oldest on overflow so a stalled downstream never blocks the socket.
pub struct WsConsumer {
    adapter: Arc<dyn ExchangeAdapter>,
    /// (symbol, tf) streams to subscribe.
    streams: Vec<(String, String)>,
    cfg: WsConfig,
    url: String,
    tls_pin_sha256: Option<String>,
    queue: Arc<EventQueue>,
    state: Mutex<ConsumerState>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl WsConsumer {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        streams: Vec<(String, String)>,
        cfg: WsConfig,
        tls_pin_sha256: Option<String>,
    ) -> Self {
        let url = adapter.ws_url().to_string();
        Self {
            adapter,
            streams,
            queue: Arc::new(EventQueue::new(cfg.max_queue)),
            cfg,
            url,
            tls_pin_sha256,
            state: Mutex::new(ConsumerState::Idle),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    /// Override the endpoint, e.g. for a local test server.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn source(&self) -> &'static str {
        self.adapter.venue()
    }

    /// The queue this consumer yields events into.
    pub fn queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Request a clean stop; the running session closes its socket.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock() = state;
    }

    /// Run the session on a background task.
    pub fn spawn(self: Arc<Self>) -> WsConsumerHandle {
        let consumer = self.clone();
        let task = tokio::spawn(async move { consumer.run().await });
        WsConsumerHandle {
            consumer: self,
            task,
        }
    }

    /// Connect-stream-reconnect loop; returns once closed or retries are
    /// exhausted.
    pub async fn run(&self) {
        let venue = self.adapter.venue();
        let mut failures: u32 = 0;
        while !self.is_closed() {
            self.set_state(ConsumerState::Connecting);
            match self.connect_and_stream(&mut failures).await {
                Ok(()) => break,
                Err(err) => {
                    if self.is_closed() {
                        break;
                    }
                    mark_ws_error(venue);
                    mark_ws_reconnect(venue);
                    failures += 1;
                    if self.cfg.max_retries > 0 && failures > self.cfg.max_retries {
                        tracing::error!(
                            venue,
                            attempts = failures,
                            "giving up after max reconnect attempts"
                        );
                        break;
                    }
                    let delay = backoff_delay(&self.cfg.backoff, failures.saturating_sub(1));
                    tracing::warn!(venue, error = %err, delay_ms = delay.as_millis() as u64, "ws error, reconnecting");
                    self.set_state(ConsumerState::Reconnecting);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.close_notify.notified() => break,
                    }
                }
            }
        }
        self.set_state(ConsumerState::Closed);
    }

    async fn connect_and_stream(&self, failures: &mut u32) -> Result<()> {
        let venue = self.adapter.venue();
        let connector = match &self.tls_pin_sha256 {
            Some(pin) => Some(tls::pinned_connector(pin)?),
            None => None,
        };

        let started = std::time::Instant::now();
        let connect_timeout = Duration::from_secs_f64(self.cfg.connect_timeout_sec.max(0.001));
        let connect =
            tokio_tungstenite::connect_async_tls_with_config(self.url.as_str(), None, false, connector);
        let (mut ws, response) = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| IngestError::ConnectionTimeout {
                venue: venue.to_string(),
                timeout_ms: connect_timeout.as_millis() as u64,
            })??;

        // successful connect resets the backoff ladder
        *failures = 0;
        observe_connect_duration(started.elapsed().as_secs_f64());
        mark_ws_connect(venue);
        self.set_state(ConsumerState::Open);
        tracing::info!(venue, status = %response.status(), url = %self.url, "connected");

        self.send_subscriptions(&mut ws).await?;
        self.read_loop(&mut ws).await
    }

    /// Issue subscription messages in batches of at most
    /// `subscribe_batch_size`.
    async fn send_subscriptions(&self, ws: &mut WsStream) -> Result<()> {
        let payloads: Vec<String> = self
            .streams
            .iter()
            .map(|(symbol, tf)| self.adapter.subscribe(symbol, tf).to_string())
            .collect();
        for chunk in payloads.chunks(self.cfg.subscribe_batch_size.max(1)) {
            for payload in chunk {
                ws.send(Message::Text(payload.clone())).await?;
            }
        }
        tracing::info!(
            venue = self.adapter.venue(),
            streams = payloads.len(),
            "subscribed"
        );
        Ok(())
    }

    async fn read_loop(&self, ws: &mut WsStream) -> Result<()> {
        let venue = self.adapter.venue();
        let ping_interval = Duration::from_secs_f64(self.cfg.ping_interval_sec.max(0.001));
        let pong_timeout = Duration::from_secs_f64(self.cfg.pong_timeout_sec.max(0.001));
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + ping_interval,
            ping_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_frame = std::time::Instant::now();

        loop {
            tokio::select! {
                _ = self.close_notify.notified() => {
                    let _ = ws.close(None).await;
                    tracing::info!(venue, "consumer stopped");
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    if last_frame.elapsed() > pong_timeout {
                        return Err(IngestError::ConnectionTimeout {
                            venue: venue.to_string(),
                            timeout_ms: pong_timeout.as_millis() as u64,
                        });
                    }
                    ws.send(Message::Ping(Vec::new())).await?;
                }
                frame = ws.next() => {
                    last_frame = std::time::Instant::now();
                    match frame {
                        None => {
                            return Err(IngestError::ConnectionClosed {
                                venue: venue.to_string(),
                                reason: None,
                            })
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(msg)) => self.handle_frame(msg, ws).await?,
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, msg: Message, ws: &mut WsStream) -> Result<()> {
        let venue = self.adapter.venue();
        match msg {
            Message::Text(text) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        mark_ws_error(venue);
                        tracing::warn!(venue, error = %e, "invalid JSON frame, skipping");
                        return Ok(());
                    }
                };
                match self.adapter.parse(&value) {
                    Ok(Some(event)) => {
                        mark_ws_msg(venue);
                        if !self.queue.push(event) {
                            mark_ws_overflow_drop(venue);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        mark_ws_error(venue);
                        tracing::debug!(venue, error = %e, "frame failed to parse");
                    }
                }
                Ok(())
            }
            // binary frames are ignored unless an adapter opts in
            Message::Binary(_) => Ok(()),
            Message::Ping(data) => {
                ws.send(Message::Pong(data)).await?;
                Ok(())
            }
            Message::Pong(_) => Ok(()),
            Message::Close(frame) => Err(IngestError::ConnectionClosed {
                venue: venue.to_string(),
                reason: frame.map(|f| f.reason.to_string()),
            }),
            Message::Frame(_) => Ok(()),
        }
    }
}

/// Handle to a spawned consumer task.
pub struct WsConsumerHandle {
    consumer: Arc<WsConsumer>,
    task: JoinHandle<()>,
}

impl WsConsumerHandle {
    pub fn close(&self) {
        self.consumer.close();
    }

    pub async fn join(self) {
        self.consumer.close();
        let _ = self.task.await;
    }
}

/// Backoff before reconnect attempt `failures` (0-based):
/// `min(max, initial * factor^failures)` plus up to half a second of jitter.
pub(crate) fn backoff_delay(cfg: &BackoffConfig, failures: u32) -> Duration {
    let exp = cfg.factor.powi(failures.min(63) as i32);
    let base = (cfg.initial_sec * exp).min(cfg.max_sec);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
    Duration::from_secs_f64(base + jitter)
}
