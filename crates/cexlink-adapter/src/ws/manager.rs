/*
[INPUT]:  StrategySet, WsConnector, ReconnectPolicy, tracked symbols
[OUTPUT]: StreamEvent values (parsed messages + state changes) and a `watch` state
[POS]:    WebSocket layer - connect/authenticate/subscribe/read lifecycle per stream
[UPDATE]: When changing reconnection semantics, liveness checks or shutdown behavior
*/

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{WsConnection, WsConnector};
use super::metrics::{MetricsSnapshot, PerformanceMetrics};
use super::registry::StrategySet;
use super::strategy::{ConnectionContext, truncate_for_log};
use crate::config::ReconnectPolicy;
use crate::http::{ExchangeError, Result};
use crate::types::{
    ConnectionState, InboundFrame, MessagePayload, MessageType, ParsedMessage, SubscriptionAction,
    Symbol,
};

const SUBSCRIPTION_LOG_LIMIT: u64 = 10;
const MESSAGE_SAMPLE_LIMIT: u64 = 3;
const SUBSCRIPTION_LOG_MAX_BYTES: usize = 256;

/// Everything a stream publishes, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(ParsedMessage),
    StateChanged(ConnectionState),
}

#[derive(Debug)]
enum ManagerCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

/// Current state behind `watch`, mirrored into the event channel.
///
/// Once CLOSING or CLOSED is reached only CLOSED may follow.
#[derive(Debug)]
struct StateCell {
    tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<StreamEvent>,
    shutdown: CancellationToken,
}

impl StateCell {
    fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            let frozen = matches!(current, ConnectionState::Closing | ConnectionState::Closed)
                && next != ConnectionState::Closed;
            if frozen || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    /// Worker-side transition. Blocks on a full event channel unless shutting down.
    async fn set(&self, next: ConnectionState) {
        if !self.transition(next) {
            return;
        }
        let event = StreamEvent::StateChanged(next);
        if self.shutdown.is_cancelled() {
            let _ = self.events.try_send(event);
            return;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = self.events.send(event) => {}
        }
    }

    /// Caller-side transition used by `close()`; never waits on consumers.
    fn set_now(&self, next: ConnectionState) {
        if self.transition(next) {
            let _ = self.events.try_send(StreamEvent::StateChanged(next));
        }
    }
}

#[derive(Debug)]
struct Launch {
    cmd_rx: Option<mpsc::UnboundedReceiver<ManagerCommand>>,
    handle: Option<JoinHandle<()>>,
}

/// Owns one streaming connection and its subscription bookkeeping.
///
/// The socket lives in a single worker task; callers interact through
/// commands, the shared symbol set and the state `watch`.
#[derive(Debug)]
pub struct ConnectionManager {
    name: String,
    strategies: StrategySet,
    connector: Arc<dyn WsConnector>,
    policy: ReconnectPolicy,
    state: Arc<StateCell>,
    events: mpsc::Sender<StreamEvent>,
    symbols: Arc<Mutex<BTreeSet<Symbol>>>,
    metrics: Arc<PerformanceMetrics>,
    shutdown: CancellationToken,
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
    launch: Mutex<Launch>,
}

impl ConnectionManager {
    /// `event_buffer` bounds the event channel; a full channel blocks the read loop.
    pub fn new(
        name: impl Into<String>,
        strategies: StrategySet,
        connector: Arc<dyn WsConnector>,
        policy: ReconnectPolicy,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let manager = Self {
            name: name.into(),
            strategies,
            connector,
            policy,
            state: Arc::new(StateCell {
                tx: state_tx,
                events: events_tx.clone(),
                shutdown: shutdown.clone(),
            }),
            events: events_tx,
            symbols: Arc::new(Mutex::new(BTreeSet::new())),
            metrics: Arc::new(PerformanceMetrics::new()),
            shutdown,
            cmd_tx,
            launch: Mutex::new(Launch {
                cmd_rx: Some(cmd_rx),
                handle: None,
            }),
        };
        (manager, events_rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn parse_error_count(&self) -> u64 {
        self.strategies.parser.error_count()
    }

    pub async fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.symbols.lock().await.iter().cloned().collect()
    }

    /// Track `symbols` and start the worker. Returns once the worker is
    /// spawned; observe progress through [`ConnectionManager::subscribe_state`].
    pub async fn initialize(&self, symbols: &[Symbol]) -> Result<()> {
        if self.shutdown.is_cancelled() || self.state.get().is_terminal() {
            return Err(ExchangeError::Cancelled);
        }

        let mut launch = self.launch.lock().await;
        let Some(cmd_rx) = launch.cmd_rx.take() else {
            return Err(ExchangeError::Config(format!(
                "connection {} already initialized",
                self.name
            )));
        };

        self.symbols.lock().await.extend(symbols.iter().cloned());

        let worker = ConnectionWorker {
            name: self.name.clone(),
            strategies: self.strategies.clone(),
            connector: self.connector.clone(),
            policy: self.policy.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            symbols: self.symbols.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
            cmd_rx,
            subscription_logs: 0,
            message_samples: 0,
        };
        launch.handle = Some(tokio::spawn(worker.run()));
        info!(name = %self.name, symbols = symbols.len(), "connection manager started");
        Ok(())
    }

    /// Track a symbol; subscribes immediately when connected, otherwise on connect.
    pub async fn add_symbol(&self, symbol: Symbol) -> Result<()> {
        if self.state.get().is_terminal() {
            return Err(ExchangeError::NotConnected);
        }
        if self.symbols.lock().await.insert(symbol.clone()) {
            let _ = self.cmd_tx.send(ManagerCommand::Subscribe(symbol));
        }
        Ok(())
    }

    pub async fn remove_symbol(&self, symbol: &Symbol) -> Result<()> {
        if self.state.get().is_terminal() {
            return Err(ExchangeError::NotConnected);
        }
        if self.symbols.lock().await.remove(symbol) {
            let _ = self.cmd_tx.send(ManagerCommand::Unsubscribe(symbol.clone()));
        }
        Ok(())
    }

    /// Wait until the state satisfies `predicate` or `timeout` elapses.
    pub async fn wait_for_state<F>(&self, timeout: Duration, predicate: F) -> Result<ConnectionState>
    where
        F: Fn(&ConnectionState) -> bool,
    {
        let mut rx = self.state.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|state| predicate(state))).await {
            Err(_) => Err(ExchangeError::Timeout(timeout)),
            Ok(Err(_)) => Err(ExchangeError::NotConnected),
            Ok(Ok(state)) => Ok(*state),
        }
    }

    /// Cancel the read loop and any pending backoff. Idempotent.
    pub async fn close(&self) {
        if self.state.get() == ConnectionState::Closed {
            return;
        }

        self.state.set_now(ConnectionState::Closing);
        self.shutdown.cancel();

        let handle = self.launch.lock().await.handle.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(name = %self.name, error = %err, "connection worker ended abnormally");
            }
        }

        self.state.set_now(ConnectionState::Closed);
        info!(name = %self.name, "connection closed");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug)]
enum SessionExit {
    Shutdown,
    Failed { error: ExchangeError, connected: bool },
}

struct ConnectionWorker {
    name: String,
    strategies: StrategySet,
    connector: Arc<dyn WsConnector>,
    policy: ReconnectPolicy,
    state: Arc<StateCell>,
    events: mpsc::Sender<StreamEvent>,
    symbols: Arc<Mutex<BTreeSet<Symbol>>>,
    metrics: Arc<PerformanceMetrics>,
    shutdown: CancellationToken,
    cmd_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    subscription_logs: u64,
    message_samples: u64,
}

impl ConnectionWorker {
    async fn run(mut self) {
        // consecutive failed attempts; reset after a stable connected period
        let mut failures: u32 = 0;
        let mut has_connected = false;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.state.set(ConnectionState::Connecting).await;

            match self.run_session(&mut failures, has_connected).await {
                SessionExit::Shutdown => break,
                SessionExit::Failed { error, connected } => {
                    has_connected |= connected;
                    failures = failures.saturating_add(1);
                    self.metrics.record_error();

                    if !self.strategies.connection.should_reconnect(&error) {
                        warn!(name = %self.name, error = %error, "connection error is not recoverable");
                        self.terminate(error).await;
                        return;
                    }

                    if failures >= self.policy.max_attempts {
                        warn!(
                            name = %self.name,
                            failures,
                            max_attempts = self.policy.max_attempts,
                            error = %error,
                            "connection gave up reconnecting"
                        );
                        self.terminate(error).await;
                        return;
                    }

                    let backoff = self.policy.backoff(failures);
                    self.state.set(ConnectionState::Reconnecting).await;
                    self.metrics.record_reconnection();
                    warn!(
                        name = %self.name,
                        failures,
                        ?backoff,
                        error = %error,
                        "connection failed; retrying with backoff"
                    );

                    if !self.sleep_backoff(backoff).await {
                        break;
                    }
                }
            }
        }

        debug!(name = %self.name, "connection worker stopped");
    }

    async fn terminate(&mut self, error: ExchangeError) {
        error!(name = %self.name, error = %error, "connection terminated");
        let message = ParsedMessage::new(MessagePayload::Error {
            code: None,
            message: format!("connection {} terminated: {error}", self.name),
        })
        .with_channel("connection");
        self.publish(StreamEvent::Message(message)).await;
        self.state.set(ConnectionState::Error).await;
        self.state.set(ConnectionState::Closed).await;
    }

    /// Returns false when shutdown interrupted the wait.
    async fn sleep_backoff(&mut self, backoff: Duration) -> bool {
        let sleep = tokio::time::sleep(backoff);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => {
                    // symbol set is already updated; replayed on connect
                    if cmd.is_none() {
                        return false;
                    }
                }
            }
        }
    }

    async fn run_session(&mut self, failures: &mut u32, reconnecting: bool) -> SessionExit {
        let connection = self.strategies.connection.clone();

        let ctx = tokio::select! {
            _ = self.shutdown.cancelled() => return SessionExit::Shutdown,
            ctx = connection.create_connection_context() => ctx,
        };
        let ctx = match ctx {
            Ok(ctx) => ctx,
            Err(error) => return SessionExit::Failed { error, connected: false },
        };

        let conn = tokio::select! {
            _ = self.shutdown.cancelled() => return SessionExit::Shutdown,
            conn = self.connector.connect(&ctx) => conn,
        };
        let mut conn = match conn {
            Ok(conn) => conn,
            Err(error) => return SessionExit::Failed { error, connected: false },
        };

        let authenticated = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = connection.authenticate(conn.as_mut()) => Some(result),
        };
        let error = match authenticated {
            None => {
                conn.close().await;
                return SessionExit::Shutdown;
            }
            Some(Ok(true)) => None,
            Some(Ok(false)) => Some(ExchangeError::authentication("authentication handshake rejected")),
            Some(Err(error)) => Some(error),
        };
        if let Some(error) = error {
            conn.close().await;
            return SessionExit::Failed { error, connected: false };
        }

        self.state.set(ConnectionState::Connected).await;
        info!(name = %self.name, url = %ctx.url, reconnecting, "connection established");

        if !reconnecting || self.strategies.subscription.should_resubscribe_on_reconnect() {
            if let Err(error) = self.subscribe_tracked(conn.as_mut()).await {
                conn.close().await;
                return SessionExit::Failed { error, connected: true };
            }
        }

        let exit = self.read_loop(conn.as_mut(), &ctx, failures).await;
        conn.close().await;
        exit
    }

    async fn read_loop(
        &mut self,
        conn: &mut dyn WsConnection,
        ctx: &ConnectionContext,
        failures: &mut u32,
    ) -> SessionExit {
        let stable = tokio::time::sleep(self.policy.stable_after());
        tokio::pin!(stable);
        let mut stable_reached = false;

        let mut ping = periodic(ctx.ping_interval);
        let mut keepalive = self.strategies.connection.keepalive_interval().map(periodic);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(name = %self.name, "shutdown requested");
                    return SessionExit::Shutdown;
                }
                _ = &mut stable, if !stable_reached => {
                    stable_reached = true;
                    if *failures > 0 {
                        debug!(name = %self.name, failures = *failures, "connection stable; attempt counter reset");
                    }
                    *failures = 0;
                }
                _ = ping.tick() => {
                    if last_inbound.elapsed() >= ctx.ping_timeout {
                        warn!(name = %self.name, timeout = ?ctx.ping_timeout, "no inbound frames; connection is stale");
                        return SessionExit::Failed {
                            error: ExchangeError::Timeout(ctx.ping_timeout),
                            connected: true,
                        };
                    }
                    let sent = match self.strategies.connection.ping_message() {
                        Some(text) => conn.send_text(text).await,
                        None => conn.send_ping().await,
                    };
                    if let Err(error) = sent {
                        return SessionExit::Failed { error, connected: true };
                    }
                }
                _ = tick_optional(&mut keepalive) => {
                    self.spawn_keepalive();
                }
                cmd = self.cmd_rx.recv() => {
                    let (symbol, action) = match cmd {
                        Some(ManagerCommand::Subscribe(symbol)) => (symbol, SubscriptionAction::Subscribe),
                        Some(ManagerCommand::Unsubscribe(symbol)) => (symbol, SubscriptionAction::Unsubscribe),
                        None => return SessionExit::Shutdown,
                    };
                    if let Err(error) = self.send_symbol(conn, symbol, action).await {
                        return SessionExit::Failed { error, connected: true };
                    }
                }
                frame = conn.next_frame() => {
                    match frame {
                        None => {
                            return SessionExit::Failed {
                                error: ExchangeError::transport("connection closed by peer"),
                                connected: true,
                            };
                        }
                        Some(Err(error)) => return SessionExit::Failed { error, connected: true },
                        Some(Ok(frame)) => {
                            last_inbound = Instant::now();
                            if !self.handle_frame(frame).await {
                                return SessionExit::Shutdown;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Parse and publish one frame. Returns false when shutdown interrupted publishing.
    async fn handle_frame(&mut self, frame: InboundFrame) -> bool {
        let started = Instant::now();
        let errors_before = self.strategies.parser.error_count();
        let message = self.strategies.parser.parse_message(&frame);
        if self.strategies.parser.error_count() > errors_before {
            self.metrics.record_parse_error();
        }
        self.metrics.record_message(frame.len(), started.elapsed());

        if message.message_type() == MessageType::Unknown {
            return true;
        }

        if self.message_samples < MESSAGE_SAMPLE_LIMIT {
            self.message_samples += 1;
            info!(
                name = %self.name,
                sample_index = self.message_samples,
                sample_limit = MESSAGE_SAMPLE_LIMIT,
                message_type = ?message.message_type(),
                symbol = ?message.symbol,
                channel = ?message.channel,
                "ws message sample"
            );
        }

        self.publish(StreamEvent::Message(message)).await
    }

    async fn publish(&self, event: StreamEvent) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            result = self.events.send(event) => {
                if result.is_err() {
                    debug!(name = %self.name, "event receiver dropped");
                }
                true
            }
        }
    }

    async fn subscribe_tracked(&mut self, conn: &mut dyn WsConnection) -> Result<()> {
        // queued commands are already reflected in the symbol set
        while self.cmd_rx.try_recv().is_ok() {}

        let symbols: Vec<Symbol> = self.symbols.lock().await.iter().cloned().collect();
        let subscription = self.strategies.subscription.clone();

        let mut messages = subscription.create_account_messages(SubscriptionAction::Subscribe)?;
        if !symbols.is_empty() {
            messages.extend(
                subscription.create_subscription_messages(&symbols, SubscriptionAction::Subscribe)?,
            );
        }

        debug!(name = %self.name, symbols = symbols.len(), messages = messages.len(), "subscribing tracked symbols");
        self.send_all(conn, messages, SubscriptionAction::Subscribe).await
    }

    async fn send_symbol(
        &mut self,
        conn: &mut dyn WsConnection,
        symbol: Symbol,
        action: SubscriptionAction,
    ) -> Result<()> {
        let messages = match self
            .strategies
            .subscription
            .create_subscription_messages(std::slice::from_ref(&symbol), action)
        {
            Ok(messages) => messages,
            Err(error) => {
                warn!(name = %self.name, %symbol, ?action, error = %error, "cannot build subscription message");
                return Ok(());
            }
        };
        self.send_all(conn, messages, action).await
    }

    async fn send_all(
        &mut self,
        conn: &mut dyn WsConnection,
        messages: Vec<String>,
        action: SubscriptionAction,
    ) -> Result<()> {
        for message in messages {
            if self.subscription_logs < SUBSCRIPTION_LOG_LIMIT {
                self.subscription_logs += 1;
                info!(
                    name = %self.name,
                    ?action,
                    message = %truncate_for_log(&message, SUBSCRIPTION_LOG_MAX_BYTES),
                    "subscription message sent"
                );
            }
            conn.send_text(message).await?;
        }
        Ok(())
    }

    fn spawn_keepalive(&self) {
        let connection = self.strategies.connection.clone();
        let shutdown = self.shutdown.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = connection.keepalive() => {
                    match result {
                        Ok(()) => debug!(%name, "session keepalive sent"),
                        Err(error) => warn!(%name, error = %error, "session keepalive failed"),
                    }
                }
            }
        });
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
