/*
[INPUT]:  ExchangeConfig, StrategyRegistry, ExchangeEventHandler, ReversalPolicy
[OUTPUT]: One exchange facade: public/private streams, trading commands, positions
[POS]:    Composition layer - the unit applications depend on per exchange
[UPDATE]: When changing stream wiring, position feeding or shutdown ordering
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use cexlink_adapter::{
    ApiCredentials, AssetBalance, ConnectionManager, ConnectionState, ExchangeConfig, ExchangeContext,
    ExchangeError, ExchangeId, MessagePayload, Order, OrderRequest, StrategyRegistry, StreamEvent,
    Symbol, TradingApi, TungsteniteConnector, WsConnector, rest_transport, trading_api,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectivityConfig;
use crate::events::{ExchangeEventHandler, StreamKind, dispatch};
use crate::position::{Position, PositionTracker, ReversalPolicy};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const ORDER_QUEUE_CAPACITY: usize = 1024;

pub type PositionSnapshot = HashMap<Symbol, Position>;

/// Receivers parked between construction and `initialize`.
struct PendingStreams {
    public_rx: mpsc::Receiver<StreamEvent>,
    private_rx: Option<mpsc::Receiver<StreamEvent>>,
    positions_tx: watch::Sender<PositionSnapshot>,
}

pub struct CompositeExchange {
    config: Arc<ExchangeConfig>,
    trading: Arc<dyn TradingApi>,
    public: ConnectionManager,
    private: Option<ConnectionManager>,
    handler: Arc<dyn ExchangeEventHandler>,
    policy: ReversalPolicy,
    positions_rx: watch::Receiver<PositionSnapshot>,
    pending: Mutex<Option<PendingStreams>>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for CompositeExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeExchange")
            .field("exchange", &self.config.exchange)
            .field("public", &self.public.state())
            .field("private", &self.private.as_ref().map(ConnectionManager::state))
            .field("policy", &self.policy)
            .finish()
    }
}

impl CompositeExchange {
    /// Build REST and streaming plumbing without connecting.
    ///
    /// The private stream exists only when credentials resolve from the
    /// config or the environment.
    pub fn new(
        config: ExchangeConfig,
        registry: &StrategyRegistry,
        handler: Arc<dyn ExchangeEventHandler>,
        policy: ReversalPolicy,
    ) -> anyhow::Result<Self> {
        let credentials = config.resolve_credentials().ok();
        Self::with_credentials(config, credentials, registry, handler, policy)
    }

    /// Like [`CompositeExchange::new`] with credentials decided by the caller;
    /// `None` yields a public-only exchange regardless of the environment.
    pub fn with_credentials(
        mut config: ExchangeConfig,
        credentials: Option<ApiCredentials>,
        registry: &StrategyRegistry,
        handler: Arc<dyn ExchangeEventHandler>,
        policy: ReversalPolicy,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .with_context(|| format!("invalid config for {}", config.exchange))?;

        let exchange = config.exchange;
        // Private strategy factories read credentials from the config.
        config.credentials = credentials.clone();
        let has_credentials = credentials.is_some();
        let rest = rest_transport(&config, credentials)
            .with_context(|| format!("create rest transport for {exchange}"))?;
        let ctx = ExchangeContext {
            config: Arc::new(config),
            rest: Arc::new(rest),
        };
        let trading = trading_api(&ctx).with_context(|| format!("create trading api for {exchange}"))?;

        let connector: Arc<dyn WsConnector> = Arc::new(TungsteniteConnector::new(Duration::from_millis(
            ctx.config.connect_timeout_ms,
        )));

        let public_strategies = registry
            .create(exchange, false, &ctx)
            .with_context(|| format!("create public strategies for {exchange}"))?;
        let (public, public_rx) = ConnectionManager::new(
            format!("{exchange}-public"),
            public_strategies,
            connector.clone(),
            ctx.config.reconnect.clone(),
            ctx.config.event_buffer,
        );

        let (private, private_rx) = if has_credentials {
            let strategies = registry
                .create(exchange, true, &ctx)
                .with_context(|| format!("create private strategies for {exchange}"))?;
            let (manager, rx) = ConnectionManager::new(
                format!("{exchange}-private"),
                strategies,
                connector,
                ctx.config.reconnect.clone(),
                ctx.config.event_buffer,
            );
            (Some(manager), Some(rx))
        } else {
            info!(%exchange, "no credentials resolved, private stream disabled");
            (None, None)
        };

        let (positions_tx, positions_rx) = watch::channel(PositionSnapshot::new());

        Ok(Self {
            config: ctx.config,
            trading,
            public,
            private,
            handler,
            policy,
            positions_rx,
            pending: Mutex::new(Some(PendingStreams {
                public_rx,
                private_rx,
                positions_tx,
            })),
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// One composite per configured exchange, sharing `handler`.
    pub fn from_config(
        config: &ConnectivityConfig,
        registry: &StrategyRegistry,
        handler: Arc<dyn ExchangeEventHandler>,
    ) -> anyhow::Result<Vec<Self>> {
        config.validate()?;
        config
            .exchanges
            .iter()
            .map(|exchange| {
                Self::new(
                    exchange.clone(),
                    registry,
                    handler.clone(),
                    config.position.reversal_policy,
                )
            })
            .collect()
    }

    pub fn exchange(&self) -> ExchangeId {
        self.config.exchange
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn has_private_stream(&self) -> bool {
        self.private.is_some()
    }

    /// Start forwarding tasks and both streams. Callable once.
    pub async fn initialize(&self, symbols: &[Symbol]) -> cexlink_adapter::Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }
        let Some(pending) = self.pending.lock().await.take() else {
            return Err(ExchangeError::Config(format!(
                "{} already initialized",
                self.config.exchange
            )));
        };

        let exchange = self.config.exchange;
        let mut tasks = self.tasks.lock().await;
        tasks.push((
            "public-forwarder",
            tokio::spawn(forward_stream(
                exchange,
                StreamKind::Public,
                pending.public_rx,
                self.handler.clone(),
                None,
                self.shutdown.clone(),
            )),
        ));

        if let Some(private_rx) = pending.private_rx {
            let (order_tx, order_rx) = mpsc::channel(ORDER_QUEUE_CAPACITY);
            tasks.push((
                "position-writer",
                tokio::spawn(run_position_writer(
                    exchange,
                    PositionTracker::new(self.policy),
                    order_rx,
                    pending.positions_tx,
                )),
            ));
            tasks.push((
                "private-forwarder",
                tokio::spawn(forward_stream(
                    exchange,
                    StreamKind::Private,
                    private_rx,
                    self.handler.clone(),
                    Some(order_tx),
                    self.shutdown.clone(),
                )),
            ));
        }
        drop(tasks);

        self.public.initialize(symbols).await?;
        if let Some(private) = &self.private {
            private.initialize(symbols).await?;
        }
        info!(%exchange, symbols = symbols.len(), private = self.private.is_some(), "exchange initialized");
        Ok(())
    }

    pub async fn add_symbol(&self, symbol: Symbol) -> cexlink_adapter::Result<()> {
        if let Some(private) = &self.private {
            private.add_symbol(symbol.clone()).await?;
        }
        self.public.add_symbol(symbol).await
    }

    pub async fn remove_symbol(&self, symbol: &Symbol) -> cexlink_adapter::Result<()> {
        if let Some(private) = &self.private {
            private.remove_symbol(symbol).await?;
        }
        self.public.remove_symbol(symbol).await
    }

    pub fn public_state(&self) -> watch::Receiver<ConnectionState> {
        self.public.subscribe_state()
    }

    pub fn private_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.private.as_ref().map(ConnectionManager::subscribe_state)
    }

    pub fn public_stream(&self) -> &ConnectionManager {
        &self.public
    }

    pub fn private_stream(&self) -> Option<&ConnectionManager> {
        self.private.as_ref()
    }

    /// True only while the private stream is CONNECTED.
    pub fn is_trading_ready(&self) -> bool {
        self.private
            .as_ref()
            .is_some_and(|private| private.state().is_connected())
    }

    pub fn subscribe_positions(&self) -> watch::Receiver<PositionSnapshot> {
        self.positions_rx.clone()
    }

    pub fn positions(&self) -> PositionSnapshot {
        self.positions_rx.borrow().clone()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.positions_rx.borrow().get(symbol).cloned()
    }

    pub async fn place_order(&self, request: &OrderRequest) -> cexlink_adapter::Result<Order> {
        self.trading.place_order(request).await
    }

    pub async fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> cexlink_adapter::Result<Order> {
        self.trading.cancel_order(symbol, order_id).await
    }

    pub async fn get_balances(&self) -> cexlink_adapter::Result<HashMap<String, AssetBalance>> {
        self.trading.get_balances().await
    }

    pub async fn get_open_orders(&self, symbol: Option<&Symbol>) -> cexlink_adapter::Result<Vec<Order>> {
        self.trading.get_open_orders(symbol).await
    }

    /// Close both streams, then drain and join the forwarding tasks.
    /// Idempotent; tasks still running at the deadline are aborted.
    pub async fn close(&self) -> anyhow::Result<()> {
        if let Some(private) = &self.private {
            private.close().await;
        }
        self.public.close().await;
        self.shutdown.cancel();

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        // pop() joins in spawn order
        tasks.reverse();
        while let Some((name, mut handle)) = tasks.pop() {
            tokio::select! {
                res = &mut handle => {
                    if let Err(err) = res {
                        abort_all(tasks);
                        return Err(anyhow!("{name} task failed: {err}"));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    handle.abort();
                    abort_all(tasks);
                    return Err(anyhow!("shutdown timed out after {SHUTDOWN_TIMEOUT:?}"));
                }
            }
        }
        info!(exchange = %self.config.exchange, "exchange closed");
        Ok(())
    }
}

fn abort_all(tasks: Vec<(&'static str, JoinHandle<()>)>) {
    for (_, handle) in tasks {
        handle.abort();
    }
}

/// Deliver one stream's events in order; after cancellation drain what is
/// already buffered so final state changes still reach the handler.
async fn forward_stream(
    exchange: ExchangeId,
    stream: StreamKind,
    mut rx: mpsc::Receiver<StreamEvent>,
    handler: Arc<dyn ExchangeEventHandler>,
    orders: Option<mpsc::Sender<Order>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => handle_event(exchange, stream, &event, handler.as_ref(), orders.as_ref()).await,
                None => return,
            },
        }
    }

    while let Ok(event) = rx.try_recv() {
        handle_event(exchange, stream, &event, handler.as_ref(), orders.as_ref()).await;
    }
    debug!(%exchange, %stream, "stream forwarder stopped");
}

async fn handle_event(
    exchange: ExchangeId,
    stream: StreamKind,
    event: &StreamEvent,
    handler: &dyn ExchangeEventHandler,
    orders: Option<&mpsc::Sender<Order>>,
) {
    if let (Some(orders), StreamEvent::Message(message)) = (orders, event) {
        if let MessagePayload::Orders(updates) = &message.payload {
            for order in updates {
                if orders.send(order.clone()).await.is_err() {
                    warn!(%exchange, order_id = %order.order_id, "position writer gone, order update dropped");
                }
            }
        }
    }
    dispatch(handler, exchange, stream, event).await;
}

/// Sole owner of the tracker; publishes a fresh snapshot after every change.
async fn run_position_writer(
    exchange: ExchangeId,
    mut tracker: PositionTracker,
    mut orders: mpsc::Receiver<Order>,
    positions: watch::Sender<PositionSnapshot>,
) {
    while let Some(order) = orders.recv().await {
        let Some(change) = tracker.apply_order(&order) else {
            continue;
        };
        debug!(
            %exchange,
            symbol = %order.symbol,
            order_id = %order.order_id,
            qty_before = %change.qty_before,
            qty_after = %change.qty_after,
            price_after = %change.price_after,
            "position updated"
        );
        positions.send_replace(tracker.positions().clone());
    }
    debug!(%exchange, "position writer stopped");
}
