/*
[INPUT]:  Local WebSocket server speaking the MEXC public stream protocol
[OUTPUT]: Test results for TungsteniteConnector + ConnectionManager over real sockets
[POS]:    Integration tests - WebSocket
[UPDATE]: When connection lifecycle behavior changes
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cexlink_adapter::exchanges::mexc;
use cexlink_adapter::{
    ConnectionManager, ConnectionState, ExchangeConfig, ExchangeContext, ExchangeId,
    MessagePayload, ReconnectPolicy, StreamEvent, Symbol, TungsteniteConnector, rest_transport,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const DEPTH_FRAME: &str = r#"{"c":"spot@public.increase.depth.v3.api@BTCUSDT","d":{"asks":[{"p":"20290.89","v":"0.5"}],"bids":[],"e":"spot@public.increase.depth.v3.api","r":"1"},"s":"BTCUSDT","t":1661932660144}"#;

struct MockExchange {
    addr: SocketAddr,
    subscriptions: mpsc::UnboundedReceiver<String>,
    connections: Arc<AtomicUsize>,
}

/// Answers every subscription with one malformed frame and one depth frame.
/// With `drop_first_session`, the first socket is dropped right after.
async fn spawn_mock_exchange(drop_first_session: bool) -> MockExchange {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, subscriptions) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    let Message::Text(text) = frame else {
                        continue;
                    };
                    let text = text.as_str().to_string();
                    let is_subscription = text.contains("\"SUBSCRIPTION\"");
                    let _ = tx.send(text);
                    if is_subscription {
                        let _ = ws.send(Message::text("not json")).await;
                        let _ = ws.send(Message::text(DEPTH_FRAME)).await;
                        if drop_first_session && index == 0 {
                            return;
                        }
                    }
                }
            });
        }
    });

    MockExchange {
        addr,
        subscriptions,
        connections,
    }
}

fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay_ms: 10,
        backoff_factor: 2.0,
        max_delay_ms: 40,
        max_attempts,
        stable_after_ms: 3_600_000,
    }
}

fn public_manager(addr: SocketAddr, policy: ReconnectPolicy) -> (ConnectionManager, mpsc::Receiver<StreamEvent>) {
    let mut config = ExchangeConfig::defaults_for(ExchangeId::MexcSpot);
    config.ws_public_url = format!("ws://{addr}");
    let ctx = ExchangeContext {
        rest: Arc::new(rest_transport(&config, None).unwrap()),
        config: Arc::new(config),
    };
    let strategies = mexc::public_strategies(&ctx).unwrap();
    ConnectionManager::new(
        "mexc-public-test",
        strategies,
        Arc::new(TungsteniteConnector::default()),
        policy,
        64,
    )
}

#[tokio::test]
async fn test_dropped_session_reconnects_and_resubscribes() {
    let mut exchange = spawn_mock_exchange(true).await;
    let (manager, mut events) = public_manager(exchange.addr, policy(5));
    let btc = Symbol::spot("BTC", "USDT");
    manager.initialize(std::slice::from_ref(&btc)).await.unwrap();

    let books = tokio::time::timeout(Duration::from_secs(5), async {
        let mut books = Vec::new();
        while let Some(event) = events.recv().await {
            if let StreamEvent::Message(msg) = event {
                if let MessagePayload::Orderbook(book) = msg.payload {
                    books.push(book);
                    if books.len() == 2 {
                        break;
                    }
                }
            }
        }
        books
    })
    .await
    .expect("depth from both sessions");
    assert!(books.iter().all(|book| book.symbol == btc));

    for _ in 0..2 {
        let subscription = exchange.subscriptions.recv().await.unwrap();
        assert!(subscription.contains("spot@public.increase.depth.v3.api@BTCUSDT"));
    }
    assert_eq!(exchange.connections.load(Ordering::SeqCst), 2);
    assert_eq!(manager.parse_error_count(), 2);
    assert!(manager.metrics().reconnections >= 1);

    let state = manager
        .wait_for_state(Duration::from_secs(1), |state| *state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(state, ConnectionState::Connected);

    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_unreachable_endpoint_terminates_after_max_attempts() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (manager, mut events) = public_manager(addr, policy(2));
    manager.initialize(&[Symbol::spot("BTC", "USDT")]).await.unwrap();

    let state = manager
        .wait_for_state(Duration::from_secs(5), |state| *state == ConnectionState::Closed)
        .await
        .unwrap();
    assert_eq!(state, ConnectionState::Closed);

    let mut saw_error_state = false;
    let mut saw_error_message = false;
    while let Ok(event) = events.try_recv() {
        match event {
            StreamEvent::StateChanged(ConnectionState::Error) => saw_error_state = true,
            StreamEvent::Message(msg) if matches!(msg.payload, MessagePayload::Error { .. }) => {
                saw_error_message = true
            }
            _ => {}
        }
    }
    assert!(saw_error_state);
    assert!(saw_error_message);
    assert!(manager.add_symbol(Symbol::spot("ETH", "USDT")).await.is_err());
}
