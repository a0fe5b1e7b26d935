/*
[INPUT]:  Mock MEXC and Gate.io REST responses
[OUTPUT]: Test results for the TradingApi implementations
[POS]:    Integration tests - order placement, cancel, balances, open orders
[UPDATE]: When exchange REST payloads change
*/

mod common;

use std::sync::Arc;

use cexlink_adapter::exchanges::mexc::MexcRestApi;
use cexlink_adapter::{
    ExchangeContext, ExchangeError, ExchangeId, OrderRequest, OrderStatus, Side, Symbol,
    TradingApi, exchanges,
};
use common::{mock_config, setup_mock_server, signed_transport};
use rust_decimal_macros::dec;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(exchange: ExchangeId, server: &MockServer) -> Arc<dyn TradingApi> {
    let config = mock_config(exchange, server);
    let ctx = ExchangeContext {
        rest: signed_transport(&config),
        config: Arc::new(config),
    };
    exchanges::trading_api(&ctx).unwrap()
}

#[tokio::test]
async fn test_mexc_place_limit_order() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/order"))
        .and(query_param("symbol", "MXUSDT"))
        .and(query_param("side", "BUY"))
        .and(query_param("type", "LIMIT"))
        .and(query_param("quantity", "50"))
        .and(query_param("price", "0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "symbol": "MXUSDT",
            "orderId": "06a480e69e604477bfb48dddd5f0b750",
            "orderListId": -1,
            "price": "0.1",
            "origQty": "50",
            "type": "LIMIT",
            "side": "BUY",
            "transactTime": 1666676533741u64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::MexcSpot, &server);
    let request = OrderRequest::limit(Symbol::spot("MX", "USDT"), Side::Buy, dec!(50), dec!(0.1))
        .with_client_order_id("cli-42");
    let order = assert_ok!(api.place_order(&request).await);

    assert_eq!(order.order_id, "06a480e69e604477bfb48dddd5f0b750");
    assert_eq!(order.client_order_id.as_deref(), Some("cli-42"));
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.qty, dec!(50));
    assert_eq!(order.timestamp, 1666676533741);
}

#[tokio::test]
async fn test_mexc_cancel_unknown_order_is_not_found() {
    let server = setup_mock_server().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v3/order"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": -2011,
            "msg": "Unknown order sent."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::MexcSpot, &server);
    let err = api
        .cancel_order(&Symbol::spot("BTC", "USDT"), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::OrderNotFoundOrCancelled { .. }));
}

#[tokio::test]
async fn test_mexc_balances_and_listen_key() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "canTrade": true,
            "balances": [
                {"asset": "usdt", "free": "100.5", "locked": "4.5"},
                {"asset": "MX", "free": "3", "locked": "0"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/userDataStream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "listenKey": "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::MexcSpot, &server);
    let balances = assert_ok!(api.get_balances().await);
    assert_eq!(balances["USDT"].total(), dec!(105));
    assert_eq!(balances["MX"].free, dec!(3));

    let config = mock_config(ExchangeId::MexcSpot, &server);
    let rest = MexcRestApi::new(signed_transport(&config), exchanges::symbol_mapper(&config));
    let key = assert_ok!(rest.create_listen_key().await);
    assert!(key.starts_with("pqia91"));
}

#[tokio::test]
async fn test_mexc_open_orders_require_symbol() {
    let server = setup_mock_server().await;
    let api = api_for(ExchangeId::MexcSpot, &server);
    assert!(matches!(
        api.get_open_orders(None).await,
        Err(ExchangeError::Config(_))
    ));
}

#[tokio::test]
async fn test_gate_spot_place_order_sends_json_body() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/spot/orders"))
        .and(body_partial_json(serde_json::json!({
            "currency_pair": "BTC_USDT",
            "side": "sell",
            "type": "limit",
            "amount": "0.5",
            "price": "30000",
            "time_in_force": "ioc",
            "text": "t-mine"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "12332324",
            "text": "t-mine",
            "create_time_ms": "1611235200123",
            "update_time_ms": "1611235200123",
            "status": "closed",
            "currency_pair": "BTC_USDT",
            "type": "limit",
            "account": "spot",
            "side": "sell",
            "amount": "0.5",
            "price": "30000",
            "time_in_force": "ioc",
            "left": "0",
            "filled_total": "15000",
            "avg_deal_price": "30000",
            "finish_as": "filled"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::GateSpot, &server);
    let mut request = OrderRequest::limit(Symbol::spot("BTC", "USDT"), Side::Sell, dec!(0.5), dec!(30000))
        .with_client_order_id("mine");
    request.time_in_force = Some(cexlink_adapter::TimeInForce::Ioc);
    let order = assert_ok!(api.place_order(&request).await);

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_qty, dec!(0.5));
    assert_eq!(order.avg_fill_price, Some(dec!(30000)));
    assert_eq!(order.client_order_id.as_deref(), Some("t-mine"));
}

#[tokio::test]
async fn test_gate_spot_open_orders_flatten_pairs() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/spot/open_orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "currency_pair": "ETH_USDT",
                "total": 1,
                "orders": [{
                    "id": "1", "currency_pair": "ETH_USDT", "type": "limit", "side": "buy",
                    "amount": "2", "price": "1500", "left": "2", "status": "open"
                }]
            },
            {
                "currency_pair": "BTC_USDT",
                "total": 1,
                "orders": [{
                    "id": "2", "type": "limit", "side": "sell",
                    "amount": "1", "price": "40000", "left": "0.4", "status": "open"
                }]
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::GateSpot, &server);
    let orders = assert_ok!(api.get_open_orders(None).await);
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].symbol, Symbol::spot("BTC", "USDT"));
    assert_eq!(orders[1].status, OrderStatus::PartiallyFilled);
}

#[tokio::test]
async fn test_gate_futures_balance_and_cancel() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/futures/usdt/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": 1666,
            "currency": "USDT",
            "total": "9707.803567115145",
            "unrealised_pnl": "3371.248828",
            "available": "9706.739019446141"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v4/futures/usdt/orders/15675394"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 15675394,
            "contract": "BTC_USDT",
            "size": 6,
            "left": 6,
            "price": "3765",
            "fill_price": "0",
            "tif": "gtc",
            "status": "finished",
            "finish_as": "cancelled",
            "create_time": 1546569968.12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::GateFutures, &server);
    let balances = assert_ok!(api.get_balances().await);
    assert_eq!(balances["USDT"].free, dec!(9706.739019446141));

    let order = assert_ok!(api.cancel_order(&Symbol::futures("BTC", "USDT"), "15675394").await);
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.side, Side::Buy);
    assert_eq!(order.avg_fill_price, None);
}

#[tokio::test]
async fn test_gate_business_label_maps_to_insufficient_position() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/futures/usdt/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "label": "INSUFFICIENT_AVAILABLE",
            "message": "Insufficient available margin"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(ExchangeId::GateFutures, &server);
    let err = api
        .place_order(&OrderRequest::market(Symbol::futures("BTC", "USDT"), Side::Buy, dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InsufficientPosition { .. }));
}
