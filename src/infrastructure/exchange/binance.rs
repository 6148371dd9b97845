// src/infrastructure/exchange/binance.rs
// Binance spot gateway over the REST API

use async_trait::async_trait;
use binance_spot_connector_rust::{
    http::{request::Request, Credentials},
    hyper::BinanceHttpClient,
    market, trade,
    trade::order::{Side, TimeInForce as BinanceTimeInForce},
};
use futures_util::stream::BoxStream;
use hyper::client::HttpConnector;
use hyper_tls::HttpsConnector;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{
    ListingAnnouncement, ListingEvent, OrderRequest, OrderResponse, OrderSide, OrderType,
    QuantityKind, TimeInForce,
};
use crate::domain::repository::ExchangeGateway;
use crate::infrastructure::exchange::dto::{ExchangeInfoPayload, OrderPayload, TickerPricePayload};

const TESTNET_URL: &str = "https://testnet.binance.vision";

pub struct BinanceGateway {
    client: BinanceHttpClient<HttpsConnector<HttpConnector>>,
}

impl BinanceGateway {
    pub fn new(api_key: &str, api_secret: &str, testnet: bool) -> Self {
        let credentials = Credentials::from_hmac(api_key.to_string(), api_secret.to_string());
        let client = if testnet {
            BinanceHttpClient::with_url(TESTNET_URL)
        } else {
            BinanceHttpClient::default()
        };
        Self {
            client: client.credentials(credentials),
        }
    }

    async fn send_raw(&self, request: impl Into<Request>) -> ExchangeResult<String> {
        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| ExchangeError::from_venue_message(format!("{:?}", e)))?;
        response
            .into_body_str()
            .await
            .map_err(|e| ExchangeError::from_venue_message(format!("{:?}", e)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: impl Into<Request>) -> ExchangeResult<T> {
        let body = self.send_raw(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Api(format!("Unexpected response ({}): {}", e, body)))
    }
}

fn parse_order_id(order_id: &str) -> ExchangeResult<u64> {
    order_id
        .parse()
        .map_err(|_| ExchangeError::Request(format!("Invalid Binance order id: {}", order_id)))
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    fn name(&self) -> &str {
        "binance"
    }

    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse> {
        let side = match request.side {
            OrderSide::Buy => Side::Buy,
            OrderSide::Sell => Side::Sell,
        };

        let mut order = trade::new_order(&request.symbol, side, request.order_type.as_str());
        order = match request.quantity_kind {
            QuantityKind::Base => order.quantity(request.quantity),
            QuantityKind::Quote => order.quote_order_qty(request.quantity),
        };
        if request.order_type == OrderType::Limit {
            let tif = match request.time_in_force {
                TimeInForce::Gtc => BinanceTimeInForce::Gtc,
                TimeInForce::Ioc => BinanceTimeInForce::Ioc,
                TimeInForce::Fok => BinanceTimeInForce::Fok,
            };
            order = order.price(request.price).time_in_force(tif);
        }
        if let Some(client_order_id) = &request.client_order_id {
            order = order.new_client_order_id(client_order_id);
        }

        let payload: OrderPayload = self.send_json(order).await?;
        log::debug!("Binance accepted order {} for {}", payload.order_id, payload.symbol);
        payload.into_response(self.name())
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()> {
        let request = trade::cancel_order(symbol).order_id(parse_order_id(order_id)?);
        self.send_raw(request).await?;
        Ok(())
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        let request = trade::get_order(symbol).order_id(parse_order_id(order_id)?);
        let payload: OrderPayload = self.send_json(request).await?;
        payload.into_response(self.name())
    }

    async fn latest_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let ticker: TickerPricePayload = self
            .send_json(market::ticker_price().symbol(symbol))
            .await?;
        Ok(ticker.price)
    }

    async fn listing_events(&self) -> ExchangeResult<BoxStream<'static, ListingEvent>> {
        Err(ExchangeError::Unsupported(
            "Binance has no public listing channel; enable detector polling".to_string(),
        ))
    }

    async fn list_listings(&self) -> ExchangeResult<Vec<ListingAnnouncement>> {
        let info: ExchangeInfoPayload = self.send_json(market::exchange_info()).await?;
        Ok(info.into_announcements())
    }
}
