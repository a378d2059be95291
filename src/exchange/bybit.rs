//! Bybit v5 linear-perpetuals REST client, grounded in the teacher's
//! `exchange::bybit::adapter::BybitAdapter`: same HMAC-SHA256 request
//! signing over `timestamp + api_key + recv_window + body`, same
//! X-BAPI-* header set, same ret_code-nonzero-is-an-error convention.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{ExchangeClient, OrderAck, OrderRequest, OrderSide};
use crate::config::ExchangeCredentials;
use crate::error::{PipelineError, Result};
use crate::types::{Candle, InstrumentRules, SymbolInfo, Timeframe};

const RECV_WINDOW: &str = "5000";

pub struct BybitClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i32,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<T>,
}

impl BybitClient {
    pub fn new(credentials: &ExchangeCredentials) -> Self {
        let base_url = if credentials.testnet {
            "https://api-testnet.bybit.com".to_string()
        } else {
            "https://api.bybit.com".to_string()
        };
        Self {
            api_key: credentials.api_key.clone(),
            api_secret: credentials.api_secret.clone(),
            base_url,
            client: Client::new(),
        }
    }

    fn timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }

    fn sign(&self, timestamp: u64, payload: &str) -> String {
        let signature_str = format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts a key of any size");
        mac.update(signature_str.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let timestamp = self.timestamp();
        let query_str = {
            let mut pairs: Vec<(&str, String)> = query.to_vec();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
        };
        let signature = self.sign(timestamp, &query_str);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("GET {path} failed: {e}")))?
            .json::<BybitResponse<T>>()
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("GET {path} decode failed: {e}")))?;

        if response.ret_code != 0 {
            return Err(PipelineError::TransientExchange(format!(
                "bybit {path} error {}: {}",
                response.ret_code, response.ret_msg
            )));
        }
        response
            .result
            .ok_or_else(|| PipelineError::DataGap(format!("{path} returned no result")))
    }

    async fn post_signed<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let timestamp = self.timestamp();
        let body_str = serde_json::to_string(body).map_err(|e| PipelineError::Other(e.into()))?;
        let signature = self.sign(timestamp, &body_str);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("POST {path} failed: {e}")))?
            .json::<BybitResponse<T>>()
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("POST {path} decode failed: {e}")))?;

        if response.ret_code != 0 {
            return Err(PipelineError::TransientExchange(format!(
                "bybit {path} error {}: {}",
                response.ret_code, response.ret_msg
            )));
        }
        response
            .result
            .ok_or_else(|| PipelineError::DataGap(format!("{path} returned no result")))
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn get_klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>> {
        #[derive(Deserialize)]
        struct KlineResult {
            list: Vec<[String; 7]>,
        }
        let result: KlineResult = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", "linear".to_string()),
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.label()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        result
            .list
            .into_iter()
            .map(|row| {
                let parse = |s: &str| -> Result<Decimal> {
                    s.parse().map_err(|_| PipelineError::DataGap(format!("unparseable kline field: {s}")))
                };
                let millis: i64 = row[0]
                    .parse()
                    .map_err(|_| PipelineError::DataGap(format!("unparseable kline timestamp: {}", row[0])))?;
                Ok(Candle {
                    open_time: chrono::DateTime::from_timestamp_millis(millis)
                        .ok_or_else(|| PipelineError::DataGap("kline timestamp out of range".into()))?,
                    open: parse(&row[1])?,
                    high: parse(&row[2])?,
                    low: parse(&row[3])?,
                    close: parse(&row[4])?,
                    volume: parse(&row[5])?,
                    turnover: parse(&row[6])?,
                })
            })
            .collect()
    }

    async fn get_tickers(&self) -> Result<Vec<SymbolInfo>> {
        #[derive(Deserialize)]
        struct TickerResult {
            list: Vec<TickerRow>,
        }
        #[derive(Deserialize)]
        struct TickerRow {
            symbol: String,
            #[serde(rename = "lastPrice")]
            last_price: String,
            #[serde(rename = "bid1Price")]
            bid1_price: Option<String>,
            #[serde(rename = "ask1Price")]
            ask1_price: Option<String>,
            turnover24h: String,
            volume24h: Option<String>,
            #[serde(rename = "price24hPcnt")]
            price_24h_pcnt: String,
            #[serde(rename = "highPrice24h")]
            high_price_24h: String,
            #[serde(rename = "lowPrice24h")]
            low_price_24h: String,
            #[serde(rename = "fundingRate")]
            funding_rate: Option<String>,
        }

        let result: TickerResult = self.get("/v5/market/tickers", &[("category", "linear".to_string())]).await?;

        result
            .list
            .into_iter()
            .map(|row| {
                let parse = |s: &str| -> Decimal { s.parse().unwrap_or_default() };
                let last_price = parse(&row.last_price);
                Ok(SymbolInfo {
                    symbol: row.symbol,
                    last_price,
                    bid_price: row.bid1_price.as_deref().map(parse).unwrap_or(last_price),
                    ask_price: row.ask1_price.as_deref().map(parse).unwrap_or(last_price),
                    turnover_24h: parse(&row.turnover24h),
                    volume_24h: row.volume24h.as_deref().map(parse).unwrap_or_default(),
                    price_change_pct_24h: parse(&row.price_24h_pcnt) * Decimal::from(100),
                    high_24h: parse(&row.high_price_24h),
                    low_24h: parse(&row.low_price_24h),
                    funding_rate: row.funding_rate.as_deref().map(parse).unwrap_or_default(),
                    rules: InstrumentRules {
                        price_tick: Decimal::ZERO,
                        min_price: Decimal::ZERO,
                        qty_step: Decimal::ZERO,
                        min_qty: Decimal::ZERO,
                        max_qty: Decimal::ZERO,
                        price_decimals: 0,
                        qty_decimals: 0,
                    },
                })
            })
            .collect()
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Option<SymbolInfo>> {
        Ok(self.get_tickers().await?.into_iter().find(|s| s.symbol == symbol))
    }

    async fn get_instrument_rules(&self, symbol: &str) -> Result<InstrumentRules> {
        #[derive(Deserialize)]
        struct InstrumentResult {
            list: Vec<InstrumentRow>,
        }
        #[derive(Deserialize)]
        struct InstrumentRow {
            #[serde(rename = "priceFilter")]
            price_filter: PriceFilter,
            #[serde(rename = "lotSizeFilter")]
            lot_size_filter: LotSizeFilter,
        }
        #[derive(Deserialize)]
        struct PriceFilter {
            #[serde(rename = "tickSize")]
            tick_size: String,
            #[serde(rename = "minPrice")]
            min_price: String,
        }
        #[derive(Deserialize)]
        struct LotSizeFilter {
            #[serde(rename = "qtyStep")]
            qty_step: String,
            #[serde(rename = "minOrderQty")]
            min_order_qty: String,
            #[serde(rename = "maxOrderQty")]
            max_order_qty: String,
        }

        let result: InstrumentResult = self
            .get(
                "/v5/market/instruments-info",
                &[("category", "linear".to_string()), ("symbol", symbol.to_string())],
            )
            .await?;
        let row = result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::DataGap(format!("no instrument info for {symbol}")))?;

        let price_tick: Decimal = row
            .price_filter
            .tick_size
            .parse()
            .map_err(|_| PipelineError::DataGap("unparseable tick size".into()))?;
        let qty_step: Decimal = row
            .lot_size_filter
            .qty_step
            .parse()
            .map_err(|_| PipelineError::DataGap("unparseable qty step".into()))?;

        Ok(InstrumentRules {
            price_tick,
            min_price: row.price_filter.min_price.parse().unwrap_or_default(),
            qty_step,
            min_qty: row.lot_size_filter.min_order_qty.parse().unwrap_or_default(),
            max_qty: row.lot_size_filter.max_order_qty.parse().unwrap_or_default(),
            price_decimals: price_tick.scale(),
            qty_decimals: qty_step.scale(),
        })
    }

    async fn get_funding_rate(&self, symbol: &str) -> Result<Decimal> {
        Ok(self
            .get_ticker(symbol)
            .await?
            .map(|info| info.funding_rate)
            .unwrap_or_default())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let _: serde_json::Value = self.post_signed("/v5/position/set-leverage", &body).await?;
        Ok(())
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck> {
        let side_str = match request.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let body = serde_json::json!({
            "category": "linear",
            "symbol": request.symbol,
            "side": side_str,
            "orderType": "Market",
            "qty": request.qty.to_string(),
            "takeProfit": request.take_profit.to_string(),
            "stopLoss": request.stop_loss.to_string(),
            "timeInForce": "GTC",
        });
        #[derive(Deserialize)]
        struct CreateResult {
            #[serde(rename = "orderId")]
            order_id: String,
        }
        let result: CreateResult = self.post_signed("/v5/order/create", &body).await?;
        Ok(OrderAck {
            order_id: result.order_id,
            symbol: request.symbol,
            side: request.side,
            qty: request.qty,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct PositionResult {
            list: Vec<PositionRow>,
        }
        #[derive(Deserialize)]
        struct PositionRow {
            symbol: String,
            size: String,
        }
        let result: PositionResult = self
            .get(
                "/v5/position/list",
                &[("category", "linear".to_string()), ("settleCoin", "USDT".to_string())],
            )
            .await?;
        Ok(result
            .list
            .into_iter()
            .filter(|row| row.size.parse::<Decimal>().unwrap_or_default() > Decimal::ZERO)
            .map(|row| row.symbol)
            .collect())
    }

    async fn get_wallet_balance(&self) -> Result<Decimal> {
        #[derive(Deserialize)]
        struct WalletResult {
            list: Vec<AccountRow>,
        }
        #[derive(Deserialize)]
        struct AccountRow {
            #[serde(rename = "totalAvailableBalance")]
            total_available_balance: String,
        }
        let result: WalletResult = self
            .get(
                "/v5/account/wallet-balance",
                &[("accountType", "UNIFIED".to_string())],
            )
            .await?;
        Ok(result
            .list
            .first()
            .and_then(|row| row.total_available_balance.parse().ok())
            .unwrap_or_default())
    }

    async fn has_open_order(&self, symbol: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct OrderResult {
            list: Vec<serde_json::Value>,
        }
        let result: OrderResult = self
            .get(
                "/v5/order/realtime",
                &[("category", "linear".to_string()), ("symbol", symbol.to_string())],
            )
            .await?;
        Ok(!result.list.is_empty())
    }
}
