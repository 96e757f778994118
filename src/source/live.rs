//! Live feed: a TLS WebSocket connection to a public trade channel, grounded
//! in `exchanges/coinbase.rs` and `exchanges/binance.rs` from the teacher
//! crate and the original `live_feed_coinbase.cpp`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::config::ExchangeKind;
use crate::types::{now_ms, MarketTick};

const MAX_TICKS_PER_MESSAGE: usize = 10;

fn venue_name(exchange: ExchangeKind) -> &'static str {
    match exchange {
        ExchangeKind::Coinbase => "COINBASE",
        ExchangeKind::Binance => "BINANCE",
    }
}

fn subscribe_url(exchange: ExchangeKind) -> &'static str {
    match exchange {
        ExchangeKind::Coinbase => "wss://advanced-trade-ws.coinbase.com",
        ExchangeKind::Binance => "wss://fstream.binance.com/stream",
    }
}

fn subscribe_message(exchange: ExchangeKind, symbol: &str) -> String {
    match exchange {
        ExchangeKind::Coinbase => serde_json::json!({
            "type": "subscribe",
            "product_ids": [symbol],
            "channel": "market_trades",
        })
        .to_string(),
        ExchangeKind::Binance => {
            let stream = format!("{}@trade", symbol.to_lowercase());
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": [stream],
                "id": 1,
            })
            .to_string()
        }
    }
}

pub async fn run(
    exchange: ExchangeKind,
    symbol: String,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    tx: mpsc::Sender<MarketTick>,
) {
    let venue = venue_name(exchange);
    let url = subscribe_url(exchange);

    let (ws_stream, _) = match tokio_tungstenite::connect_async(url).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%url, error = %e, "live feed connect failed, source terminating");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let sub = subscribe_message(exchange, &symbol);
    if let Err(e) = write.send(Message::Text(sub.into())).await {
        warn!(error = %e, "live feed subscribe failed, source terminating");
        return;
    }

    while running.load(Ordering::Relaxed) {
        let next = tokio::select! {
            msg = read.next() => msg,
            _ = stop_signal.notified() => break,
        };
        let Some(msg) = next else {
            break; // stream closed: I/O end, terminate silently
        };
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "live feed read failed, source terminating");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        for tick in parse_message(exchange, venue, &symbol, &text) {
            if tx.send(tick).await.is_err() {
                return;
            }
        }
    }
}

fn parse_message(exchange: ExchangeKind, venue: &str, symbol: &str, raw: &str) -> Vec<MarketTick> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    match exchange {
        ExchangeKind::Coinbase => parse_coinbase(venue, &value),
        ExchangeKind::Binance => parse_binance(venue, symbol, &value),
    }
}

fn parse_coinbase(venue: &str, value: &Value) -> Vec<MarketTick> {
    if value.get("channel").and_then(Value::as_str) != Some("market_trades") {
        return Vec::new();
    }
    let mut out = Vec::new();
    if let Some(events) = value.get("events").and_then(Value::as_array) {
        for event in events {
            let Some(trades) = event.get("trades").and_then(Value::as_array) else {
                continue;
            };
            for trade in trades {
                if out.len() >= MAX_TICKS_PER_MESSAGE {
                    return out;
                }
                let Some(tick) = coinbase_trade_to_tick(venue, trade) else {
                    continue;
                };
                out.push(tick);
            }
        }
    }
    out
}

fn coinbase_trade_to_tick(venue: &str, trade: &Value) -> Option<MarketTick> {
    let symbol = trade.get("product_id")?.as_str()?.to_string();
    let price: f64 = trade.get("price")?.as_str()?.parse().ok()?;
    if price <= 0.0 {
        return None;
    }
    let size: f64 = trade
        .get("size")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let exchange_recv_ts_ms = trade
        .get("time")
        .and_then(Value::as_str)
        .and_then(first_13_chars_as_ms)
        .unwrap_or(-1);

    Some(MarketTick {
        venue: venue.to_string(),
        symbol,
        price,
        size,
        exchange_recv_ts_ms,
        ingest_ts_ms: now_ms(),
    })
}

fn parse_binance(venue: &str, fallback_symbol: &str, value: &Value) -> Vec<MarketTick> {
    let Some(data) = value.get("data") else {
        return Vec::new();
    };
    if data.get("e").and_then(Value::as_str) != Some("trade") {
        return Vec::new();
    }
    let Some(price_str) = data.get("p").and_then(Value::as_str) else {
        return Vec::new();
    };
    let Ok(price) = price_str.parse::<f64>() else {
        return Vec::new();
    };
    if price <= 0.0 {
        return Vec::new();
    }
    let size = data
        .get("q")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let symbol = data
        .get("s")
        .and_then(Value::as_str)
        .unwrap_or(fallback_symbol)
        .to_string();
    let exchange_recv_ts_ms = data
        .get("T")
        .and_then(Value::as_i64)
        .map(|ms| first_13_digits(ms))
        .unwrap_or(-1);

    vec![MarketTick {
        venue: venue.to_string(),
        symbol,
        price,
        size,
        exchange_recv_ts_ms,
        ingest_ts_ms: now_ms(),
    }]
}

/// Coinbase timestamps are RFC3339 strings; the first 13 characters of the
/// numeric millisecond rendering are what the original extracts. We parse
/// the full timestamp and take the equivalent prefix length in digits.
fn first_13_chars_as_ms(time: &str) -> Option<i64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(time).ok()?;
    Some(first_13_digits(parsed.timestamp_millis()))
}

fn first_13_digits(ms: i64) -> i64 {
    let s = ms.to_string();
    if s.len() <= 13 {
        ms
    } else {
        s[..13].parse().unwrap_or(ms)
    }
}
