//! Core data types shared across the pipeline: ticks, orders, trades, and the
//! outbound WebSocket message schema.

use serde::{Deserialize, Serialize};

/// An immutable observation produced by a Tick Source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTick {
    pub venue: String,
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub exchange_recv_ts_ms: i64,
    pub ingest_ts_ms: i64,
}

/// BUY or SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// An intent produced by a Strategy in response to one tick.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: u32,
    pub timestamp_ms: i64,
    pub exchange_recv_ts_ms: i64,
    pub ingest_ts_ms: i64,
}

/// The record produced by the Execution Book when an Order is applied.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: String,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub pnl: f64,
    pub order_id: String,
    pub exchange_recv_ts_ms: i64,
    pub ingest_ts_ms: i64,
    pub order_created_ts_ms: i64,
    pub order_executed_ts_ms: i64,
    /// Filled in by the broadcast path, not the Book.
    pub server_broadcast_ts_ms: i64,
    pub modelled_latency_ms: f64,
}

/// A deferred-execution notice emitted by the Latency Scheduler.
#[derive(Debug, Clone)]
pub struct LatencyEvent {
    pub venue: String,
    pub latency_ms: f64,
    pub order_id: String,
    pub now_ms: i64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The three outbound WebSocket message shapes, hand-formatted (not via
/// `serde_json`) so that numeric fields get the fixed 6-fractional-digit
/// formatting the wire schema requires.
#[derive(Debug, Clone)]
pub enum WsOutbound {
    Trade(Trade),
    Latency(LatencyEvent),
    Heartbeat { server_ts_ms: i64 },
}

impl WsOutbound {
    pub fn to_json(&self) -> String {
        match self {
            WsOutbound::Trade(t) => format!(
                "{{\"type\":\"trade\",\"venue\":\"{venue}\",\"symbol\":\"{symbol}\",\"side\":\"{side}\",\
                 \"price\":{price:.6},\"size\":{size:.6},\"pnl\":{pnl:.6},\"orderId\":\"{order_id}\",\
                 \"modelled_latency_ms\":{lat:.6},\"exchange_recv_ts_ms\":{erts},\"ingest_ts_ms\":{ints},\
                 \"order_created_ts_ms\":{octs},\"order_executed_ts_ms\":{oets},\
                 \"server_broadcast_ts_ms\":{sbts}}}",
                venue = t.venue,
                symbol = t.symbol,
                side = t.side.as_str(),
                price = t.price,
                size = t.size,
                pnl = t.pnl,
                order_id = t.order_id,
                lat = t.modelled_latency_ms,
                erts = t.exchange_recv_ts_ms,
                ints = t.ingest_ts_ms,
                octs = t.order_created_ts_ms,
                oets = t.order_executed_ts_ms,
                sbts = t.server_broadcast_ts_ms,
            ),
            WsOutbound::Latency(e) => format!(
                "{{\"type\":\"latency\",\"venue\":\"{venue}\",\"symbol\":\"\",\"side\":\"\",\
                 \"price\":0.000000,\"size\":0.000000,\"pnl\":0.000000,\"orderId\":\"{order_id}\",\
                 \"modelled_latency_ms\":{lat:.6},\"exchange_recv_ts_ms\":0,\"ingest_ts_ms\":0,\
                 \"order_created_ts_ms\":0,\"order_executed_ts_ms\":0,\
                 \"server_broadcast_ts_ms\":{sbts}}}",
                venue = e.venue,
                order_id = e.order_id,
                lat = e.latency_ms,
                sbts = e.now_ms,
            ),
            WsOutbound::Heartbeat { server_ts_ms } => {
                format!("{{\"type\":\"hb\",\"server_ts_ms\":{server_ts_ms}}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_json_has_fixed_precision() {
        let t = Trade {
            id: "T1".into(),
            venue: "SYNTH".into(),
            symbol: "BTC-USD".into(),
            side: Side::Buy,
            price: 103.0,
            size: 10.0,
            pnl: 0.0,
            order_id: "O1".into(),
            exchange_recv_ts_ms: -1,
            ingest_ts_ms: 1000,
            order_created_ts_ms: 1000,
            order_executed_ts_ms: 1001,
            server_broadcast_ts_ms: 1002,
            modelled_latency_ms: 20.0,
        };
        let json = WsOutbound::Trade(t).to_json();
        assert!(json.contains("\"price\":103.000000"));
        assert!(json.contains("\"type\":\"trade\""));
        assert!(json.contains("\"side\":\"BUY\""));
    }

    #[test]
    fn heartbeat_json_shape() {
        let json = WsOutbound::Heartbeat { server_ts_ms: 42 }.to_json();
        assert_eq!(json, "{\"type\":\"hb\",\"server_ts_ms\":42}");
    }
}
