//! Execution Book: applies Orders to per-venue position/average-price state,
//! computes realized PnL, and produces Trades. Grounded in the original
//! `order_book.cpp`'s `OrderBook::submit`, with the crossing-then-opening
//! arithmetic corrected per the deterministic rule this spec adopts (the
//! opening leg uses the incoming order's price as its new average, since the
//! prior position on that side is zero right after the close).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::types::{now_ms, Order, Side, Trade};

struct Position {
    position: i64,
    avg_price: f64,
}

pub struct ExecutionBook {
    positions: DashMap<String, Position>,
    trades: RwLock<Vec<Trade>>,
    trade_counter: AtomicU64,
    total_pnl: RwLock<f64>,
}

impl ExecutionBook {
    pub fn new() -> Self {
        ExecutionBook {
            positions: DashMap::new(),
            trades: RwLock::new(Vec::new()),
            trade_counter: AtomicU64::new(0),
            total_pnl: RwLock::new(0.0),
        }
    }

    pub fn position(&self, venue: &str) -> i64 {
        self.positions.get(venue).map(|p| p.position).unwrap_or(0)
    }

    pub fn avg_price(&self, venue: &str) -> f64 {
        self.positions
            .get(venue)
            .map(|p| p.avg_price)
            .unwrap_or(0.0)
    }

    pub fn total_pnl(&self) -> f64 {
        *self.total_pnl.read()
    }

    pub fn recent_trades(&self) -> Vec<Trade> {
        self.trades.read().clone()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }

    /// Applies `order`, updating the venue's position/average-price and
    /// appending the resulting Trade to the unbounded in-memory history.
    /// `modelled_latency_ms` is carried through purely for the outbound
    /// wire schema; the Book has no opinion on how the order got here.
    pub fn submit(&self, order: &Order, modelled_latency_ms: f64) -> Trade {
        let signed_qty: i64 = match order.side {
            Side::Buy => order.quantity as i64,
            Side::Sell => -(order.quantity as i64),
        };

        let mut entry = self
            .positions
            .entry(order.venue.clone())
            .or_insert_with(|| Position {
                position: 0,
                avg_price: 0.0,
            });

        let mut pnl = 0.0;
        let crossing = entry.position != 0 && entry.position.signum() != signed_qty.signum();

        if crossing {
            let close = signed_qty.unsigned_abs().min(entry.position.unsigned_abs()) as i64;
            match order.side {
                Side::Buy => {
                    // Closing a short: buying back below the short's average is profit.
                    pnl += close as f64 * (entry.avg_price - order.price);
                    entry.position += close;
                }
                Side::Sell => {
                    // Closing a long: selling above the long's average is profit.
                    pnl += close as f64 * (order.price - entry.avg_price);
                    entry.position -= close;
                }
            }

            let open = signed_qty.unsigned_abs() as i64 - close;
            if open > 0 {
                entry.avg_price = order.price;
                entry.position += match order.side {
                    Side::Buy => open,
                    Side::Sell => -open,
                };
            }
        } else {
            let prior_abs = entry.position.unsigned_abs() as f64;
            let open_abs = signed_qty.unsigned_abs() as f64;
            entry.avg_price =
                (prior_abs * entry.avg_price + open_abs * order.price) / (prior_abs + open_abs);
            entry.position += signed_qty;
        }

        let trade_id = self.trade_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let executed_ts = now_ms().max(order.timestamp_ms);
        let trade = Trade {
            id: format!("T{trade_id}"),
            venue: order.venue.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            size: order.quantity as f64,
            pnl,
            order_id: order.id.clone(),
            exchange_recv_ts_ms: order.exchange_recv_ts_ms,
            ingest_ts_ms: order.ingest_ts_ms,
            order_created_ts_ms: order.timestamp_ms,
            order_executed_ts_ms: executed_ts,
            server_broadcast_ts_ms: executed_ts,
            modelled_latency_ms,
        };

        self.trades.write().push(trade.clone());
        *self.total_pnl.write() += pnl;

        trade
    }
}

impl Default for ExecutionBook {
    fn default() -> Self {
        Self::new()
    }
}
