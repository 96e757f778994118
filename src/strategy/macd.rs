//! MACD(short=12, long=26, signal=9): EMA-difference histogram, grounded in
//! `strategies/strategy_macd.cpp`. `set_lookback` overrides the long period,
//! matching the original's `setLookback`.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::common::{make_order, OrderIdAllocator, PriceWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

const SHORT_WINDOW: usize = 12;
const DEFAULT_LONG_WINDOW: usize = 26;
const SIGNAL_WINDOW: usize = 9;

pub struct MacdStrategy {
    windows: PriceWindows,
    long_window: AtomicUsize,
    order_qty: std::sync::atomic::AtomicU32,
    orders: OrderIdAllocator,
}

impl MacdStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        let long_window = if lookback > 0 { lookback } else { DEFAULT_LONG_WINDOW };
        MacdStrategy {
            windows: PriceWindows::new(),
            long_window: AtomicUsize::new(long_window),
            order_qty: std::sync::atomic::AtomicU32::new(order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

/// EMA over the whole slice seeded from the first element, matching the
/// original's deliberately simplified `ema()` helper (not a true rolling
/// EMA restarted each call, but consistent from one tick to the next since
/// it's always recomputed over the full retained window).
fn ema(series: &[f64], period: usize) -> f64 {
    if period <= 1 || series.is_empty() {
        return *series.last().unwrap_or(&0.0);
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut value = series[0];
    for &x in &series[1..] {
        value = x * k + value * (1.0 - k);
    }
    value
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let long_window = self.long_window.load(Ordering::Relaxed);
        let cap = long_window.max(SHORT_WINDOW).max(SIGNAL_WINDOW);
        let prices = self.windows.push(&tick.venue, tick.price, cap);
        if prices.len() < long_window {
            return None;
        }

        let ema_short = ema(&prices, SHORT_WINDOW);
        let ema_long = ema(&prices, long_window);
        let macd = ema_short - ema_long;

        // The original reuses the price series with its last entry
        // overwritten by the macd value as a stand-in for a true MACD
        // history; preserved here for behavioural fidelity.
        let mut macd_series = prices.clone();
        *macd_series.last_mut().unwrap() = macd;
        let signal = ema(&macd_series, SIGNAL_WINDOW);
        let histogram = macd - signal;

        let side = if histogram > 0.0 {
            Side::Buy
        } else if histogram < 0.0 {
            Side::Sell
        } else {
            return None;
        };

        let id = self.orders.next();
        Some(make_order(
            id,
            tick,
            side,
            tick.price,
            self.order_qty.load(Ordering::Relaxed),
        ))
    }

    fn set_lookback(&self, n: usize) {
        if n > 0 {
            self.long_window.store(n, Ordering::Relaxed);
        }
    }

    fn set_order_quantity(&self, q: u32) {
        self.order_qty.store(q, Ordering::Relaxed);
    }

    fn lookback(&self) -> usize {
        self.long_window.load(Ordering::Relaxed)
    }

    fn order_quantity(&self) -> u32 {
        self.order_qty.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64) -> MarketTick {
        MarketTick {
            venue: "SYNTH".to_string(),
            symbol: "BTC-USD".to_string(),
            price,
            size: 0.0,
            exchange_recv_ts_ms: -1,
            ingest_ts_ms: 0,
        }
    }

    #[test]
    fn silent_until_long_window_full() {
        let s = MacdStrategy::new(5, 100);
        for i in 0..4 {
            assert!(s.on_market_tick(&tick(100.0 + i as f64)).is_none());
        }
    }

    #[test]
    fn emits_once_long_window_fills() {
        let s = MacdStrategy::new(5, 100);
        let mut last = None;
        for i in 0..8 {
            last = s.on_market_tick(&tick(100.0 + i as f64));
        }
        assert!(last.is_some());
    }
}
