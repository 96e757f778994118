//! RSI(period=14): Wilder-style relative strength index, grounded in
//! `strategies/strategy_rsi.cpp`.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::common::{make_order, OrderIdAllocator, PriceWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

const DEFAULT_PERIOD: usize = 14;

pub struct RsiStrategy {
    windows: PriceWindows,
    period: AtomicUsize,
    order_qty: AtomicU32,
    orders: OrderIdAllocator,
}

impl RsiStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        let period = if lookback > 0 { lookback } else { DEFAULT_PERIOD };
        RsiStrategy {
            windows: PriceWindows::new(),
            period: AtomicUsize::new(period),
            order_qty: AtomicU32::new(order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

fn compute_rsi(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 {
        return 50.0;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in prices.len() - period..prices.len() {
        let diff = prices[i] - prices[i - 1];
        if diff > 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    let rs = if losses == 0.0 {
        0.0
    } else {
        gains / losses
    };
    100.0 - (100.0 / (1.0 + rs))
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let period = self.period.load(Ordering::Relaxed);
        let prices = self.windows.push(&tick.venue, tick.price, period + 1);
        if prices.len() < period + 1 {
            return None;
        }
        let rsi = compute_rsi(&prices, period);

        let side = if rsi < 30.0 {
            Side::Buy
        } else if rsi > 70.0 {
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
            self.period.store(n, Ordering::Relaxed);
        }
    }

    fn set_order_quantity(&self, q: u32) {
        self.order_qty.store(q, Ordering::Relaxed);
    }

    fn lookback(&self) -> usize {
        self.period.load(Ordering::Relaxed)
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
    fn neutral_rsi_before_window_fills() {
        assert_eq!(compute_rsi(&[1.0, 2.0], 14), 50.0);
    }

    #[test]
    fn buys_on_sustained_decline() {
        let s = RsiStrategy::new(3, 100);
        let mut last = None;
        let mut price = 100.0;
        for _ in 0..6 {
            price -= 5.0;
            last = s.on_market_tick(&tick(price));
        }
        assert_eq!(last.unwrap().side, Side::Buy);
    }
}
