//! Breakout(N): BUY above the rolling high, SELL below the rolling low,
//! grounded in `strategies/strategy_breakout.cpp`.

use super::common::{make_order, OrderIdAllocator, Params, PriceWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

pub struct BreakoutStrategy {
    windows: PriceWindows,
    params: Params,
    orders: OrderIdAllocator,
}

impl BreakoutStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        BreakoutStrategy {
            windows: PriceWindows::new(),
            params: Params::new(lookback, order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

impl Strategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let lookback = self.params.lookback();
        let window = self.windows.push(&tick.venue, tick.price, lookback);
        if window.len() < lookback {
            return None;
        }
        // Compare the latest print against the high/low of the preceding
        // window, not including itself, so a new extreme is actually
        // reachable (the window as stored always already contains `last`).
        let prior = &window[..window.len() - 1];
        let highest = prior.iter().cloned().fold(f64::MIN, f64::max);
        let lowest = prior.iter().cloned().fold(f64::MAX, f64::min);
        let last = *window.last().unwrap();

        let side = if last > highest {
            Side::Buy
        } else if last < lowest {
            Side::Sell
        } else {
            return None;
        };

        let id = self.orders.next();
        Some(make_order(id, tick, side, last, self.params.order_qty()))
    }

    fn set_lookback(&self, n: usize) {
        self.params.set_lookback(n);
    }

    fn set_order_quantity(&self, q: u32) {
        self.params.set_order_qty(q);
    }

    fn lookback(&self) -> usize {
        self.params.lookback()
    }

    fn order_quantity(&self) -> u32 {
        self.params.order_qty()
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
    fn buys_above_rolling_high() {
        let s = BreakoutStrategy::new(2, 100);
        s.on_market_tick(&tick(1.0));
        let order = s.on_market_tick(&tick(5.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn silent_inside_range() {
        let s = BreakoutStrategy::new(2, 100);
        s.on_market_tick(&tick(1.0));
        s.on_market_tick(&tick(2.0));
        assert!(s.on_market_tick(&tick(1.5)).is_none());
    }
}
