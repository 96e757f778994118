//! Momentum(N): BUY on N strictly increasing prices, SELL on N strictly
//! decreasing, grounded in `strategies/strategy_momentum.cpp`.

use super::common::{make_order, OrderIdAllocator, Params, PriceWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

/// The original caps raw history at 10 regardless of the configured
/// threshold; the threshold only selects how many of the most recent 10
/// entries are checked for monotonicity.
const MAX_PRICE_HISTORY: usize = 10;

pub struct MomentumStrategy {
    windows: PriceWindows,
    params: Params,
    orders: OrderIdAllocator,
}

impl MomentumStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        MomentumStrategy {
            windows: PriceWindows::new(),
            params: Params::new(lookback, order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let history = self.windows.push(&tick.venue, tick.price, MAX_PRICE_HISTORY);
        let threshold = self.params.lookback();
        if history.len() < threshold {
            return None;
        }
        let window = &history[history.len() - threshold..];
        let upward = window.windows(2).all(|w| w[0] < w[1]);
        let downward = window.windows(2).all(|w| w[0] > w[1]);

        let side = if upward {
            Side::Buy
        } else if downward {
            Side::Sell
        } else {
            return None;
        };

        let id = self.orders.next();
        Some(make_order(id, tick, side, tick.price, self.params.order_qty()))
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

    fn tick(venue: &str, price: f64) -> MarketTick {
        MarketTick {
            venue: venue.to_string(),
            symbol: "BTC-USD".to_string(),
            price,
            size: 0.0,
            exchange_recv_ts_ms: -1,
            ingest_ts_ms: 0,
        }
    }

    #[test]
    fn buys_on_strictly_increasing_run() {
        let s = MomentumStrategy::new(3, 100);
        assert!(s.on_market_tick(&tick("SYNTH", 1.0)).is_none());
        assert!(s.on_market_tick(&tick("SYNTH", 2.0)).is_none());
        let order = s.on_market_tick(&tick("SYNTH", 3.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn silent_on_flat_run() {
        let s = MomentumStrategy::new(3, 100);
        s.on_market_tick(&tick("SYNTH", 1.0));
        s.on_market_tick(&tick("SYNTH", 1.0));
        assert!(s.on_market_tick(&tick("SYNTH", 1.0)).is_none());
    }

    #[test]
    fn hot_swap_lookback_takes_effect_next_tick() {
        let s = MomentumStrategy::new(3, 100);
        s.set_lookback(2);
        assert_eq!(s.lookback(), 2);
        s.on_market_tick(&tick("SYNTH", 1.0));
        let order = s.on_market_tick(&tick("SYNTH", 2.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }
}
