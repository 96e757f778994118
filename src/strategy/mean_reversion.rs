//! Mean-reversion(N): BUY below the rolling mean, SELL above it, grounded
//! in `strategies/strategy_mean_reversion.cpp`.

use super::common::{make_order, OrderIdAllocator, Params, PriceWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

pub struct MeanReversionStrategy {
    windows: PriceWindows,
    params: Params,
    orders: OrderIdAllocator,
}

impl MeanReversionStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        MeanReversionStrategy {
            windows: PriceWindows::new(),
            params: Params::new(lookback, order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let lookback = self.params.lookback();
        let window = self.windows.push(&tick.venue, tick.price, lookback);
        if window.len() < lookback {
            return None;
        }
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let last = *window.last().unwrap();

        let side = if last < mean {
            Side::Buy
        } else if last > mean {
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
    fn buys_below_mean() {
        let s = MeanReversionStrategy::new(3, 100);
        s.on_market_tick(&tick(10.0));
        s.on_market_tick(&tick(10.0));
        let order = s.on_market_tick(&tick(1.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn silent_until_window_full() {
        let s = MeanReversionStrategy::new(3, 100);
        assert!(s.on_market_tick(&tick(10.0)).is_none());
        assert!(s.on_market_tick(&tick(1.0)).is_none());
    }
}
