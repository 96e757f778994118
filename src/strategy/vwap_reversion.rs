//! VWAP-reversion(N): BUY below the rolling size-weighted average price,
//! SELL above it, grounded in `strategies/strategy_vwap_reversion.cpp`.

use super::common::{make_order, OrderIdAllocator, Params, PriceSizeWindows};
use super::Strategy;
use crate::types::{MarketTick, Order, Side};

pub struct VwapReversionStrategy {
    windows: PriceSizeWindows,
    params: Params,
    orders: OrderIdAllocator,
}

impl VwapReversionStrategy {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        VwapReversionStrategy {
            windows: PriceSizeWindows::new(),
            params: Params::new(lookback, order_qty),
            orders: OrderIdAllocator::new(),
        }
    }
}

impl Strategy for VwapReversionStrategy {
    fn name(&self) -> &'static str {
        "vwap_reversion"
    }

    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order> {
        let lookback = self.params.lookback();
        let size = if tick.size > 0.0 { tick.size } else { 1.0 };
        let window = self.windows.push(&tick.venue, tick.price, size, lookback);
        if window.len() < 2 {
            return None;
        }
        let (sum_pv, sum_v) = window
            .iter()
            .fold((0.0, 0.0), |(pv, v), (p, s)| (pv + p * s, v + s));
        let vwap = sum_pv / if sum_v > 0.0 { sum_v } else { 1.0 };
        let last = window.last().unwrap().0;

        let side = if last < vwap {
            Side::Buy
        } else if last > vwap {
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

    fn tick(price: f64, size: f64) -> MarketTick {
        MarketTick {
            venue: "SYNTH".to_string(),
            symbol: "BTC-USD".to_string(),
            price,
            size,
            exchange_recv_ts_ms: -1,
            ingest_ts_ms: 0,
        }
    }

    #[test]
    fn buys_below_vwap() {
        let s = VwapReversionStrategy::new(5, 100);
        s.on_market_tick(&tick(10.0, 1.0));
        let order = s.on_market_tick(&tick(1.0, 1.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn zero_size_treated_as_one() {
        let s = VwapReversionStrategy::new(5, 100);
        s.on_market_tick(&tick(10.0, 0.0));
        let order = s.on_market_tick(&tick(1.0, 0.0)).unwrap();
        assert_eq!(order.side, Side::Buy);
    }
}
