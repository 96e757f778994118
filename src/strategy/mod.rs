//! Strategy: the signal-rule contract plus the six required implementations
//! (and a supplemented seventh, Bollinger). Strategies are stateless with
//! respect to prior orders — no position check, over-trading by design.

mod bollinger;
mod breakout;
mod common;
mod macd;
mod mean_reversion;
mod momentum;
mod rsi;
mod vwap_reversion;

use std::sync::Arc;

use crate::types::{MarketTick, Order};

/// `on_market_tick` is invoked serially per Source — no reentrance is
/// required. `set_lookback`/`set_order_quantity` take effect starting with
/// the next tick; they never block an in-flight dispatch because
/// implementations hold these as atomics, not behind a lock.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_market_tick(&self, tick: &MarketTick) -> Option<Order>;
    fn set_lookback(&self, n: usize);
    fn set_order_quantity(&self, q: u32);
    fn lookback(&self) -> usize;
    fn order_quantity(&self) -> u32;
}

/// Build a Strategy by CLI/`/control` name. An unrecognized name falls back
/// to momentum, consistent with the "never fail over a bad flag" rule that
/// governs configuration elsewhere.
pub fn build(name: &str, lookback: usize, order_qty: u32) -> Arc<dyn Strategy> {
    match name {
        "mean_reversion" => Arc::new(mean_reversion::MeanReversionStrategy::new(lookback, order_qty)),
        "breakout" => Arc::new(breakout::BreakoutStrategy::new(lookback, order_qty)),
        "vwap_reversion" => Arc::new(vwap_reversion::VwapReversionStrategy::new(lookback, order_qty)),
        "macd" => Arc::new(macd::MacdStrategy::new(lookback, order_qty)),
        "rsi" => Arc::new(rsi::RsiStrategy::new(lookback, order_qty)),
        "bollinger" => Arc::new(bollinger::BollingerStrategy::new(lookback, order_qty)),
        _ => Arc::new(momentum::MomentumStrategy::new(lookback, order_qty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_falls_back_to_momentum() {
        let s = build("not-a-real-strategy", 3, 100);
        assert_eq!(s.name(), "momentum");
    }

    #[test]
    fn every_required_name_resolves() {
        for name in [
            "momentum",
            "mean_reversion",
            "breakout",
            "vwap_reversion",
            "macd",
            "rsi",
        ] {
            assert_eq!(build(name, 3, 100).name(), name);
        }
    }
}
