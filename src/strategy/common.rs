//! Shared plumbing used by every signal rule: order-id allocation, rolling
//! per-venue price windows, and lock-free lookback/quantity parameters so a
//! live Strategy can be retuned from the control endpoint without blocking
//! the tick path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::types::{now_ms, MarketTick, Order, Side};

/// Safety cap on window length regardless of a runtime-set lookback, so a
/// hostile or mistaken `/control?lookback=` request can't grow memory
/// unboundedly.
pub const ABSOLUTE_MAX_WINDOW: usize = 256;

pub struct OrderIdAllocator(AtomicU64);

impl OrderIdAllocator {
    pub fn new() -> Self {
        OrderIdAllocator(AtomicU64::new(0))
    }

    pub fn next(&self) -> String {
        let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        format!("O{n}")
    }
}

pub fn make_order(id: String, tick: &MarketTick, side: Side, price: f64, qty: u32) -> Order {
    Order {
        id,
        venue: tick.venue.clone(),
        symbol: tick.symbol.clone(),
        side,
        price,
        quantity: qty,
        timestamp_ms: now_ms(),
        exchange_recv_ts_ms: tick.exchange_recv_ts_ms,
        ingest_ts_ms: tick.ingest_ts_ms,
    }
}

/// Per-venue rolling window of bare prices.
pub struct PriceWindows {
    windows: DashMap<String, Mutex<VecDeque<f64>>>,
}

impl PriceWindows {
    pub fn new() -> Self {
        PriceWindows {
            windows: DashMap::new(),
        }
    }

    /// Push `price` for `venue`, trim to `target_len`, return a snapshot
    /// oldest-first.
    pub fn push(&self, venue: &str, price: f64, target_len: usize) -> Vec<f64> {
        let target_len = target_len.clamp(1, ABSOLUTE_MAX_WINDOW);
        let entry = self
            .windows
            .entry(venue.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut dq = entry.lock();
        dq.push_back(price);
        while dq.len() > target_len {
            dq.pop_front();
        }
        dq.iter().copied().collect()
    }
}

/// Per-venue rolling window of (price, size) pairs, used by VWAP-reversion.
pub struct PriceSizeWindows {
    windows: DashMap<String, Mutex<VecDeque<(f64, f64)>>>,
}

impl PriceSizeWindows {
    pub fn new() -> Self {
        PriceSizeWindows {
            windows: DashMap::new(),
        }
    }

    pub fn push(&self, venue: &str, price: f64, size: f64, target_len: usize) -> Vec<(f64, f64)> {
        let target_len = target_len.clamp(1, ABSOLUTE_MAX_WINDOW);
        let entry = self
            .windows
            .entry(venue.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut dq = entry.lock();
        dq.push_back((price, size));
        while dq.len() > target_len {
            dq.pop_front();
        }
        dq.iter().copied().collect()
    }
}

/// Shared lookback/order-quantity state. Stored as atomics, not behind a
/// lock, so `/control` can retune a live Strategy without blocking the
/// in-flight tick dispatch that reads the same fields.
pub struct Params {
    lookback: AtomicUsize,
    order_qty: AtomicU32,
}

impl Params {
    pub fn new(lookback: usize, order_qty: u32) -> Self {
        Params {
            lookback: AtomicUsize::new(lookback),
            order_qty: AtomicU32::new(order_qty),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback.load(Ordering::Relaxed)
    }

    /// Direct assignment, matching `strategy_momentum.h`/`strategy_mean_reversion.h`/
    /// `strategy_breakout.h`/`strategy_vwap_reversion.h`, none of which guard
    /// against zero. `PriceWindows::push`/`PriceSizeWindows::push` already
    /// clamp the window length to at least 1, so a `0` here degrades to the
    /// smallest usable window rather than panicking.
    pub fn set_lookback(&self, n: usize) {
        self.lookback.store(n, Ordering::Relaxed);
    }

    pub fn order_qty(&self) -> u32 {
        self.order_qty.load(Ordering::Relaxed)
    }

    pub fn set_order_qty(&self, q: u32) {
        self.order_qty.store(q, Ordering::Relaxed);
    }
}
