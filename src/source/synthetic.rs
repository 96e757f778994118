//! Synthetic generator: a reflecting Gaussian random walk on a single
//! venue tag, grounded in the original `market_feed.cpp`'s synthetic path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, Duration};
use tracing::debug;

use crate::types::{now_ms, MarketTick};

pub const VENUE: &str = "SYNTH";
const TICK_INTERVAL_MS: u64 = 100;
const STEP_MEAN: f64 = 0.0;
const STEP_STDDEV: f64 = 0.1;
const PRICE_FLOOR: f64 = 1.0;
const START_PRICE: f64 = 100.0;

pub async fn run(
    symbol: String,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    tx: mpsc::Sender<MarketTick>,
) {
    let normal = Normal::new(STEP_MEAN, STEP_STDDEV).expect("fixed, valid normal parameters");
    let mut rng = SmallRng::from_entropy();
    let mut price = START_PRICE;
    let mut ticker = interval(Duration::from_millis(TICK_INTERVAL_MS));

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_signal.notified() => break,
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let step: f64 = normal.sample(&mut rng);
        price = (price + step).max(PRICE_FLOOR);

        let tick = MarketTick {
            venue: VENUE.to_string(),
            symbol: symbol.clone(),
            price,
            size: 0.0,
            exchange_recv_ts_ms: -1,
            ingest_ts_ms: now_ms(),
        };
        if tx.send(tick).await.is_err() {
            debug!("synthetic source: downstream channel closed");
            break;
        }
    }
}
