//! Latency Scheduler: delays the effect of an order by a configured
//! per-venue latency, grounded in `latency.h`/`latency.cpp`'s
//! `LatencySimulator`. The ~1ms poll-partition-fire loop is carried over
//! verbatim; the callback mechanism becomes a boxed closure rather than a
//! stored function pointer/callback registration.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::warn;

use crate::types::{now_ms, LatencyEvent};

const PROCESSING_INTERVAL_MS: u64 = 1;
const DEFAULT_UNKNOWN_VENUE_LATENCY_MS: f64 = 50.0;

struct DelayedOrder {
    fire_at_ms: i64,
    order_id: String,
    callback: Box<dyn FnOnce() + Send>,
}

pub struct LatencyScheduler {
    venue_latency: Arc<DashMap<String, f64>>,
    queue: Arc<Mutex<VecDeque<DelayedOrder>>>,
    latency_events_tx: mpsc::Sender<LatencyEvent>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LatencyScheduler {
    pub fn new(initial: HashMap<String, f64>, latency_events_tx: mpsc::Sender<LatencyEvent>) -> Self {
        let venue_latency = DashMap::new();
        for (venue, ms) in initial {
            venue_latency.insert(venue, ms.max(0.0));
        }
        LatencyScheduler {
            venue_latency: Arc::new(venue_latency),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            latency_events_tx,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn set_venue_latency(&self, venue: &str, ms: f64) {
        self.venue_latency.insert(venue.to_string(), ms.max(0.0));
    }

    /// Unknown venues default to 50ms, per the Venue Latency Table contract.
    pub fn venue_latency(&self, venue: &str) -> f64 {
        self.venue_latency
            .get(venue)
            .map(|v| *v)
            .unwrap_or(DEFAULT_UNKNOWN_VENUE_LATENCY_MS)
    }

    /// Schedules `callback` to fire at `now + venue_latency(venue)` and
    /// emits a `LatencyEvent` to the subscribed listener channel.
    pub fn add_order_delay<F>(&self, order_id: String, venue: &str, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let latency_ms = self.venue_latency(venue);
        let fire_at_ms = now_ms() + latency_ms as i64;
        self.queue.lock().push_back(DelayedOrder {
            fire_at_ms,
            order_id: order_id.clone(),
            callback: Box::new(callback),
        });

        let event = LatencyEvent {
            venue: venue.to_string(),
            latency_ms,
            order_id,
            now_ms: now_ms(),
        };
        if self.latency_events_tx.try_send(event).is_err() {
            // Listener is lagging or gone; the scheduled callback still fires.
            warn!("latency event channel full or closed, dropping one notification");
        }
    }

    /// Idempotent. Spawns the ~1ms poll/partition/fire worker.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let queue = self.queue.clone();
        let running = self.running.clone();
        *self.task.lock() = Some(tokio::spawn(worker(queue, running)));
    }

    /// Idempotent. Joins the worker; any orders still pending in the queue
    /// are discarded (never fired).
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.queue.lock().clear();
    }
}

async fn worker(queue: Arc<Mutex<VecDeque<DelayedOrder>>>, running: Arc<AtomicBool>) {
    let mut ticker = interval(Duration::from_millis(PROCESSING_INTERVAL_MS));
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let now = now_ms();
        let ready = {
            let mut q = queue.lock();
            let mut pending = VecDeque::with_capacity(q.len());
            let mut ready = Vec::new();
            for entry in q.drain(..) {
                if entry.fire_at_ms <= now {
                    ready.push(entry);
                } else {
                    pending.push_back(entry);
                }
            }
            *q = pending;
            ready
        };

        for entry in ready {
            let DelayedOrder {
                order_id, callback, ..
            } = entry;
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
                warn!(%order_id, "latency scheduler callback panicked, other entries unaffected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn unknown_venue_defaults_to_50ms() {
        let (tx, _rx) = mpsc::channel(16);
        let sched = LatencyScheduler::new(HashMap::new(), tx);
        assert_eq!(sched.venue_latency("NOWHERE"), 50.0);
    }

    #[tokio::test]
    async fn callback_fires_after_configured_delay() {
        let (tx, _rx) = mpsc::channel(16);
        let sched = LatencyScheduler::new(HashMap::new(), tx);
        sched.set_venue_latency("FAST", 5.0);
        sched.start();

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        sched.add_order_delay("O1".to_string(), "FAST", move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        sched.stop().await;
    }

    #[tokio::test]
    async fn reorders_by_differing_latency() {
        let (tx, _rx) = mpsc::channel(16);
        let sched = LatencyScheduler::new(HashMap::new(), tx);
        sched.set_venue_latency("SLOW", 80.0);
        sched.set_venue_latency("FAST", 5.0);
        sched.start();

        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        sched.add_order_delay("slow-order".to_string(), "SLOW", move || {
            o1.lock().push("SLOW");
        });
        let o2 = order.clone();
        sched.add_order_delay("fast-order".to_string(), "FAST", move || {
            o2.lock().push("FAST");
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*order.lock(), vec!["FAST", "SLOW"]);
        sched.stop().await;
    }
}
