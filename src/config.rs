//! Startup configuration: a hand-rolled `--flag=value` parser over
//! `std::env::args()`. Unrecognized flags and unparsable values are silently
//! ignored and the default is retained — a bad flag must never fail startup.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Live,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Coinbase,
    Binance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMode {
    Measured,
    Modelled,
    Both,
}

impl LatencyMode {
    /// `measured` disables scheduler delay; `modelled` and `both` behave
    /// identically for this core (there is no separate measured-latency path).
    pub fn scheduler_enabled(&self) -> bool {
        !matches!(self, LatencyMode::Measured)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub replay_file: String,
    pub replay_speed: f64,
    pub latency_mode: LatencyMode,
    pub modelled_latency_ms: HashMap<String, f64>,
    pub strategy: String,
    pub strategy_lookback: usize,
    pub strategy_order_qty: u32,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let mut modelled_latency_ms = HashMap::new();
        modelled_latency_ms.insert("SYNTH".to_string(), 20.0);
        modelled_latency_ms.insert("COINBASE".to_string(), 30.0);
        modelled_latency_ms.insert("LSE".to_string(), 70.0);
        // Extra venues seeded from the original's LatencySimulator default
        // table so a `/control`-driven venue switch still gets sane latency
        // without requiring `--modelled_latency_ms`.
        modelled_latency_ms.insert("NASDAQ".to_string(), 20.0);
        modelled_latency_ms.insert("NYSE".to_string(), 15.0);
        modelled_latency_ms.insert("CBOE".to_string(), 25.0);

        Config {
            source: SourceKind::Synthetic,
            exchange: ExchangeKind::Coinbase,
            symbol: "BTC-USD".to_string(),
            replay_file: "./ticks.ndjson".to_string(),
            replay_speed: 1.0,
            latency_mode: LatencyMode::Both,
            modelled_latency_ms,
            strategy: "momentum".to_string(),
            strategy_lookback: 3,
            strategy_order_qty: 100,
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Config {
        let mut cfg = Config::default();
        for arg in args {
            cfg.apply_flag(&arg);
        }
        cfg
    }

    pub fn venue_latency_ms(&self, venue: &str) -> f64 {
        self.modelled_latency_ms
            .get(venue)
            .copied()
            .unwrap_or(50.0)
    }

    fn apply_flag(&mut self, arg: &str) {
        let Some((flag, value)) = arg.split_once('=') else {
            return;
        };
        match flag {
            "--source" => match value {
                "synthetic" => self.source = SourceKind::Synthetic,
                "live" => self.source = SourceKind::Live,
                "replay" => self.source = SourceKind::Replay,
                _ => {}
            },
            "--exchange" => match value {
                "coinbase" => self.exchange = ExchangeKind::Coinbase,
                "binance" => self.exchange = ExchangeKind::Binance,
                _ => {}
            },
            "--symbol" => self.symbol = value.to_string(),
            "--replay_file" => self.replay_file = value.to_string(),
            "--replay_speed" => {
                if let Ok(v) = value.parse::<f64>() {
                    self.replay_speed = v;
                }
            }
            "--latency_mode" => match value {
                "measured" => self.latency_mode = LatencyMode::Measured,
                "modelled" => self.latency_mode = LatencyMode::Modelled,
                "both" => self.latency_mode = LatencyMode::Both,
                _ => {}
            },
            "--modelled_latency_ms" => {
                for token in value.split(',') {
                    if let Some((venue, ms)) = token.split_once(':') {
                        if let Ok(ms) = ms.parse::<f64>() {
                            self.modelled_latency_ms.insert(venue.to_string(), ms);
                        }
                    }
                }
            }
            "--strategy" => self.strategy = value.to_string(),
            "--lookback" => {
                if let Ok(v) = value.parse::<usize>() {
                    self.strategy_lookback = v;
                }
            }
            "--order_qty" => {
                if let Ok(v) = value.parse::<u32>() {
                    self.strategy_order_qty = v;
                }
            }
            "--port" => {
                if let Ok(v) = value.parse::<u16>() {
                    self.port = v;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.symbol, "BTC-USD");
        assert_eq!(cfg.strategy, "momentum");
        assert_eq!(cfg.venue_latency_ms("SYNTH"), 20.0);
        assert_eq!(cfg.venue_latency_ms("COINBASE"), 30.0);
        assert_eq!(cfg.venue_latency_ms("LSE"), 70.0);
        assert_eq!(cfg.venue_latency_ms("NASDAQ"), 20.0);
        assert_eq!(cfg.venue_latency_ms("NYSE"), 15.0);
        assert_eq!(cfg.venue_latency_ms("CBOE"), 25.0);
        assert_eq!(cfg.venue_latency_ms("TOKYO"), 50.0);
    }

    #[test]
    fn recognized_flags_override_defaults() {
        let cfg = Config::from_args(args(&[
            "--source=replay",
            "--strategy=rsi",
            "--lookback=14",
            "--modelled_latency_ms=SYNTH:5,NYSE:12.5",
        ]));
        assert_eq!(cfg.source, SourceKind::Replay);
        assert_eq!(cfg.strategy, "rsi");
        assert_eq!(cfg.strategy_lookback, 14);
        assert_eq!(cfg.venue_latency_ms("SYNTH"), 5.0);
        assert_eq!(cfg.venue_latency_ms("NYSE"), 12.5);
    }

    #[test]
    fn unrecognized_or_unparsable_values_are_ignored() {
        let cfg = Config::from_args(args(&[
            "--source=quantum",
            "--lookback=not_a_number",
            "--nonsense=1",
            "not_a_flag_at_all",
        ]));
        let default = Config::default();
        assert_eq!(cfg.source, default.source);
        assert_eq!(cfg.strategy_lookback, default.strategy_lookback);
    }
}
