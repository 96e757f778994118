/// Demo: run the full tick→strategy→order→latency→book→broadcast pipeline
/// in-process against the synthetic generator, swap strategies live through
/// the `/control` endpoint, and print the resulting PnL.
///
/// Run with: `cargo run --example run_pipeline`, then in another terminal:
/// `curl "http://127.0.0.1:8099/control?strategy=breakout&lookback=5"`.
use tradepulse::config::Config;
use tradepulse::coordinator::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut cfg = Config::default();
    cfg.port = 8099;
    cfg.strategy = "momentum".to_string();
    cfg.strategy_lookback = 3;
    cfg.strategy_order_qty = 10;

    let addr = format!("0.0.0.0:{}", cfg.port);
    let pipeline = Pipeline::new(cfg, addr.clone());
    pipeline.start().await?;

    println!("tradepulse pipeline running on {addr}");
    println!("  connect a WebSocket client to ws://{addr} for trade/latency/heartbeat frames");
    println!("  GET http://{addr}/info to see the active strategy");
    println!("  GET http://{addr}/control?strategy=mean_reversion&lookback=5 to hot-swap it");

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;

    println!(
        "after 5s: {} connected client(s), total_pnl = {:.6}",
        pipeline.client_count().await,
        pipeline.total_pnl()
    );

    pipeline.stop().await;
    Ok(())
}
