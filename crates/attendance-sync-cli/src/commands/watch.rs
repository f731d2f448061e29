//! Long-running connectivity watch.

use std::time::Duration;
use tracing::debug;

use crate::context::Context;

pub async fn run(ctx: &Context, interval: u64) -> Result<(), Box<dyn std::error::Error>> {
    let monitor = ctx.engine.start_network_monitoring();
    println!(
        "Watching connectivity every {}s; {} record(s) pending. Ctrl-C to stop.",
        interval.max(1),
        ctx.engine.pending_records_count()
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    // The monitor probes on start; skip the immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                let online = ctx.source.probe().await;
                debug!(online, pending = ctx.engine.pending_records_count(), "re-probed");
            }
        }
    }

    monitor.stop();
    ctx.engine.shutdown().await;

    let status = ctx.engine.status().await;
    println!("Stopped. Pending: {}", status.pending_count);
    Ok(())
}
