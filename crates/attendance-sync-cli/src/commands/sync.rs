//! Manual delivery of pending attendance.

use crate::context::Context;

pub async fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    if !ctx.engine.probe_connectivity().await {
        println!(
            "Offline: {} record(s) pending, nothing sent.",
            ctx.engine.pending_records_count()
        );
        return Ok(());
    }

    let report = ctx.engine.sync_pending_records().await;
    ctx.engine.shutdown().await;

    println!("Synced: {}", report.success_count);
    println!("Failed: {}", report.failed_count);

    let status = ctx.engine.status().await;
    for failure in &status.errors {
        if failure.lecture_id.is_empty() {
            eprintln!("  local: {}", failure.message);
        } else {
            eprintln!(
                "  lecture {} ({} record(s)): {}",
                failure.lecture_id, failure.record_count, failure.message
            );
        }
    }
    println!("Pending: {}", status.pending_count);
    Ok(())
}
