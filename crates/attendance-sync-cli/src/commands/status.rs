use chrono::{DateTime, Local, Utc};

use crate::context::Context;

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub async fn run(ctx: &Context, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    ctx.engine.probe_connectivity().await;
    let status = ctx.engine.status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Network:   {}", if status.is_online { "online" } else { "offline" });
    println!("Pending:   {}", status.pending_count);
    println!("Last sync: {}", format_time(status.last_sync_at));
    if status.last_online_at.is_some() {
        println!("Last seen online: {}", format_time(status.last_online_at));
    }
    Ok(())
}
