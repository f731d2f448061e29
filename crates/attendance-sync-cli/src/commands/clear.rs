use crate::context::Context;

pub async fn run(ctx: &Context, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        let pending = ctx.engine.pending_records_count();
        return Err(format!(
            "refusing to clear local data ({pending} undelivered record(s)); pass --yes to confirm"
        )
        .into());
    }

    ctx.engine.clear_all_data().await?;
    println!("Local attendance data cleared.");
    Ok(())
}
