use clap::{Parser, Subcommand};

mod commands;
mod context;

use context::Context;

#[derive(Parser)]
#[command(name = "attendance-sync", version, about = "Offline-first attendance sync")]
struct Cli {
    /// Treat the network as unreachable; nothing is sent
    #[arg(long, global = true)]
    offline: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attendance records
    Record {
        #[command(subcommand)]
        action: commands::record::RecordAction,
    },
    /// Print the number of records awaiting delivery
    Pending,
    /// Deliver pending records now
    Sync,
    /// Show connectivity and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Offline lecture and roster cache
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },
    /// Delete every local record and cache entry
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Monitor connectivity and sync on reconnect until Ctrl-C
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Config commands must work even when the store cannot be opened.
    let command = match cli.command {
        Commands::Config { action } => return commands::config::run(action),
        other => other,
    };

    let ctx = Context::open(cli.offline).await?;
    match command {
        Commands::Record { action } => commands::record::run(action, &ctx).await,
        Commands::Pending => {
            println!("{}", ctx.engine.pending_records_count());
            Ok(())
        }
        Commands::Sync => commands::sync::run(&ctx).await,
        Commands::Status { json } => commands::status::run(&ctx, json).await,
        Commands::Cache { action } => commands::cache::run(action, &ctx).await,
        Commands::Clear { yes } => commands::clear::run(&ctx, yes).await,
        Commands::Watch { interval } => commands::watch::run(&ctx, interval).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
