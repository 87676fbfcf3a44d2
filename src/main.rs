use clap::Parser;
use live_tracking::api::{SnapshotFormatter, TextFormatter};
use live_tracking::{spawn_tracker, HttpEventSource, SubscriptionKey, TrackingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Follow the live telemetry stream of a trip
#[derive(Debug, Parser)]
#[command(name = "live-tracking", version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API root, overrides the configuration and TRACKING_BASE_URL
    #[arg(long)]
    base_url: Option<String>,

    /// Print snapshots as one-line summaries
    #[arg(long)]
    compact: bool,

    /// Trip to follow
    trip: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackingConfig::from_file(path)?,
        None => TrackingConfig::default(),
    }
    .with_env_overrides();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let key = SubscriptionKey::new(&args.trip)?;
    let source = Arc::new(HttpEventSource::new(config.clone())?);
    let handle = spawn_tracker(source, key, &config);

    // A terminal session is always on screen and focused.
    handle.set_visible(true)?;
    handle.set_focused(true)?;

    let formatter = TextFormatter {
        compact: args.compact,
    };
    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", formatter.format(&snapshot));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
