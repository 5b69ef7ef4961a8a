use std::path::PathBuf;

use clap::Parser;
use manager::{LayerManager, ManagerConfig};
use runtime::SystemClock;
use surface::MemorySurface;
use tools::{apply_step, has_explicit_init, parse_script, snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replays a host command script against an in-memory render surface and
/// prints the resulting state as JSON.
#[derive(Debug, Parser)]
#[command(name = "layerctl")]
struct Args {
    /// JSON array of steps.
    script: PathBuf,
    /// Manager config JSON. Without it, `LAYERS_*` environment variables
    /// override the defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the snapshot here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("read {path:?}: {e}"))?;
            ManagerConfig::from_json_str(&text).map_err(|e| e.to_string())?
        }
        None => ManagerConfig::from_env(),
    };

    let text = tokio::fs::read_to_string(&args.script)
        .await
        .map_err(|e| format!("read {:?}: {e}", args.script))?;
    let steps = parse_script(&text)?;

    let mut mgr = LayerManager::new(config, SystemClock::new());
    if !has_explicit_init(&steps) {
        mgr.init(MemorySurface::new());
    }

    let total = steps.len();
    for (index, step) in steps.into_iter().enumerate() {
        if let Some(wait) = apply_step(&mut mgr, index, step) {
            tokio::time::sleep(wait).await;
            mgr.tick();
        }
    }
    if mgr.is_ready() {
        mgr.force_flush().map_err(|e| e.to_string())?;
    }
    info!(steps = total, "script finished");

    let out = serde_json::to_string_pretty(&snapshot(&mgr)).map_err(|e| e.to_string())?;
    match &args.out {
        Some(path) => tokio::fs::write(path, out)
            .await
            .map_err(|e| format!("write {path:?}: {e}"))?,
        None => println!("{out}"),
    }
    Ok(())
}
