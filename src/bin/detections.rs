//! detections - print the most recent person detections, newest first.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use clipwatch::{SqliteWatchStore, WatchConfig, WatchStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "List recorded person detections")]
struct Args {
    /// Path to the TOML configuration file (used for the database path).
    #[arg(long, env = "CLIPWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Database path; takes precedence over the configuration file.
    #[arg(long, env = "CLIPWATCH_DB_PATH")]
    db_path: Option<PathBuf>,
    /// Number of detections to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let db_path = match args.db_path {
        Some(path) => path,
        None => WatchConfig::load(args.config.as_deref())?.db_path,
    };
    if !db_path.is_file() {
        bail!("database not found: {}", db_path.display());
    }

    let store = SqliteWatchStore::open(&db_path)?;
    let detections = store.recent_detections(args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&detections)?);
        return Ok(());
    }
    if detections.is_empty() {
        println!("no detections");
        return Ok(());
    }
    for d in &detections {
        println!("{}  {:<12} {}  ({})", d.timestamp, d.camera, d.image_path, d.video_path);
    }
    log::debug!("{} of {} files evaluated", detections.len(), store.processed_count()?);
    Ok(())
}
