//! clipwatchd - watch camera recording directories and alert on people.
//!
//! Each sweep scans every configured camera for new clips, samples frames of
//! each clip through the person detector, and raises at most one alert per
//! camera. Runs until Ctrl-C, or a single sweep with `--once`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clipwatch::detect::ClassLabels;
use clipwatch::transport::{LogAlertEmitter, MqttPublisher};
use clipwatch::{
    AlertEmitter, DetectorBackend, FileClipOpener, HtmlPageRenderer, MqttAlertEmitter,
    PersonDetector, SqliteWatchStore, SweepController, WatchConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Person detection over recorded camera clips")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CLIPWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single sweep and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = WatchConfig::load(args.config.as_deref())?;
    FileClipOpener::ensure_available()?;

    let mut backend = load_backend(&cfg)?;
    backend
        .warm_up()
        .with_context(|| format!("{} warm-up failed", backend.name()))?;
    let labels = match &cfg.model.labels_path {
        Some(path) => ClassLabels::load(path)?,
        None => ClassLabels::default(),
    };

    std::fs::create_dir_all(&cfg.detection.dir).with_context(|| {
        format!(
            "failed to create detection dir {}",
            cfg.detection.dir.display()
        )
    })?;
    let store = SqliteWatchStore::open(&cfg.db_path)?;
    let renderer = HtmlPageRenderer::new(&cfg.detection.dir);
    let alerts: Box<dyn AlertEmitter> = match &cfg.mqtt {
        Some(mqtt) => {
            let publisher = MqttPublisher::connect(mqtt)?;
            Box::new(MqttAlertEmitter::new(
                publisher,
                &mqtt.image_topic,
                &mqtt.motion_topic,
            ))
        }
        None => {
            log::warn!("no MQTT broker configured, alerts are only logged");
            Box::new(LogAlertEmitter)
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "clipwatchd running: {} cameras, ledger {}, detections in {}",
        cfg.cameras.len(),
        cfg.db_path.display(),
        cfg.detection.dir.display()
    );
    for camera in &cfg.cameras {
        log::info!("  camera {} -> {}", camera.name, camera.dir.display());
    }

    let mut controller = SweepController::new(
        cfg,
        Box::new(store),
        Box::new(FileClipOpener::new()),
        PersonDetector::new(backend),
        alerts,
        Box::new(renderer),
    )
    .with_labels(labels)
    .with_stop_flag(stop);

    controller.render_page();
    let mut failed_cameras = Vec::new();
    if args.once {
        let report = controller.run_sweep();
        log::info!("sweep done: {} detections", report.detections().count());
        failed_cameras = report.failed_cameras;
    } else {
        controller.run();
    }
    // Deliver queued alerts before exiting.
    controller.shutdown();

    if !failed_cameras.is_empty() {
        bail!("sweep failed for cameras: {}", failed_cameras.join(", "));
    }
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn load_backend(cfg: &WatchConfig) -> Result<clipwatch::detect::TractBackend> {
    if !cfg.model.path.is_file() {
        bail!("model file not found: {}", cfg.model.path.display());
    }
    clipwatch::detect::TractBackend::new(&cfg.model.path, cfg.model.input_size)
}

#[cfg(not(feature = "backend-tract"))]
fn load_backend(cfg: &WatchConfig) -> Result<clipwatch::StubBackend> {
    bail!(
        "cannot load {}: clipwatchd requires the backend-tract feature",
        cfg.model.path.display()
    )
}
