//! Sweep controller.
//!
//! One sweep visits every camera in configuration order. Per camera the
//! controller walks the candidate clips in scan order and keeps a
//! [`SweepState`]: the first clip with a person moves the camera to
//! `Alerted`, and every later clip of that camera in the same sweep is
//! recorded in the ledger without being decoded.
//!
//! Each candidate is written to the ledger before the next one is looked at.
//! The winning clip's ledger row and its detection event are committed
//! together; the alert goes out only after that commit.
//!
//! Failures stay local to the camera they happened on: a camera whose pass
//! fails is logged and the sweep moves on to the next one.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::config::{CameraConfig, WatchConfig};
use crate::detect::{ClassLabels, DetectorBackend, PersonDetector, PersonSighting};
use crate::ingest::ClipOpener;
use crate::render::PageRenderer;
use crate::sample::{sample_clip, SampleOutcome};
use crate::scan::scan_camera;
use crate::storage::WatchStore;
use crate::transport::AlertEmitter;
use crate::{detection_timestamp, snapshot_file_name, DetectionEvent, VideoFile};

/// Granularity of the inter-sweep sleep, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Alert state of one camera within one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepState {
    #[default]
    NotAlerted,
    Alerted,
}

impl SweepState {
    /// Clips are only decoded while no alert has been raised.
    pub fn should_analyze(self) -> bool {
        self == SweepState::NotAlerted
    }

    /// State after a clip was handled. `Alerted` is terminal for the sweep.
    pub fn after(self, person_found: bool) -> SweepState {
        match self {
            SweepState::Alerted => SweepState::Alerted,
            SweepState::NotAlerted if person_found => SweepState::Alerted,
            SweepState::NotAlerted => SweepState::NotAlerted,
        }
    }
}

/// What happened to one camera during a sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraReport {
    pub camera: String,
    pub candidates: usize,
    pub analyzed: usize,
    /// Recorded without analysis because the camera had already alerted.
    pub skipped_after_alert: usize,
    pub unreadable: usize,
    /// Clips left out of the ledger for a retry.
    pub deferred: usize,
    /// Person found but the snapshot could not be written.
    pub failed_snapshots: usize,
    pub detection: Option<DetectionEvent>,
    /// A shutdown request stopped this camera before its last clip.
    pub interrupted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cameras that completed or were interrupted, in sweep order.
    pub cameras: Vec<CameraReport>,
    /// Cameras whose pass failed with an error.
    pub failed_cameras: Vec<String>,
    /// True when a shutdown request cut the sweep short.
    pub interrupted: bool,
}

impl SweepReport {
    pub fn detections(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.cameras.iter().filter_map(|c| c.detection.as_ref())
    }
}

pub struct SweepController<B> {
    config: WatchConfig,
    store: Box<dyn WatchStore>,
    opener: Box<dyn ClipOpener>,
    detector: PersonDetector<B>,
    alerts: Box<dyn AlertEmitter>,
    renderer: Box<dyn PageRenderer>,
    labels: ClassLabels,
    stop: Arc<AtomicBool>,
}

impl<B: DetectorBackend> SweepController<B> {
    pub fn new(
        config: WatchConfig,
        store: Box<dyn WatchStore>,
        opener: Box<dyn ClipOpener>,
        detector: PersonDetector<B>,
        alerts: Box<dyn AlertEmitter>,
        renderer: Box<dyn PageRenderer>,
    ) -> Self {
        Self {
            config,
            store,
            opener,
            detector,
            alerts,
            renderer,
            labels: ClassLabels::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_labels(mut self, labels: ClassLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Share a shutdown flag with a signal handler.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn WatchStore {
        self.store.as_ref()
    }

    pub fn detector(&self) -> &PersonDetector<B> {
        &self.detector
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sweep forever, sleeping the configured interval between sweeps, until
    /// the stop flag is raised.
    pub fn run(&mut self) {
        while !self.stop_requested() {
            let report = self.run_sweep();
            let candidates: usize = report.cameras.iter().map(|c| c.candidates).sum();
            log::info!(
                "sweep done: {} cameras, {} new clips, {} detections, {} failed cameras",
                report.cameras.len(),
                candidates,
                report.detections().count(),
                report.failed_cameras.len()
            );
            self.sleep_interval();
        }
        log::info!("stop requested, sweep loop exiting");
    }

    /// Flush and release the alert transport. Call once before exiting.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.alerts.shutdown() {
            log::warn!("alert transport shutdown failed: {:#}", e);
        }
    }

    fn sleep_interval(&self) {
        let deadline = Instant::now() + self.config.sweep_interval;
        while !self.stop_requested() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            std::thread::sleep(left.min(SLEEP_SLICE));
        }
    }

    /// One pass over every camera. A camera whose pass fails is logged and
    /// recorded in the report; the remaining cameras still run.
    pub fn run_sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let cameras = self.config.cameras.clone();
        for camera in &cameras {
            if self.stop_requested() {
                report.interrupted = true;
                break;
            }
            match self.sweep_camera(camera) {
                Ok(camera_report) => {
                    let interrupted = camera_report.interrupted;
                    report.cameras.push(camera_report);
                    if interrupted {
                        report.interrupted = true;
                        break;
                    }
                }
                Err(e) => {
                    log::error!("camera {}: pass aborted: {:#}", camera.name, e);
                    report.failed_cameras.push(camera.name.clone());
                }
            }
        }
        report
    }

    fn sweep_camera(&mut self, camera: &CameraConfig) -> Result<CameraReport> {
        let candidates = scan_camera(
            camera,
            &self.config.scan,
            self.store.as_ref(),
            SystemTime::now(),
        )?;
        let mut report = CameraReport {
            camera: camera.name.clone(),
            candidates: candidates.len(),
            ..CameraReport::default()
        };
        if !candidates.is_empty() {
            log::info!("camera {}: {} new clips", camera.name, candidates.len());
        }

        let mut state = SweepState::default();
        for video in &candidates {
            if self.stop_requested() {
                report.interrupted = true;
                break;
            }

            if !state.should_analyze() {
                self.store.mark_processed(&video.ledger_key())?;
                report.skipped_after_alert += 1;
                continue;
            }

            report.analyzed += 1;
            let found = self.analyze(video, &mut report)?;
            state = state.after(found);
        }
        Ok(report)
    }

    /// Decode and check one clip, then record it. Returns true on a detection.
    fn analyze(&mut self, video: &VideoFile, report: &mut CameraReport) -> Result<bool> {
        log::info!("analyzing {} {}", video.camera, video.path.display());
        let started = Instant::now();
        let outcome = sample_clip(
            self.opener.as_ref(),
            &video.path,
            self.config.frame_stride,
            &mut self.detector,
        );
        log::info!(
            "  detection took {:.4} seconds",
            started.elapsed().as_secs_f64()
        );

        match outcome {
            SampleOutcome::Found(sighting) => {
                let now = Local::now();
                let image_path = match self.write_snapshot(&sighting, &now) {
                    Ok(path) => path,
                    Err(e) => {
                        report.failed_snapshots += 1;
                        let action = self.defer_or_mark(video, report)?;
                        log::error!(
                            "  cannot save snapshot for {}, {}: {:#}",
                            video.path.display(),
                            action,
                            e
                        );
                        return Ok(false);
                    }
                };
                let event = self.record_detection(video, &sighting, &image_path, &now)?;
                report.detection = Some(event);
                Ok(true)
            }
            SampleOutcome::NotFound { frames_decoded } => {
                log::debug!("  no person in {} frames", frames_decoded);
                self.store.mark_processed(&video.ledger_key())?;
                Ok(false)
            }
            SampleOutcome::ReadError(e) => {
                report.unreadable += 1;
                let action = self.defer_or_mark(video, report)?;
                log::warn!(
                    "  cannot read {}, {}: {:#}",
                    video.path.display(),
                    action,
                    e
                );
                Ok(false)
            }
        }
    }

    /// Apply the `retry_unreadable` policy to a clip whose outcome could not
    /// be recorded. Returns the action taken, for logging.
    fn defer_or_mark(
        &mut self,
        video: &VideoFile,
        report: &mut CameraReport,
    ) -> Result<&'static str> {
        if self.config.retry_unreadable {
            report.deferred += 1;
            Ok("retrying next sweep")
        } else {
            self.store.mark_processed(&video.ledger_key())?;
            Ok("marking processed")
        }
    }

    /// Save the annotated frame into the detection dir and refresh the
    /// fixed-name copy.
    fn write_snapshot(&self, sighting: &PersonSighting, now: &DateTime<Local>) -> Result<PathBuf> {
        let detection = &self.config.detection;
        std::fs::create_dir_all(&detection.dir).with_context(|| {
            format!(
                "failed to create detection dir {}",
                detection.dir.display()
            )
        })?;

        let image_path = unique_snapshot_path(&detection.dir, &snapshot_file_name(now));
        sighting.frame.save_jpeg(&image_path)?;
        if let Err(e) = std::fs::copy(&image_path, &detection.last_file) {
            log::warn!(
                "failed to update {}: {}",
                detection.last_file.display(),
                e
            );
        }
        Ok(image_path)
    }

    fn record_detection(
        &mut self,
        video: &VideoFile,
        sighting: &PersonSighting,
        image_path: &Path,
        now: &DateTime<Local>,
    ) -> Result<DetectionEvent> {
        let event = DetectionEvent {
            camera: video.camera.clone(),
            image_path: image_path.to_string_lossy().into_owned(),
            video_path: video.ledger_key(),
            timestamp: detection_timestamp(now),
        };
        self.store.commit_detection(&event)?;
        log::info!(
            "  {} detected on {} at {} (frame {}, confidence {:.2})",
            self.labels.name(sighting.detection.class_id),
            event.camera,
            event.timestamp,
            sighting.frame.index,
            sighting.detection.confidence
        );

        if let Err(e) = self.alerts.emit(image_path) {
            log::warn!("alert for {} failed: {:#}", event.camera, e);
        }
        self.render_page();
        Ok(event)
    }

    /// Regenerate the status page. Failures are logged only.
    pub fn render_page(&mut self) {
        let detections = match self
            .store
            .recent_detections(self.config.detection.page_detections)
        {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("cannot load detections for status page: {:#}", e);
                return;
            }
        };
        if let Err(e) = self.renderer.render(&detections) {
            log::warn!("status page render failed: {:#}", e);
        }
    }
}

/// `dir/name`, or `dir/<stem>-N.jpg` when that file already exists.
fn unique_snapshot_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let stem = name.strip_suffix(".jpg").unwrap_or(name);
    (1u32..)
        .map(|n| dir.join(format!("{}-{}.jpg", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectionSettings, ModelSettings, ScanSettings};
    use crate::detect::StubBackend;
    use crate::ingest::FrameSource;
    use crate::storage::InMemoryWatchStore;
    use crate::transport::LogAlertEmitter;
    use anyhow::anyhow;

    /// Fails every open. Optionally raises a stop flag on the first open.
    #[derive(Default)]
    struct Unreadable {
        raise_stop: Option<Arc<AtomicBool>>,
    }

    impl ClipOpener for Unreadable {
        fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
            if let Some(stop) = &self.raise_stop {
                stop.store(true, Ordering::SeqCst);
            }
            Err(anyhow!("cannot open {}", path.display()))
        }
    }

    /// In-memory store whose ledger writes fail under one directory.
    struct FailingUnder {
        inner: InMemoryWatchStore,
        prefix: String,
    }

    impl WatchStore for FailingUnder {
        fn is_processed(&self, video_path: &str) -> Result<bool> {
            self.inner.is_processed(video_path)
        }

        fn mark_processed(&mut self, video_path: &str) -> Result<bool> {
            if video_path.starts_with(&self.prefix) {
                return Err(anyhow!("database is locked"));
            }
            self.inner.mark_processed(video_path)
        }

        fn commit_detection(&mut self, event: &DetectionEvent) -> Result<()> {
            self.inner.commit_detection(event)
        }

        fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
            self.inner.recent_detections(limit)
        }

        fn processed_count(&self) -> Result<u64> {
            self.inner.processed_count()
        }
    }

    struct NoPage;

    impl PageRenderer for NoPage {
        fn render(&mut self, _detections: &[DetectionEvent]) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    /// Cameras "front" (a.mp4, b.mp4) and "back" (c.mp4) under `root`.
    fn controller(
        root: &Path,
        opener: Unreadable,
        store: Box<dyn WatchStore>,
    ) -> SweepController<StubBackend> {
        let mut cameras = Vec::new();
        for (name, clips) in [("front", &["a.mp4", "b.mp4"][..]), ("back", &["c.mp4"][..])] {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for clip in clips {
                std::fs::write(dir.join(clip), b"data").unwrap();
            }
            cameras.push(CameraConfig {
                name: name.into(),
                dir,
            });
        }
        let config = WatchConfig {
            db_path: root.join("unused.db"),
            cameras,
            scan: ScanSettings::default(),
            frame_stride: 1,
            sweep_interval: Duration::from_secs(1),
            retry_unreadable: false,
            detection: DetectionSettings::new(root.join("det")),
            model: ModelSettings {
                path: root.join("model.onnx"),
                input_size: 224,
                labels_path: None,
            },
            mqtt: None,
        };
        SweepController::new(
            config,
            store,
            Box::new(opener),
            PersonDetector::new(StubBackend::new()),
            Box::new(LogAlertEmitter),
            Box::new(NoPage),
        )
    }

    fn memory_store() -> Box<dyn WatchStore> {
        Box::new(InMemoryWatchStore::new())
    }

    #[test]
    fn unreadable_clips_are_recorded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path(), Unreadable::default(), memory_store());
        let report = controller.run_sweep();
        assert!(!report.interrupted);
        assert!(report.failed_cameras.is_empty());
        assert_eq!(report.cameras[0].unreadable, 2);
        assert_eq!(report.cameras[1].unreadable, 1);
        assert_eq!(controller.store().processed_count().unwrap(), 3);
        // Render failures are swallowed.
        controller.render_page();
    }

    #[test]
    fn stop_flag_ends_the_sweep_before_any_camera() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        let mut controller = controller(dir.path(), Unreadable::default(), memory_store())
            .with_stop_flag(Arc::clone(&stop));
        let report = controller.run_sweep();
        assert!(report.interrupted);
        assert!(report.cameras.is_empty());
        assert_eq!(controller.store().processed_count().unwrap(), 0);
        // With the flag raised, run returns without sweeping.
        controller.run();
        assert_eq!(controller.store().processed_count().unwrap(), 0);
    }

    #[test]
    fn stop_between_files_marks_the_sweep_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let opener = Unreadable {
            raise_stop: Some(Arc::clone(&stop)),
        };
        let mut controller =
            controller(dir.path(), opener, memory_store()).with_stop_flag(Arc::clone(&stop));
        let report = controller.run_sweep();

        assert!(report.interrupted);
        assert_eq!(report.cameras.len(), 1);
        assert!(report.cameras[0].interrupted);
        assert_eq!(report.cameras[0].analyzed, 1);
        // The clip in progress is finished, the next one is left for later.
        assert_eq!(controller.store().processed_count().unwrap(), 1);
    }

    #[test]
    fn failing_camera_does_not_block_later_cameras() {
        let dir = tempfile::tempdir().unwrap();
        let store = FailingUnder {
            inner: InMemoryWatchStore::new(),
            prefix: dir.path().join("front").to_string_lossy().into_owned(),
        };
        let mut controller = controller(dir.path(), Unreadable::default(), Box::new(store));
        let report = controller.run_sweep();

        assert_eq!(report.failed_cameras, vec!["front".to_string()]);
        assert_eq!(report.cameras.len(), 1);
        assert_eq!(report.cameras[0].camera, "back");
        let back = dir.path().join("back/c.mp4");
        assert!(controller
            .store()
            .is_processed(&back.to_string_lossy())
            .unwrap());
    }

    #[test]
    fn first_detection_is_terminal() {
        let s = SweepState::default();
        assert!(s.should_analyze());
        let s = s.after(false);
        assert_eq!(s, SweepState::NotAlerted);
        let s = s.after(true);
        assert_eq!(s, SweepState::Alerted);
        assert!(!s.should_analyze());
        assert_eq!(s.after(false), SweepState::Alerted);
        assert_eq!(s.after(true), SweepState::Alerted);
    }

    #[test]
    fn snapshot_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let name = "2024-05-01_10:00:00.jpg";
        let first = unique_snapshot_path(dir.path(), name);
        assert_eq!(first, dir.path().join(name));
        std::fs::write(&first, b"x").unwrap();
        let second = unique_snapshot_path(dir.path(), name);
        assert_eq!(second, dir.path().join("2024-05-01_10:00:00-1.jpg"));
    }
}
