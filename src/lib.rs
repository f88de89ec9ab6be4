//! clipwatch
//!
//! Watches per-camera recording directories for finished clips, looks for a
//! person in sampled frames of each new clip, and raises at most one alert per
//! camera per sweep. Every clip that has been looked at is remembered in a
//! durable ledger so restarts never re-analyze old footage.
//!
//! # Module Structure
//!
//! - `config`: resolved runtime configuration (`WatchConfig`)
//! - `scan`: directory walk with staleness pruning and ledger filtering
//! - `ingest`: clip decoding (`ClipOpener`, `FrameSource`)
//! - `detect`: inference backends, non-max suppression, person selection
//! - `sample`: strided frame sampling over one clip
//! - `storage`: processed-files ledger and detection log
//! - `transport`: alert publishing (MQTT)
//! - `render`: status page
//! - `sweep`: the per-camera alert state machine and the sweep loop
//! - Core types: `VideoFile`, `DetectionEvent`

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod render;
pub mod sample;
pub mod scan;
pub mod storage;
pub mod sweep;
pub mod transport;

pub use config::{CameraConfig, StalePolicy, WatchConfig};
pub use detect::{DetectorBackend, PersonDetector, StubBackend};
pub use frame::Frame;
pub use ingest::{ClipOpener, FileClipOpener, FrameSource};
pub use render::{HtmlPageRenderer, PageRenderer};
pub use sample::{sample_clip, SampleOutcome};
pub use storage::{InMemoryWatchStore, SqliteWatchStore, WatchStore};
pub use sweep::{SweepController, SweepReport, SweepState};
pub use transport::{AlertEmitter, MqttAlertEmitter, Publisher};

/// Timestamp layout stored with each detection.
pub const DETECTION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// File name layout of snapshot images.
pub const SNAPSHOT_FILE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S.jpg";

/// A clip found by the scanner during one sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub camera: String,
    pub size: u64,
}

impl VideoFile {
    /// Ledger key for this clip.
    pub fn ledger_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// A persisted person detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera: String,
    pub image_path: String,
    pub video_path: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}

impl DetectionEvent {
    /// Snapshot file name without its directory.
    pub fn image_file_name(&self) -> &str {
        self.image_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.image_path)
    }
}

pub fn detection_timestamp(at: &DateTime<Local>) -> String {
    at.format(DETECTION_TIMESTAMP_FORMAT).to_string()
}

pub fn snapshot_file_name(at: &DateTime<Local>) -> String {
    at.format(SNAPSHOT_FILE_FORMAT).to_string()
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_layouts() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(detection_timestamp(&at), "2024-03-09 07:05:01");
        assert_eq!(snapshot_file_name(&at), "2024-03-09_07:05:01.jpg");
    }

    #[test]
    fn image_file_name_strips_directory() {
        let ev = DetectionEvent {
            camera: "front".into(),
            image_path: "/srv/detections/2024-03-09_07:05:01.jpg".into(),
            video_path: "/cams/front/a.mp4".into(),
            timestamp: "2024-03-09 07:05:01".into(),
        };
        assert_eq!(ev.image_file_name(), "2024-03-09_07:05:01.jpg");
    }
}
