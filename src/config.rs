use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "clipwatch.db";
const DEFAULT_VIDEO_EXTENSION: &str = ".mp4";
const DEFAULT_FRAME_STRIDE: u64 = 10;
const DEFAULT_STALE_AFTER_SECS: u64 = 2 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_DETECTION_DIR: &str = "detections";
const DEFAULT_LAST_DETECTION_NAME: &str = "last_detection.jpg";
const DEFAULT_PAGE_DETECTIONS: usize = 20;
const DEFAULT_MODEL_PATH: &str = "model.onnx";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 224;
const DEFAULT_MQTT_CLIENT_ID: &str = "clipwatch";
const DEFAULT_IMAGE_TOPIC: &str = "clipwatch/snapshot";
const DEFAULT_MOTION_TOPIC: &str = "clipwatch/motion";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatchConfigFile {
    db_path: Option<PathBuf>,
    video_extension: Option<String>,
    frame_stride: Option<u64>,
    stale_after_secs: Option<u64>,
    stale_policy: Option<StalePolicy>,
    sweep_interval_secs: Option<u64>,
    retry_unreadable: Option<bool>,
    detection: Option<DetectionConfigFile>,
    model: Option<ModelConfigFile>,
    mqtt: Option<MqttConfigFile>,
    #[serde(default)]
    cameras: Vec<CameraConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    dir: Option<PathBuf>,
    last_file: Option<PathBuf>,
    page_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_size: Option<u32>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    image_topic: Option<String>,
    motion_topic: Option<String>,
}

/// How a directory with an out-of-date subdirectory is handled by the scanner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Skip the directory and everything below it.
    #[default]
    PruneSubtree,
    /// Skip only the files directly inside the directory; keep descending.
    SkipFiles,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraConfig {
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub db_path: PathBuf,
    /// Cameras in sweep order.
    pub cameras: Vec<CameraConfig>,
    pub scan: ScanSettings,
    /// Every Nth decoded frame goes to the detector.
    pub frame_stride: u64,
    pub sweep_interval: Duration,
    /// Leave unreadable clips out of the ledger so the next sweep retries them.
    pub retry_unreadable: bool,
    pub detection: DetectionSettings,
    pub model: ModelSettings,
    pub mqtt: Option<MqttSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub video_extension: String,
    pub stale_after: Duration,
    pub stale_policy: StalePolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            video_extension: DEFAULT_VIDEO_EXTENSION.to_string(),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            stale_policy: StalePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSettings {
    /// Snapshots and the status page are written here.
    pub dir: PathBuf,
    /// Fixed-name copy of the most recent snapshot.
    pub last_file: PathBuf,
    /// Number of detections listed on the status page.
    pub page_detections: usize,
}

impl DetectionSettings {
    pub fn new(dir: PathBuf) -> Self {
        let last_file = dir.join(DEFAULT_LAST_DETECTION_NAME);
        Self {
            dir,
            last_file,
            page_detections: DEFAULT_PAGE_DETECTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub input_size: u32,
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub image_topic: String,
    pub motion_topic: String,
}

impl WatchConfig {
    /// Load from `path`, or from `CLIPWATCH_CONFIG` when no path is given,
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("CLIPWATCH_CONFIG").ok().map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => WatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document. No environment overrides are applied.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: WatchConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchConfigFile) -> Self {
        let scan = ScanSettings {
            video_extension: file
                .video_extension
                .unwrap_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string()),
            stale_after: Duration::from_secs(
                file.stale_after_secs.unwrap_or(DEFAULT_STALE_AFTER_SECS),
            ),
            stale_policy: file.stale_policy.unwrap_or_default(),
        };

        let detection_file = file.detection.unwrap_or_default();
        let mut detection = DetectionSettings::new(
            detection_file
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTION_DIR)),
        );
        if let Some(last_file) = detection_file.last_file {
            detection.last_file = last_file;
        }
        if let Some(count) = detection_file.page_detections {
            detection.page_detections = count;
        }

        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            path: model_file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: model_file.input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            labels_path: model_file.labels_path,
        };

        let mqtt = file.mqtt.and_then(|mqtt| {
            let broker = mqtt.broker?;
            Some(MqttSettings {
                broker,
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                username: mqtt.username,
                password: mqtt.password,
                image_topic: mqtt
                    .image_topic
                    .unwrap_or_else(|| DEFAULT_IMAGE_TOPIC.to_string()),
                motion_topic: mqtt
                    .motion_topic
                    .unwrap_or_else(|| DEFAULT_MOTION_TOPIC.to_string()),
            })
        });

        Self {
            db_path: file
                .db_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            cameras: file.cameras,
            scan,
            frame_stride: file.frame_stride.unwrap_or(DEFAULT_FRAME_STRIDE),
            sweep_interval: Duration::from_secs(
                file.sweep_interval_secs
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
            retry_unreadable: file.retry_unreadable.unwrap_or(false),
            detection,
            model,
            mqtt,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("CLIPWATCH_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty_env("CLIPWATCH_DETECTION_DIR") {
            let last_name = self
                .detection
                .last_file
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| DEFAULT_LAST_DETECTION_NAME.into());
            self.detection.dir = PathBuf::from(dir);
            self.detection.last_file = self.detection.dir.join(last_name);
        }
        if let Some(secs) = non_empty_env("CLIPWATCH_SWEEP_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("CLIPWATCH_SWEEP_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(broker) = non_empty_env("CLIPWATCH_MQTT_BROKER") {
            match self.mqtt.as_mut() {
                Some(mqtt) => mqtt.broker = broker,
                None => {
                    self.mqtt = Some(MqttSettings {
                        broker,
                        client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
                        username: None,
                        password: None,
                        image_topic: DEFAULT_IMAGE_TOPIC.to_string(),
                        motion_topic: DEFAULT_MOTION_TOPIC.to_string(),
                    })
                }
            }
        }
        if let Some(mqtt) = self.mqtt.as_mut() {
            if let Some(user) = non_empty_env("CLIPWATCH_MQTT_USERNAME") {
                mqtt.username = Some(user);
            }
            if let Some(pass) = non_empty_env("CLIPWATCH_MQTT_PASSWORD") {
                mqtt.password = Some(pass);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one [[cameras]] entry is required"));
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(anyhow!("camera names must not be empty"));
            }
            if !seen.insert(camera.name.as_str()) {
                return Err(anyhow!("duplicate camera name '{}'", camera.name));
            }
        }
        if self.frame_stride == 0 {
            return Err(anyhow!("frame_stride must be at least 1"));
        }
        if self.sweep_interval.is_zero() {
            return Err(anyhow!("sweep interval must be greater than zero"));
        }
        if self.scan.video_extension.trim().is_empty() {
            return Err(anyhow!("video_extension must not be empty"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input_size must be greater than zero"));
        }
        if let Some(mqtt) = &self.mqtt {
            if mqtt.image_topic.is_empty() || mqtt.motion_topic.is_empty() {
                return Err(anyhow!("mqtt topics must not be empty"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
