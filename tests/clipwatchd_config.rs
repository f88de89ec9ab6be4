use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use clipwatch::{StalePolicy, WatchConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CLIPWATCH_CONFIG",
        "CLIPWATCH_DB_PATH",
        "CLIPWATCH_DETECTION_DIR",
        "CLIPWATCH_SWEEP_INTERVAL_SECS",
        "CLIPWATCH_MQTT_BROKER",
        "CLIPWATCH_MQTT_USERNAME",
        "CLIPWATCH_MQTT_PASSWORD",
    ] {
        std::env::remove_var(key);
    }
}

const CONFIG: &str = r#"
db_path = "/var/lib/clipwatch/ledger.db"
video_extension = ".mkv"
frame_stride = 5
stale_after_secs = 3600
stale_policy = "skip_files"
sweep_interval_secs = 30
retry_unreadable = true

[detection]
dir = "/srv/detections"
page_detections = 50

[model]
path = "/opt/models/person.onnx"
input_size = 320
labels_path = "/opt/models/labels.txt"

[mqtt]
broker = "mqtt://broker.lan:1883"
image_topic = "cams/snapshot"

[[cameras]]
name = "front"
dir = "/rec/front"

[[cameras]]
name = "garage"
dir = "/rec/garage"
"#;

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, CONFIG.as_bytes()).expect("write config");

    std::env::set_var("CLIPWATCH_CONFIG", file.path());
    std::env::set_var("CLIPWATCH_SWEEP_INTERVAL_SECS", "90");
    std::env::set_var("CLIPWATCH_DETECTION_DIR", "/data/det");
    std::env::set_var("CLIPWATCH_MQTT_USERNAME", "watcher");

    let cfg = WatchConfig::load(None).expect("load config");

    assert_eq!(cfg.db_path, PathBuf::from("/var/lib/clipwatch/ledger.db"));
    assert_eq!(cfg.scan.video_extension, ".mkv");
    assert_eq!(cfg.scan.stale_after, Duration::from_secs(3600));
    assert_eq!(cfg.scan.stale_policy, StalePolicy::SkipFiles);
    assert_eq!(cfg.frame_stride, 5);
    assert!(cfg.retry_unreadable);
    assert_eq!(cfg.sweep_interval, Duration::from_secs(90));
    assert_eq!(cfg.detection.dir, PathBuf::from("/data/det"));
    assert_eq!(
        cfg.detection.last_file,
        PathBuf::from("/data/det/last_detection.jpg")
    );
    assert_eq!(cfg.detection.page_detections, 50);
    assert_eq!(cfg.model.input_size, 320);
    assert_eq!(
        cfg.model.labels_path,
        Some(PathBuf::from("/opt/models/labels.txt"))
    );

    let mqtt = cfg.mqtt.expect("mqtt settings");
    assert_eq!(mqtt.broker, "mqtt://broker.lan:1883");
    assert_eq!(mqtt.image_topic, "cams/snapshot");
    assert_eq!(mqtt.motion_topic, "clipwatch/motion");
    assert_eq!(mqtt.username.as_deref(), Some("watcher"));

    let names: Vec<_> = cfg.cameras.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["front", "garage"]);

    clear_env();
}

#[test]
fn explicit_path_wins_over_environment() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, CONFIG.as_bytes()).expect("write config");
    std::env::set_var("CLIPWATCH_CONFIG", "/nonexistent/clipwatch.toml");
    std::env::set_var("CLIPWATCH_DB_PATH", "/tmp/override.db");

    let cfg = WatchConfig::load(Some(file.path())).expect("load config");
    assert_eq!(cfg.db_path, PathBuf::from("/tmp/override.db"));
    assert_eq!(cfg.sweep_interval, Duration::from_secs(30));

    clear_env();
}

#[test]
fn broker_from_env_enables_mqtt() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        b"[[cameras]]\nname = \"front\"\ndir = \"/rec/front\"\n",
    )
    .expect("write config");
    std::env::set_var("CLIPWATCH_MQTT_BROKER", "127.0.0.1:1883");

    let cfg = WatchConfig::load(Some(file.path())).expect("load config");
    let mqtt = cfg.mqtt.expect("mqtt settings");
    assert_eq!(mqtt.broker, "127.0.0.1:1883");
    assert_eq!(mqtt.image_topic, "clipwatch/snapshot");

    clear_env();
}

#[test]
fn invalid_interval_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, CONFIG.as_bytes()).expect("write config");
    std::env::set_var("CLIPWATCH_SWEEP_INTERVAL_SECS", "soon");

    let err = WatchConfig::load(Some(file.path())).unwrap_err();
    assert!(format!("{err}").contains("CLIPWATCH_SWEEP_INTERVAL_SECS"));

    clear_env();
}
