//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clipwatch::config::{CameraConfig, DetectionSettings, ModelSettings, ScanSettings};
use clipwatch::detect::Candidate;
use clipwatch::{
    AlertEmitter, ClipOpener, DetectionEvent, Frame, FrameSource, PageRenderer, StubBackend,
    WatchConfig,
};

/// Marker pixel value for frames that contain a person.
const PERSON_MARK: u8 = 200;

/// How a scripted clip decodes.
#[derive(Clone, Debug)]
pub struct ClipScript {
    pub frames: u64,
    /// 1-based index of the frame that shows a person.
    pub person_at: Option<u64>,
    pub unreadable: bool,
}

impl ClipScript {
    pub fn empty_scene(frames: u64) -> Self {
        Self {
            frames,
            person_at: None,
            unreadable: false,
        }
    }

    pub fn person_at(frames: u64, index: u64) -> Self {
        Self {
            frames,
            person_at: Some(index),
            unreadable: false,
        }
    }

    pub fn unreadable() -> Self {
        Self {
            frames: 0,
            person_at: None,
            unreadable: true,
        }
    }
}

/// Opens clips by file name from a script; records opens and decode depth.
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    scripts: Rc<RefCell<HashMap<String, ClipScript>>>,
    pub opened: Rc<RefCell<Vec<PathBuf>>>,
    /// Highest frame index decoded per file name.
    pub decoded: Rc<RefCell<HashMap<String, u64>>>,
}

impl ScriptedOpener {
    pub fn script(&self, file_name: &str, script: ClipScript) {
        self.scripts
            .borrow_mut()
            .insert(file_name.to_string(), script);
    }

    pub fn opened_names(&self) -> Vec<String> {
        self.opened
            .borrow()
            .iter()
            .map(|p| file_name(p))
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ClipOpener for ScriptedOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        self.opened.borrow_mut().push(path.to_path_buf());
        let name = file_name(path);
        let script = self
            .scripts
            .borrow()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ClipScript::empty_scene(30));
        if script.unreadable {
            return Err(anyhow!("moov atom not found in {}", name));
        }
        Ok(Box::new(ScriptedSource {
            name,
            script,
            next: 0,
            decoded: Rc::clone(&self.decoded),
        }))
    }
}

struct ScriptedSource {
    name: String,
    script: ClipScript,
    next: u64,
    decoded: Rc<RefCell<HashMap<String, u64>>>,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.script.frames {
            return Ok(None);
        }
        self.next += 1;
        self.decoded.borrow_mut().insert(self.name.clone(), self.next);
        let mut image = RgbImage::new(64, 48);
        if self.script.person_at == Some(self.next) {
            image.put_pixel(0, 0, Rgb([PERSON_MARK, 0, 0]));
        }
        Ok(Some(Frame::new(self.next, image)))
    }
}

/// Reports a centered person at confidence 0.6 on marked frames.
pub fn marker_backend() -> StubBackend {
    StubBackend::from_fn(|frame| {
        if frame.image().get_pixel(0, 0)[0] == PERSON_MARK {
            vec![Candidate {
                center_x: 0.5,
                center_y: 0.5,
                width: 0.25,
                height: 0.5,
                class_scores: vec![0.6, 0.1],
            }]
        } else {
            Vec::new()
        }
    })
}

#[derive(Clone, Default)]
pub struct RecordingAlerts {
    pub snapshots: Rc<RefCell<Vec<PathBuf>>>,
    pub shut_down: Rc<RefCell<bool>>,
}

impl AlertEmitter for RecordingAlerts {
    fn emit(&mut self, snapshot: &Path) -> Result<()> {
        self.snapshots.borrow_mut().push(snapshot.to_path_buf());
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        *self.shut_down.borrow_mut() = true;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub pages: Rc<RefCell<Vec<Vec<DetectionEvent>>>>,
}

impl PageRenderer for RecordingRenderer {
    fn render(&mut self, detections: &[DetectionEvent]) -> Result<()> {
        self.pages.borrow_mut().push(detections.to_vec());
        Ok(())
    }
}

/// Config with one camera directory per name under `root`, stride 1.
pub fn test_config(root: &Path, cameras: &[&str]) -> WatchConfig {
    let cameras = cameras
        .iter()
        .map(|name| {
            let dir = root.join("rec").join(name);
            std::fs::create_dir_all(&dir).unwrap();
            CameraConfig {
                name: name.to_string(),
                dir,
            }
        })
        .collect();
    WatchConfig {
        db_path: root.join("clipwatch.db"),
        cameras,
        scan: ScanSettings::default(),
        frame_stride: 1,
        sweep_interval: std::time::Duration::from_secs(1),
        retry_unreadable: false,
        detection: DetectionSettings::new(root.join("detections")),
        model: ModelSettings {
            path: root.join("model.onnx"),
            input_size: 224,
            labels_path: None,
        },
        mqtt: None,
    }
}

/// Create a non-empty clip file.
pub fn write_clip(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"not really mp4").unwrap();
}
