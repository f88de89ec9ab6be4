//! Status page.
//!
//! After every detection the controller hands the most recent detections,
//! newest first, to a [`PageRenderer`]. Rendering failures are logged by the
//! caller and never stop a sweep.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::DetectionEvent;

pub const INDEX_FILE_NAME: &str = "index.html";

pub trait PageRenderer {
    fn render(&mut self, detections: &[DetectionEvent]) -> Result<()>;
}

impl<R: PageRenderer + ?Sized> PageRenderer for Box<R> {
    fn render(&mut self, detections: &[DetectionEvent]) -> Result<()> {
        (**self).render(detections)
    }
}

/// Writes a static `index.html` next to the snapshots.
#[derive(Clone, Debug)]
pub struct HtmlPageRenderer {
    out_path: PathBuf,
}

impl HtmlPageRenderer {
    pub fn new(detection_dir: &Path) -> Self {
        Self {
            out_path: detection_dir.join(INDEX_FILE_NAME),
        }
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }
}

impl PageRenderer for HtmlPageRenderer {
    fn render(&mut self, detections: &[DetectionEvent]) -> Result<()> {
        let html = render_html(detections);
        // Write then rename so a reader never sees a half-written page.
        let tmp = self.out_path.with_extension("html.tmp");
        std::fs::write(&tmp, html)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.out_path)
            .with_context(|| format!("failed to replace {}", self.out_path.display()))?;
        Ok(())
    }
}

pub fn render_html(detections: &[DetectionEvent]) -> String {
    let mut out = String::new();
    out.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Detections</title>\n</head>\n<body>\n<h1>Detections</h1>\n",
    );
    if detections.is_empty() {
        out.push_str("<p>No detections yet.</p>\n");
    } else {
        out.push_str(
            "<table>\n<tr><th>Time</th><th>Camera</th><th>Snapshot</th><th>Video</th></tr>\n",
        );
        for d in detections {
            let image = escape_html(d.image_file_name());
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td>\
                 <td><a href=\"{img}\"><img src=\"{img}\" width=\"320\"></a></td>\
                 <td>{}</td></tr>",
                escape_html(&d.timestamp),
                escape_html(&d.camera),
                escape_html(&d.video_path),
                img = image,
            );
        }
        out.push_str("</table>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(camera: &str, ts: &str) -> DetectionEvent {
        DetectionEvent {
            camera: camera.into(),
            image_path: format!("/srv/det/{}.jpg", ts.replace(' ', "_")),
            video_path: "/rec/front/a.mp4".into(),
            timestamp: ts.into(),
        }
    }

    #[test]
    fn lists_detections_in_given_order() {
        let html = render_html(&[
            det("back", "2024-05-02 09:00:00"),
            det("front", "2024-05-01 10:00:00"),
        ]);
        let back = html.find("back").unwrap();
        let front = html.find("front</td>").unwrap();
        assert!(back < front);
        assert!(html.contains("href=\"2024-05-02_09:00:00.jpg\""));
    }

    #[test]
    fn escapes_markup() {
        let html = render_html(&[det("<script>", "2024-05-01 10:00:00")]);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn writes_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = HtmlPageRenderer::new(dir.path());
        renderer.render(&[]).unwrap();
        let body = std::fs::read_to_string(renderer.out_path()).unwrap();
        assert!(body.contains("No detections yet."));
    }
}
