use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{Candidate, DetectionBox, PersonSighting};
use crate::frame::{Frame, PixelRect, ANNOTATION_COLOR};

/// Candidates at or below this confidence are discarded before suppression.
pub const CONFIDENCE_FLOOR: f32 = 0.1;
/// Score threshold handed to non-max suppression.
pub const NMS_SCORE_THRESHOLD: f32 = 0.1;
/// Overlap threshold for non-max suppression. Low on purpose: one box per cluster.
pub const NMS_IOU_THRESHOLD: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorThresholds {
    pub confidence_floor: f32,
    pub nms_score: f32,
    pub nms_iou: f32,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            confidence_floor: CONFIDENCE_FLOOR,
            nms_score: NMS_SCORE_THRESHOLD,
            nms_iou: NMS_IOU_THRESHOLD,
        }
    }
}

/// Decides whether a frame contains a person.
pub struct PersonDetector<B> {
    backend: B,
    thresholds: DetectorThresholds,
}

impl<B: DetectorBackend> PersonDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            thresholds: DetectorThresholds::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run inference on `frame` and look for a person.
    ///
    /// On success the frame is returned with the person's box outlined. The
    /// first person box among the suppression survivors wins; the rest are not
    /// looked at.
    pub fn detect(&mut self, mut frame: Frame) -> Result<Option<PersonSighting>> {
        let candidates = self
            .backend
            .infer(&frame)
            .with_context(|| {
                format!(
                    "{} inference failed on frame {}",
                    self.backend.name(),
                    frame.index
                )
            })?;

        let boxes = to_pixel_boxes(
            &candidates,
            frame.width(),
            frame.height(),
            self.thresholds.confidence_floor,
        );
        let survivors =
            non_max_suppression(&boxes, self.thresholds.nms_score, self.thresholds.nms_iou);

        let Some(winner) = survivors
            .into_iter()
            .map(|idx| &boxes[idx])
            .find(|b| b.is_person())
        else {
            return Ok(None);
        };

        frame.draw_outline(&winner.rect, ANNOTATION_COLOR);
        Ok(Some(PersonSighting {
            frame,
            detection: winner.clone(),
        }))
    }
}

/// Keep candidates above `floor` and convert them to absolute pixel boxes.
///
/// Center and size are truncated to whole pixels before the top-left corner
/// is derived, so a box may start on a half pixel.
pub fn to_pixel_boxes(
    candidates: &[Candidate],
    frame_width: u32,
    frame_height: u32,
    floor: f32,
) -> Vec<DetectionBox> {
    let fw = frame_width as f32;
    let fh = frame_height as f32;
    candidates
        .iter()
        .filter_map(|c| {
            let (class_id, confidence) = c.best_class()?;
            if confidence <= floor {
                return None;
            }
            let center_x = (c.center_x * fw).trunc();
            let center_y = (c.center_y * fh).trunc();
            let w = (c.width * fw).trunc();
            let h = (c.height * fh).trunc();
            Some(DetectionBox {
                class_id,
                confidence,
                rect: PixelRect::new(center_x - w / 2.0, center_y - h / 2.0, w, h),
            })
        })
        .collect()
}
