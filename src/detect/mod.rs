//! Person detection.
//!
//! A [`DetectorBackend`] runs the model and reports raw per-anchor candidates.
//! [`PersonDetector`] applies the confidence floor, converts boxes to pixel
//! space, runs non-max suppression and picks the first surviving person box.

mod backend;
mod backends;
mod labels;
mod nms;
mod person;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::ClassLabels;
pub use nms::non_max_suppression;
pub use person::{
    to_pixel_boxes, DetectorThresholds, PersonDetector, CONFIDENCE_FLOOR, NMS_IOU_THRESHOLD,
    NMS_SCORE_THRESHOLD,
};
pub use result::{Candidate, DetectionBox, PersonSighting, PERSON_CLASS_ID};
