use crate::frame::{Frame, PixelRect};

/// Class id the detector treats as "person".
pub const PERSON_CLASS_ID: usize = 0;

/// Raw model output for one anchor, before any filtering.
///
/// Box coordinates are normalized to 0..1 relative to the frame and describe
/// the box center and size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_scores: Vec<f32>,
}

impl Candidate {
    /// Best-scoring class and its score. `None` when there are no class scores.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        self.class_scores
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (idx, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((idx, score)),
            })
    }
}

/// A candidate that passed the confidence floor, in absolute pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub class_id: usize,
    pub confidence: f32,
    pub rect: PixelRect,
}

impl DetectionBox {
    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

/// A frame in which a person was found, with the winning box drawn on it.
#[derive(Clone, Debug)]
pub struct PersonSighting {
    pub frame: Frame,
    pub detection: DetectionBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_class_picks_first_maximum() {
        let c = Candidate {
            class_scores: vec![0.2, 0.7, 0.7, 0.1],
            ..Candidate::default()
        };
        assert_eq!(c.best_class(), Some((1, 0.7)));
        assert_eq!(Candidate::default().best_class(), None);
    }
}
