//! Greedy non-max suppression over pixel-space boxes.

use std::cmp::Ordering;

use crate::detect::result::DetectionBox;

/// Returns indices of the boxes that survive suppression, highest score first.
///
/// Boxes scoring at or below `score_threshold` are dropped up front. The
/// remaining boxes are visited in descending score order (ties keep input
/// order) and a box is kept only if its IoU with every box kept so far is at
/// most `iou_threshold`.
pub fn non_max_suppression(
    boxes: &[DetectionBox],
    score_threshold: f32,
    iou_threshold: f32,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len())
        .filter(|&i| boxes[i].confidence > score_threshold)
        .collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    for idx in order {
        let rect = &boxes[idx].rect;
        if keep
            .iter()
            .all(|&kept| rect.iou(&boxes[kept].rect) <= iou_threshold)
        {
            keep.push(idx);
        }
    }
    keep
}
