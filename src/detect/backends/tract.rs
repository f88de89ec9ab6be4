#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Candidate;
use crate::frame::Frame;

/// Leading values of each output row before the class scores:
/// center x, center y, width, height, objectness.
const BOX_FIELDS: usize = 5;

/// Tract-based backend for YOLO-style ONNX models.
///
/// The model must take a single `1x3xSxS` RGB input scaled to 0..1 and emit
/// rows of `[cx, cy, w, h, objectness, class scores...]` with normalized
/// coordinates. Any number of output tensors is accepted; their rows are
/// concatenated.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        let mut candidates = Vec::new();
        for output in outputs.iter() {
            let row_len = *output
                .shape()
                .last()
                .ok_or_else(|| anyhow!("model output is a scalar"))?;
            if row_len <= BOX_FIELDS {
                return Err(anyhow!(
                    "model output rows have {} values, expected more than {}",
                    row_len,
                    BOX_FIELDS
                ));
            }
            let values = output
                .as_slice::<f32>()
                .context("model output tensor was not f32")?;
            candidates.extend(values.chunks_exact(row_len).map(candidate_from_row));
        }
        Ok(candidates)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(0, image::RgbImage::new(self.input_size, self.input_size));
        self.infer(&blank).map(|_| ())
    }
}

fn candidate_from_row(row: &[f32]) -> Candidate {
    Candidate {
        center_x: row[0],
        center_y: row[1],
        width: row[2],
        height: row[3],
        class_scores: row[BOX_FIELDS..].to_vec(),
    }
}
