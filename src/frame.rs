//! Decoded video frames.
//!
//! A `Frame` owns one decoded RGB image together with its 1-based position in
//! the clip it came from. Frames are produced by the ingest layer, handed to the
//! detector, and dropped unless they carry a positive detection, in which case
//! the annotated frame is written to disk as the snapshot.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

/// Outline color used for detection annotations.
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Axis-aligned rectangle in absolute pixel coordinates (top-left origin).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another rectangle. Zero when the union is empty.
    pub fn iou(&self, other: &PixelRect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One decoded frame of a clip.
#[derive(Clone, Debug)]
pub struct Frame {
    /// 1-based index of this frame within its clip.
    pub index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(index: u64, pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))?;
        Ok(Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Draw a 1-pixel outline of `rect`, clipped to the frame.
    pub fn draw_outline(&mut self, rect: &PixelRect, color: Rgb<u8>) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        if w == 0 || h == 0 {
            return;
        }
        let left = rect.x.round() as i64;
        let top = rect.y.round() as i64;
        let right = (rect.x + rect.width).round() as i64;
        let bottom = (rect.y + rect.height).round() as i64;

        let mut put = |x: i64, y: i64| {
            if (0..w).contains(&x) && (0..h).contains(&y) {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        };

        for x in left.max(0)..=right.min(w - 1) {
            put(x, top);
            put(x, bottom);
        }
        for y in top.max(0)..=bottom.min(h - 1) {
            put(left, y);
            put(right, y);
        }
    }

    /// Write the frame as a JPEG file.
    pub fn save_jpeg(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }
}
