//! Clip decoding.
//!
//! Recorded clips are opened through a [`ClipOpener`], which hands back a
//! forward-only [`FrameSource`]. The production opener decodes local files with
//! FFmpeg (feature: ingest-file-ffmpeg); tests plug in scripted sources.
//!
//! Sources never cache frames: each call to `next_frame` decodes the next one
//! and ownership passes to the caller.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;
use std::path::Path;

use crate::frame::Frame;

pub use file::FileClipOpener;

/// Forward cursor over the decoded frames of one clip.
pub trait FrameSource {
    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens clips for decoding.
pub trait ClipOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

impl<T: ClipOpener + ?Sized> ClipOpener for Box<T> {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        (**self).open(path)
    }
}
