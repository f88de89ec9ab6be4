//! Local file clip opener.
//!
//! `FileClipOpener` opens recorded clips from the local filesystem. Decoding is
//! done in-memory; nothing is written back to disk.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{ClipOpener, FrameSource};

/// Opens local video files with the decoder compiled into this build.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileClipOpener;

impl FileClipOpener {
    pub fn new() -> Self {
        Self
    }

    /// Returns an error when this build has no video decoder.
    pub fn ensure_available() -> Result<()> {
        if cfg!(feature = "ingest-file-ffmpeg") {
            Ok(())
        } else {
            Err(anyhow!(
                "video decoding requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl ClipOpener for FileClipOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(anyhow!("{} is not a regular file", path.display()));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Box::new(FfmpegFileSource::open(path)?))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "cannot decode {}: video decoding requires the ingest-file-ffmpeg feature",
                path.display()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_files() {
        let err = match FileClipOpener::new().open(Path::new("/definitely/not/here.mp4")) {
            Ok(_) => panic!("missing file opened"),
            Err(e) => e,
        };
        assert!(format!("{err}").contains("not a regular file"));
    }
}
