//! Strided frame sampling over one clip.

use anyhow::anyhow;
use std::path::Path;

use crate::detect::{DetectorBackend, PersonDetector, PersonSighting};
use crate::ingest::ClipOpener;

/// Result of looking for a person in one clip.
#[derive(Debug)]
pub enum SampleOutcome {
    /// A sampled frame contained a person. Decoding stopped at that frame.
    Found(PersonSighting),
    /// The whole clip was decoded without a person in any sampled frame.
    NotFound { frames_decoded: u64 },
    /// The clip could not be opened, produced no frames, or inference failed.
    ReadError(anyhow::Error),
}

/// Decode `path` frame by frame and run the detector on every frame whose
/// 1-based index is a multiple of `stride`.
///
/// A decode error after at least one frame was read is treated as the end of
/// the stream, since partially written or truncated clips are common.
pub fn sample_clip<B: DetectorBackend>(
    opener: &dyn ClipOpener,
    path: &Path,
    stride: u64,
    detector: &mut PersonDetector<B>,
) -> SampleOutcome {
    let stride = stride.max(1);
    let mut source = match opener.open(path) {
        Ok(source) => source,
        Err(e) => return SampleOutcome::ReadError(e),
    };

    let mut decoded: u64 = 0;
    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) if decoded == 0 => {
                return SampleOutcome::ReadError(anyhow!(
                    "{} contains no decodable frames",
                    path.display()
                ))
            }
            Ok(None) => {
                return SampleOutcome::NotFound {
                    frames_decoded: decoded,
                }
            }
            Err(e) if decoded == 0 => return SampleOutcome::ReadError(e),
            Err(e) => {
                log::warn!(
                    "decode of {} stopped after frame {}: {:#}",
                    path.display(),
                    decoded,
                    e
                );
                return SampleOutcome::NotFound {
                    frames_decoded: decoded,
                };
            }
        };
        decoded += 1;

        if decoded % stride != 0 {
            continue;
        }

        match detector.detect(frame) {
            Ok(Some(sighting)) => return SampleOutcome::Found(sighting),
            Ok(None) => {}
            Err(e) => return SampleOutcome::ReadError(e),
        }
    }
}
