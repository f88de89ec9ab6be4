use anyhow::Result;

use crate::detect::result::Candidate;
use crate::frame::Frame;

/// Inference backend trait.
///
/// A backend turns one decoded frame into raw per-anchor candidates. All
/// filtering, suppression and class selection happens in
/// [`PersonDetector`](crate::detect::PersonDetector), so backends stay thin
/// wrappers around a model runtime.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame.
    ///
    /// Implementations must treat the frame as read-only; annotation is done
    /// by the caller.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Candidate>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        (**self).infer(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
