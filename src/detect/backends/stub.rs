use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Candidate;
use crate::frame::Frame;

type ScriptFn = Box<dyn FnMut(&Frame) -> Vec<Candidate> + Send>;

/// Stub backend for testing. Candidates come from a caller-supplied script.
///
/// Every frame handed to `infer` is recorded by index, so tests can assert
/// exactly which frames reached the model.
pub struct StubBackend {
    script: ScriptFn,
    failure: Option<String>,
    frames_seen: Vec<u64>,
}

impl StubBackend {
    /// A backend that never reports anything.
    pub fn new() -> Self {
        Self::from_fn(|_| Vec::new())
    }

    pub fn from_fn<F>(script: F) -> Self
    where
        F: FnMut(&Frame) -> Vec<Candidate> + Send + 'static,
    {
        Self {
            script: Box::new(script),
            failure: None,
            frames_seen: Vec::new(),
        }
    }

    /// A backend whose inference always fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Indices of every frame passed to `infer`, in call order.
    pub fn frames_seen(&self) -> &[u64] {
        &self.frames_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        self.frames_seen.push(frame.index);
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok((self.script)(frame))
    }
}
