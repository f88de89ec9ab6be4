use anyhow::{Context, Result};
use std::path::Path;

/// Class names, one per line, indexed by class id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        Self {
            names: raw.lines().map(|l| l.trim().to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `class_id`, or the numeric id when unknown.
    pub fn name(&self, class_id: usize) -> String {
        match self.names.get(class_id) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("class {}", class_id),
        }
    }
}
