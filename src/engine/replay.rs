use super::{Engine, types::Completion};
use crate::scenario::Scenario;
use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Serves recorded tool stdout instead of spawning anything.
///
/// Each recording is treated as the stdout of a run that exited with code 0.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    recordings: BTreeMap<String, PathBuf>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recording(mut self, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.recordings.insert(label.into(), path.into());
        self
    }
}

impl Engine for ReplayEngine {
    fn execute(&self, scenario: &Scenario) -> Result<Completion> {
        let path = self
            .recordings
            .get(&scenario.label)
            .ok_or_else(|| anyhow!("no recording for scenario: {}", scenario.label))?;
        debug!("replay {} from {}", scenario.label, path.display());
        let stdout = std::fs::read_to_string(path)
            .with_context(|| format!("reading recording: {}", path.display()))?;
        Ok(Completion::Exited {
            returncode: 0,
            stdout,
            stderr: String::new(),
        })
    }
}
