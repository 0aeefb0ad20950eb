use crate::summary::Summary;
use anyhow::Result;
use serde::Serialize;

/// Result of running one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Ok { summary: Summary },
    Error(ScenarioFailure),
}

impl ScenarioOutcome {
    pub fn summary(&self) -> Option<&Summary> {
        match self {
            ScenarioOutcome::Ok { summary } => Some(summary),
            ScenarioOutcome::Error(_) => None,
        }
    }

    pub fn failure(label: &str, reason: FailureReason) -> Self {
        ScenarioOutcome::Error(ScenarioFailure {
            label: label.to_string(),
            reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioFailure {
    pub label: String,
    #[serde(flatten)]
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    NonzeroExit { returncode: i32, stderr: String },
    JsonDecode { stderr: String, stdout: String },
    SpawnFailed { error: String },
    WaitFailed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Baseline,
    Stress,
    BaselineIntervals,
    StressIntervals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalReport {
    Failure {
        stage: Stage,
        details: ScenarioOutcome,
    },
    Ok {
        baseline: Summary,
        stress: Summary,
    },
}

impl FinalReport {
    pub fn is_ok(&self) -> bool {
        matches!(self, FinalReport::Ok { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_ok() { 0 } else { 1 }
    }

    /// Compact single-line document, no trailing newline.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Optional on-disk record of a single harness run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub started: String,
    pub finished: String,
    pub exit_code: i32,
    pub report_sha256: String,
    pub config_sha256: String,
}
