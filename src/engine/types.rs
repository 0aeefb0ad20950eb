use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a child process ended, before any JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Exited {
        returncode: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        after: Duration,
    },
    /// The child started but waiting on it or reading its pipes failed.
    WaitFailed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathCheck {
    pub path: String,
    pub exists: bool,
    #[serde(default)]
    pub executable: Option<bool>,
}

impl PathCheck {
    pub fn ok(&self) -> bool {
        self.exists && self.executable.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDiag {
    pub repo_root: PathCheck,
    pub guarded_wrapper: PathCheck,
    pub tool: PathCheck,
    pub script: PathCheck,
    pub wall_timeout_seconds: u64,
    pub ok: bool,
}
