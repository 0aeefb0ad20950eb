use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WRAPPER: &str = "scripts/guarded_run.sh";
pub const DEFAULT_TOOL: &str = "/Applications/Wolfram.app/Contents/MacOS/wolframscript";
pub const DEFAULT_SCRIPT: &str = "problems/positivity-ir-multischeme/multi_scheme_ir_bounds.wls";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub scenarios: Scenarios,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeouts.wall_seconds == 0 {
            anyhow::bail!("timeouts.wall_seconds must be > 0");
        }
        if self.paths.guarded_wrapper.trim().is_empty() {
            anyhow::bail!("paths.guarded_wrapper is empty");
        }
        if self.paths.tool.trim().is_empty() {
            anyhow::bail!("paths.tool is empty");
        }
        Ok(())
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    /// Absolute, so the same path works before and after the child's chdir.
    pub fn repo_root(&self) -> PathBuf {
        let raw = Path::new(&self.paths.repo_root);
        std::path::absolute(raw).unwrap_or_else(|_| raw.to_path_buf())
    }

    /// Relative entries resolve against the repo root; absolute ones are kept.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.repo_root().join(p)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub repo_root: String,
    pub guarded_wrapper: String,
    pub tool: String,
    pub script: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            repo_root: ".".into(),
            guarded_wrapper: DEFAULT_WRAPPER.into(),
            tool: DEFAULT_TOOL.into(),
            script: DEFAULT_SCRIPT.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// `soft_seconds`/`hard_seconds` go to the wrapper; only `wall_seconds` is enforced here.
    pub soft_seconds: u64,
    pub hard_seconds: u64,
    pub wall_seconds: u64,
}
impl Default for Timeouts {
    fn default() -> Self {
        Self {
            soft_seconds: 90,
            hard_seconds: 120,
            wall_seconds: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenarios {
    pub baseline_args: Vec<String>,
    pub stress_args: Vec<String>,
}
impl Default for Scenarios {
    fn default() -> Self {
        Self {
            baseline_args: Vec::new(),
            stress_args: crate::scenario::default_stress_args(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tool {
    pub env: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    /// Empty disables the run record.
    pub record_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub log_tool_stderr: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            log_tool_stderr: true,
        }
    }
}
