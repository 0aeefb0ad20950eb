use crate::config::Config;
use serde::Serialize;
use std::path::PathBuf;

pub const BASELINE: &str = "baseline";
pub const STRESS: &str = "stress";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub label: String,
    pub extra_args: Vec<String>,
}

impl Scenario {
    pub fn new(label: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            label: label.into(),
            extra_args,
        }
    }

    pub fn baseline(cfg: &Config) -> Self {
        Self::new(BASELINE, cfg.scenarios.baseline_args.clone())
    }

    pub fn stress(cfg: &Config) -> Self {
        Self::new(STRESS, cfg.scenarios.stress_args.clone())
    }
}

/// Parameter overrides that push the tool towards its numerical edge.
pub fn default_stress_args() -> Vec<String> {
    [
        "--heavyStrength=2.5",
        "--heavyScale=4.0",
        "--heavyThreshold=1.2",
        "--growthPower=2.8",
        "--tailExponent=6.2",
        concat!(
            "--schemes=",
            r#"'[{"scheme":"analytic"},{"scheme":"cutoff","sCut":0.2},"#,
            r#"{"scheme":"cutoff","sCut":0.12},{"scheme":"excludeBelow","#,
            r#""sMin":1.8},{"scheme":"bandGap","sMin":1.8,"sMax":2.6},"#,
            r#"{"scheme":"bandGap","sMin":2.2,"sMax":3.6}]'"#,
        ),
        "--cRen=0.008",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Fully resolved process invocation for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    /// `<wrapper> <soft> <hard> -- <tool> -file <script> [extra...]`
    pub fn build(cfg: &Config, scenario: &Scenario) -> Self {
        let mut args = vec![
            cfg.timeouts.soft_seconds.to_string(),
            cfg.timeouts.hard_seconds.to_string(),
            "--".to_string(),
            cfg.paths.tool.clone(),
            "-file".to_string(),
            cfg.resolve(&cfg.paths.script).display().to_string(),
        ];
        args.extend(scenario.extra_args.iter().cloned());
        Self {
            label: scenario.label.clone(),
            program: cfg.resolve(&cfg.paths.guarded_wrapper),
            args,
            cwd: cfg.repo_root(),
        }
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
