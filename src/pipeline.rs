use crate::{
    config::Config,
    engine::{Completion, Engine},
    report::{FailureReason, FinalReport, ScenarioOutcome, Stage},
    scenario::Scenario,
    summary,
};
use tracing::{info, warn};

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
}

impl<E: Engine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Baseline, then stress; stops at the first failing stage.
    pub fn run(&self) -> FinalReport {
        let baseline = run_scenario(&self.engine, &Scenario::baseline(&self.cfg));
        let Some(base_summary) = baseline.summary().cloned() else {
            return failure(Stage::Baseline, baseline);
        };

        let stress = run_scenario(&self.engine, &Scenario::stress(&self.cfg));
        let Some(stress_summary) = stress.summary().cloned() else {
            return failure(Stage::Stress, stress);
        };

        if !base_summary.within_tolerance() {
            return failure(Stage::BaselineIntervals, baseline);
        }
        if !stress_summary.within_tolerance() {
            return failure(Stage::StressIntervals, stress);
        }

        info!("both scenarios within tolerance");
        FinalReport::Ok {
            baseline: base_summary,
            stress: stress_summary,
        }
    }
}

fn failure(stage: Stage, details: ScenarioOutcome) -> FinalReport {
    warn!("stage {:?} failed", stage);
    FinalReport::Failure { stage, details }
}

/// Executes one scenario and classifies the result. Never fails.
pub fn run_scenario<E: Engine + ?Sized>(engine: &E, scenario: &Scenario) -> ScenarioOutcome {
    let label = scenario.label.as_str();
    match engine.execute(scenario) {
        Err(err) => ScenarioOutcome::failure(
            label,
            FailureReason::SpawnFailed {
                error: format!("{err:#}"),
            },
        ),
        Ok(completion) => classify(label, completion),
    }
}

pub fn classify(label: &str, completion: Completion) -> ScenarioOutcome {
    match completion {
        Completion::TimedOut { .. } => ScenarioOutcome::failure(label, FailureReason::Timeout),
        Completion::WaitFailed { error } => {
            ScenarioOutcome::failure(label, FailureReason::WaitFailed { error })
        }
        Completion::Exited {
            returncode, stderr, ..
        } if returncode != 0 => ScenarioOutcome::failure(
            label,
            FailureReason::NonzeroExit {
                returncode,
                stderr: stderr.trim().to_string(),
            },
        ),
        Completion::Exited { stdout, stderr, .. } => match summary::parse(label, &stdout) {
            Ok(summary) => {
                info!(
                    "{} allSchemes={} base={}",
                    label, summary.all_schemes_within_tolerance, summary.base_within_tolerance
                );
                ScenarioOutcome::Ok { summary }
            }
            Err(err) => {
                warn!("{} stdout is not JSON: {}", label, err);
                ScenarioOutcome::failure(
                    label,
                    FailureReason::JsonDecode {
                        stderr: stderr.trim().to_string(),
                        stdout,
                    },
                )
            }
        },
    }
}
