use crate::{
    config::Config,
    engine::{GuardedEngine, ReplayEngine},
    pipeline::Pipeline,
    report::{FinalReport, RunRecord},
    scenario::{BASELINE, STRESS, Scenario},
    util::{ensure_dir, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "interval-budget.toml";

#[derive(Parser, Debug)]
#[command(name = "interval-budget")]
#[command(about = "Interval budget verification harness (baseline + stress tolerance checks)")]
pub struct Args {
    /// Defaults to `run`.
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Path to config TOML. If omitted, uses ./interval-budget.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run baseline and stress through the guarded wrapper.
    Run {
        /// Write a run record here (overrides output.record_path).
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Check that the wrapper, tool and script are in place.
    Doctor {},
    /// Print the command line of each scenario without running anything.
    Plan {},
    /// Evaluate recorded tool stdout instead of running the tool.
    Check {
        #[arg(long)]
        baseline: PathBuf,
        #[arg(long)]
        stress: PathBuf,
    },
}

/// Returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    let cfg = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_logging(&args, &Config::default(), None);
            return Err(err);
        }
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        None => run(&cfg, None),
        Some(Command::Run { record }) => run(&cfg, record.as_deref()),
        Some(Command::Doctor {}) => doctor(&cfg),
        Some(Command::Plan {}) => plan(&cfg),
        Some(Command::Check { baseline, stress }) => check(&cfg, baseline, stress),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from(DEFAULT_CONFIG);
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the report document only.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("interval-budget.log"))
}

fn run(cfg: &Config, record_override: Option<&Path>) -> Result<i32> {
    let started = now_rfc3339();
    let pipeline = Pipeline::new(cfg, GuardedEngine::new(cfg));
    let report = pipeline.run();
    let doc = emit(&report)?;

    let record_path = record_override
        .map(PathBuf::from)
        .or_else(|| (!cfg.output.record_path.is_empty()).then(|| PathBuf::from(&cfg.output.record_path)));
    if let Some(path) = record_path {
        write_record(cfg, &path, &report, &doc, started)?;
    }
    Ok(report.exit_code())
}

fn check(cfg: &Config, baseline: &Path, stress: &Path) -> Result<i32> {
    let engine = ReplayEngine::new()
        .with_recording(BASELINE, baseline)
        .with_recording(STRESS, stress);
    let report = Pipeline::new(cfg, engine).run();
    emit(&report)?;
    Ok(report.exit_code())
}

fn doctor(cfg: &Config) -> Result<i32> {
    let diag = GuardedEngine::new(cfg).doctor();
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(if diag.ok { 0 } else { 1 })
}

fn plan(cfg: &Config) -> Result<i32> {
    let engine = GuardedEngine::new(cfg);
    let plan: Vec<_> = [Scenario::baseline(cfg), Scenario::stress(cfg)]
        .iter()
        .map(|s| {
            let inv = engine.invocation(s);
            serde_json::json!({
                "label": inv.label,
                "argv": inv.argv(),
                "cwd": inv.cwd,
                "timeout_seconds": cfg.timeouts.wall_seconds,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(0)
}

/// Writes the report to stdout exactly once, without a trailing newline.
fn emit(report: &FinalReport) -> Result<String> {
    let doc = report.to_json()?;
    let mut out = std::io::stdout().lock();
    out.write_all(doc.as_bytes()).with_context(|| "writing report")?;
    out.flush().ok();
    info!("report status ok={}", report.is_ok());
    Ok(doc)
}

fn write_record(
    cfg: &Config,
    path: &Path,
    report: &FinalReport,
    doc: &str,
    started: String,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let record = RunRecord {
        started,
        finished: now_rfc3339(),
        exit_code: report.exit_code(),
        report_sha256: sha256_hex(doc.as_bytes()),
        config_sha256: sha256_hex(cfg.normalized_for_hash().as_bytes()),
    };
    std::fs::write(path, serde_json::to_string_pretty(&record)?)
        .with_context(|| format!("writing run record: {}", path.display()))?;
    debug!("run record written to {}", path.display());
    Ok(())
}

