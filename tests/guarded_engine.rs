#![cfg(unix)]

use interval_budget::{
    config::Config,
    engine::{Completion, Engine, GuardedEngine},
    pipeline::{Pipeline, run_scenario},
    report::{FailureReason, ScenarioOutcome},
    scenario::Scenario,
};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WITHIN: &str = r#"{"aggregate":{"spread":0.01,"intervalCompliance":{"allSchemesWithinTolerance":true,"baseWithinTolerance":true,"maxWidth":0.05,"maxAllowedWidth":0.1}}}"#;

fn write_wrapper(dir: &Path, body: &str) {
    let path = dir.join("wrapper.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn config_for(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.repo_root = dir.display().to_string();
    cfg.paths.guarded_wrapper = "wrapper.sh".into();
    cfg.paths.tool = "/bin/true".into();
    cfg.paths.script = "model.wls".into();
    cfg.timeouts.wall_seconds = 5;
    cfg
}

#[test]
fn wrapper_receives_full_command_line_in_repo_root() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), &format!("printf '%s\\n' \"$@\" > argv.txt\nprintf '%s' '{WITHIN}'"));
    let cfg = config_for(dir.path());
    let engine = GuardedEngine::new(&cfg);

    let scenario = Scenario::new("stress", vec!["--cRen=0.008".into(), "--x='a b'".into()]);
    let outcome = run_scenario(&engine, &scenario);
    assert!(matches!(outcome, ScenarioOutcome::Ok { .. }));

    let argv = std::fs::read_to_string(dir.path().join("argv.txt")).unwrap();
    let lines: Vec<&str> = argv.lines().collect();
    let script = dir.path().join("model.wls").display().to_string();
    assert_eq!(
        lines,
        ["90", "120", "--", "/bin/true", "-file", script.as_str(), "--cRen=0.008", "--x='a b'"]
    );
}

#[test]
fn nonzero_exit_keeps_code_and_trimmed_stderr() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), "echo '  kernel license expired  ' >&2\nexit 7");
    let cfg = config_for(dir.path());
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    assert_eq!(
        outcome,
        ScenarioOutcome::failure(
            "baseline",
            FailureReason::NonzeroExit {
                returncode: 7,
                stderr: "kernel license expired".into(),
            }
        )
    );
}

#[test]
fn signal_death_reports_negative_code() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), "kill -9 $$");
    let cfg = config_for(dir.path());
    let completion = GuardedEngine::new(&cfg)
        .execute(&Scenario::baseline(&cfg))
        .unwrap();
    match completion {
        Completion::Exited { returncode, .. } => assert_eq!(returncode, -9),
        other => panic!("unexpected completion: {other:?}"),
    }
}

#[test]
fn garbage_stdout_is_json_decode() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), "printf 'Mathematica 14 ready\\n{'");
    let cfg = config_for(dir.path());
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    let v = serde_json::to_value(&outcome).unwrap();
    assert_eq!(v["reason"], "json_decode");
    assert_eq!(v["stdout"], "Mathematica 14 ready\n{");
}

#[test]
fn timeout_kills_the_whole_process_group() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), "(sleep 3; touch late.txt) &\nsleep 30");
    let mut cfg = config_for(dir.path());
    cfg.timeouts.wall_seconds = 1;

    let started = Instant::now();
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        serde_json::to_string(&outcome).unwrap(),
        r#"{"status":"error","label":"baseline","reason":"timeout"}"#
    );

    std::thread::sleep(Duration::from_secs(4));
    assert!(!dir.path().join("late.txt").exists());
}

#[test]
fn inherited_pipes_cannot_outlive_the_deadline() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), &format!("sleep 8 &\nprintf '%s' '{WITHIN}'\nexit 0"));
    let mut cfg = config_for(dir.path());
    cfg.timeouts.wall_seconds = 1;

    let started = Instant::now();
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        serde_json::to_string(&outcome).unwrap(),
        r#"{"status":"error","label":"baseline","reason":"timeout"}"#
    );
}

#[test]
fn relative_repo_root_resolves_from_the_callers_cwd() {
    let parent = TempDir::new().unwrap();
    let repo = parent.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    write_wrapper(&repo, &format!("test -f model.wls || exit 9\nprintf '%s' '{WITHIN}'"));
    std::fs::write(repo.join("model.wls"), "Print[1]").unwrap();
    let cfg_path = parent.path().join("harness.toml");
    std::fs::write(
        &cfg_path,
        "[paths]\nrepo_root = \"repo\"\nguarded_wrapper = \"wrapper.sh\"\ntool = \"/bin/true\"\nscript = \"model.wls\"\n",
    )
    .unwrap();

    let bin = |sub: &str| {
        std::process::Command::new(env!("CARGO_BIN_EXE_interval-budget"))
            .current_dir(parent.path())
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&cfg_path)
            .arg(sub)
            .output()
            .unwrap()
    };

    let doctor = bin("doctor");
    assert_eq!(doctor.status.code(), Some(0));

    let run = bin("run");
    assert_eq!(run.status.code(), Some(0), "{}", String::from_utf8_lossy(&run.stdout));
    let v: serde_json::Value = serde_json::from_slice(&run.stdout).unwrap();
    assert_eq!(v["status"], "ok");
}

#[test]
fn missing_wrapper_is_spawn_failed() {
    let dir = TempDir::new().unwrap();
    let cfg = config_for(dir.path());
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    let v = serde_json::to_value(&outcome).unwrap();
    assert_eq!(v["status"], "error");
    assert_eq!(v["reason"], "spawn_failed");
    assert!(v["error"].as_str().unwrap().contains("wrapper.sh"));
}

#[test]
fn tool_env_reaches_the_child() {
    let dir = TempDir::new().unwrap();
    write_wrapper(
        dir.path(),
        "printf '{\"aggregate\":{\"spread\":%s}}' \"$SPREAD_VALUE\"",
    );
    let mut cfg = config_for(dir.path());
    cfg.tool.env.insert("SPREAD_VALUE".into(), "0.25".into());
    let outcome = run_scenario(&GuardedEngine::new(&cfg), &Scenario::baseline(&cfg));
    let summary = outcome.summary().expect("ok outcome");
    assert_eq!(summary.spread, Some(serde_json::json!(0.25)));
}

#[test]
fn live_pipeline_passes_with_compliant_tool() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), &format!("printf '%s' '{WITHIN}'"));
    let cfg = config_for(dir.path());
    let report = Pipeline::new(&cfg, GuardedEngine::new(&cfg)).run();
    assert!(report.is_ok());
}

#[test]
fn doctor_flags_missing_pieces() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), "exit 0");
    let cfg = config_for(dir.path());
    let diag = GuardedEngine::new(&cfg).doctor();
    assert!(diag.repo_root.exists);
    assert_eq!(diag.guarded_wrapper.executable, Some(true));
    assert!(!diag.script.exists);
    assert!(!diag.ok);

    std::fs::write(dir.path().join("model.wls"), "Print[1]").unwrap();
    assert!(GuardedEngine::new(&cfg).doctor().ok);
}

#[test]
fn run_subcommand_writes_record() {
    let dir = TempDir::new().unwrap();
    write_wrapper(dir.path(), &format!("printf '%s' '{WITHIN}'"));
    let cfg_path = dir.path().join("harness.toml");
    std::fs::write(
        &cfg_path,
        format!(
            "[paths]\nrepo_root = {:?}\nguarded_wrapper = \"wrapper.sh\"\ntool = \"/bin/true\"\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();
    let record = dir.path().join("out").join("record.json");

    let out = std::process::Command::new(env!("CARGO_BIN_EXE_interval-budget"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&cfg_path)
        .arg("run")
        .arg("--record")
        .arg(&record)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));

    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
    assert_eq!(v["exit_code"], 0);
    assert_eq!(
        v["report_sha256"],
        interval_budget::util::sha256_hex(&out.stdout)
    );
}
