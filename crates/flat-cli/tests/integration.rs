#![allow(deprecated)]
use assert_cmd::Command;
use flat_core::model::{PullConfig, SqlFormat, Step};
use flat_core::FlatState;
use predicates::prelude::*;
use tempfile::TempDir;

fn flat(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flat").unwrap();
    cmd.current_dir(dir.path()).env("FLAT_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    flat(dir).arg("init").assert().success();
}

fn read_state(dir: &TempDir) -> FlatState {
    let text = std::fs::read_to_string(dir.path().join("flat.yml")).unwrap();
    flat_core::deserialize(&text).unwrap()
}

// ---------------------------------------------------------------------------
// flat init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_workflow() {
    let dir = TempDir::new().unwrap();
    flat(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created:"));

    assert!(dir.path().join(".flat/config.yaml").exists());
    let state = read_state(&dir);
    assert!(state.on.workflow_dispatch);
    assert!(state.jobs.is_empty());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    flat(&dir).arg("init").assert().success();
    flat(&dir).args(["job", "add", "sync"]).assert().success();
    flat(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    // The second init must not clobber the edited workflow.
    assert_eq!(read_state(&dir).jobs.len(), 1);
}

#[test]
fn init_respects_configured_workflow_path() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".flat")).unwrap();
    std::fs::write(
        dir.path().join(".flat/config.yaml"),
        "workflow: .github/workflows/flat.yml\n",
    )
    .unwrap();
    flat(&dir).arg("init").assert().success();
    assert!(dir.path().join(".github/workflows/flat.yml").exists());
    assert!(!dir.path().join("flat.yml").exists());
}

// ---------------------------------------------------------------------------
// flat job
// ---------------------------------------------------------------------------

#[test]
fn job_add_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    flat(&dir)
        .args(["job", "add", "scheduled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added job 'scheduled' on ubuntu-latest"));
    flat(&dir)
        .args(["job", "add", "nightly", "--runs-on", "macos-latest"])
        .assert()
        .success();

    flat(&dir)
        .args(["job", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scheduled"))
        .stdout(predicate::str::contains("macos-latest"));

    let state = read_state(&dir);
    let names: Vec<&str> = state.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, ["scheduled", "nightly"]);
}

#[test]
fn job_list_json() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "sync"]).assert().success();

    let output = flat(&dir)
        .args(["--json", "job", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let items: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(items[0]["name"], "sync");
    assert_eq!(items[0]["step_count"], 0);
}

#[test]
fn duplicate_job_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "sync"]).assert().success();
    flat(&dir)
        .args(["job", "add", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_job_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir)
        .args(["job", "add", "9lives"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid job name"));
}

#[test]
fn job_rename_move_and_remove() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    for name in ["a", "b", "c"] {
        flat(&dir).args(["job", "add", name]).assert().success();
    }
    flat(&dir).args(["job", "rename", "b", "bee"]).assert().success();
    flat(&dir).args(["job", "move", "c", "0"]).assert().success();
    flat(&dir).args(["job", "remove", "a"]).assert().success();

    let names: Vec<String> = read_state(&dir).jobs.into_iter().map(|j| j.name).collect();
    assert_eq!(names, ["c", "bee"]);

    flat(&dir)
        .args(["job", "remove", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("job not found"));
}

#[test]
fn repeated_edit_reports_no_change() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "sync"]).assert().success();
    flat(&dir)
        .args(["job", "runs-on", "sync", "ubuntu-latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No change."));
}

// ---------------------------------------------------------------------------
// flat step
// ---------------------------------------------------------------------------

#[test]
fn step_add_http_writes_flat_action() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "scheduled"]).assert().success();
    flat(&dir)
        .args([
            "step",
            "add-http",
            "scheduled",
            "https://example.com/data.json",
            "--outfile",
            "data",
        ])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("flat.yml")).unwrap();
    assert!(text.contains("actions/checkout@v2"));
    assert!(text.contains("githubocto/flat@main"));

    let state = read_state(&dir);
    assert_eq!(
        state.jobs[0].steps,
        vec![Step::pull(PullConfig::http(
            "https://example.com/data.json",
            "data"
        ))]
    );

    flat(&dir)
        .args(["step", "list", "scheduled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pull-http"))
        .stdout(predicate::str::contains("https://example.com/data.json"));
}

#[test]
fn step_add_sql_and_remove() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "warehouse"]).assert().success();
    flat(&dir)
        .args([
            "step",
            "add-sql",
            "warehouse",
            "--connstring",
            "${{ secrets.DB }}",
            "--query-file",
            "query.sql",
            "--format",
            "json",
        ])
        .assert()
        .success();

    let state = read_state(&dir);
    match &state.jobs[0].steps[0] {
        Step::Pull {
            config: PullConfig::Sql { sql_format, .. },
        } => assert_eq!(*sql_format, SqlFormat::Json),
        other => panic!("unexpected step: {other:?}"),
    }

    flat(&dir)
        .args(["step", "remove", "warehouse", "0"])
        .assert()
        .success();
    assert!(read_state(&dir).jobs[0].steps.is_empty());

    flat(&dir)
        .args(["step", "remove", "warehouse", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("step 0 not found"));
}

#[test]
fn unknown_sql_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "warehouse"]).assert().success();
    flat(&dir)
        .args([
            "step",
            "add-sql",
            "warehouse",
            "--connstring",
            "x",
            "--query-file",
            "q.sql",
            "--format",
            "xml",
        ])
        .assert()
        .failure();
}

#[test]
fn step_on_missing_job_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir)
        .args(["step", "add-http", "ghost", "https://example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("job not found: ghost"));
}

// ---------------------------------------------------------------------------
// flat trigger
// ---------------------------------------------------------------------------

#[test]
fn triggers_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir)
        .args(["trigger", "schedule", "0 * * * *"])
        .assert()
        .success();
    flat(&dir)
        .args(["trigger", "push", "main", "data"])
        .assert()
        .success();
    flat(&dir)
        .args(["trigger", "dispatch", "--off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Manual dispatch disabled."));

    let on = read_state(&dir).on;
    assert!(!on.workflow_dispatch);
    assert_eq!(on.schedule.unwrap().cron, "0 * * * *");
    let branches: Vec<String> = on.push.unwrap().branches.into_iter().collect();
    assert_eq!(branches, ["data", "main"]);

    flat(&dir)
        .args(["trigger", "push", "--off"])
        .assert()
        .success();
    assert!(read_state(&dir).on.push.is_none());
}

#[test]
fn invalid_cron_is_rejected_before_writing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let before = std::fs::read_to_string(dir.path().join("flat.yml")).unwrap();
    flat(&dir)
        .args(["trigger", "schedule", "every hour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid cron expression"));
    let after = std::fs::read_to_string(dir.path().join("flat.yml")).unwrap();
    assert_eq!(before, after);
}

// ---------------------------------------------------------------------------
// flat show / validate / fmt
// ---------------------------------------------------------------------------

#[test]
fn show_json_prints_state() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).args(["job", "add", "sync"]).assert().success();

    let output = flat(&dir).args(["show", "--json"]).output().unwrap();
    assert!(output.status.success());
    let state: FlatState = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state, read_state(&dir));
}

#[test]
fn show_on_missing_workflow_shows_stub() {
    let dir = TempDir::new().unwrap();
    flat(&dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Triggers: manual"))
        .stdout(predicate::str::contains("No jobs."));
    // Reading never creates the document.
    assert!(!dir.path().join("flat.yml").exists());
}

#[test]
fn validate_reports_problems() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    flat(&dir).arg("validate").assert().success();

    flat(&dir)
        .args(["trigger", "dispatch", "--off"])
        .assert()
        .success();
    flat(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("on: no trigger is enabled"))
        .stderr(predicate::str::contains("1 problem(s) found"));
}

#[test]
fn fmt_canonicalises_hand_written_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flat.yml"),
        "# hand written\nname: Flat\non: [push]\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps: []\n",
    )
    .unwrap();

    flat(&dir).args(["fmt", "--check"]).assert().failure();
    flat(&dir)
        .arg("fmt")
        .assert()
        .success()
        .stdout(predicate::str::contains("Formatted"));
    flat(&dir).args(["fmt", "--check"]).assert().success();
    flat(&dir)
        .arg("fmt")
        .assert()
        .success()
        .stdout(predicate::str::contains("already formatted"));

    let state = read_state(&dir);
    assert!(state.on.push.is_some());
    assert_eq!(state.jobs[0].name, "a");
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

#[test]
fn malformed_workflow_is_never_overwritten() {
    let dir = TempDir::new().unwrap();
    let broken = "name: Flat\njobs: [unclosed\n";
    std::fs::write(dir.path().join("flat.yml"), broken).unwrap();

    flat(&dir)
        .args(["job", "add", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not parse"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("flat.yml")).unwrap(),
        broken
    );
}

#[test]
fn unrecognised_steps_survive_cli_edits() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flat.yml"),
        "\
name: Flat
on:
  workflow_dispatch: null
jobs:
  scheduled:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout repo
        uses: actions/checkout@v2
      - name: Setup deno
        uses: denoland/setup-deno@main
        with:
          deno-version: v1.x
",
    )
    .unwrap();

    flat(&dir)
        .args(["step", "add-http", "scheduled", "https://example.com/a.csv"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("flat.yml")).unwrap();
    assert!(text.contains("denoland/setup-deno@main"));
    assert!(text.contains("deno-version: v1.x"));
    let steps = &read_state(&dir).jobs[0].steps;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].kind(), "opaque");
    assert_eq!(steps[1].kind(), "pull-http");
}

// ---------------------------------------------------------------------------
// flat ui
// ---------------------------------------------------------------------------

#[test]
fn ui_help_names_the_state_view() {
    let dir = TempDir::new().unwrap();
    flat(&dir)
        .args(["ui", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/api/state"))
        .stdout(predicate::str::contains("--no-open"));
}
