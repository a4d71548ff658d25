//! Integration tests: drive the built binary against temporary directories.

mod common;

use std::fs;

use common::{Workspace, run_cli_case, run_cli_case_with_env, write_file};
use serde_json::Value;

const MB: usize = 1024 * 1024;

#[test]
fn help_command_prints_usage() {
    let ws = Workspace::new();
    let result = run_cli_case("help_command_prints_usage", &ws.home, &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: mediaqueue [OPTIONS] [ACTIVE_DIR] [OFFLOAD_DIR]"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_flag_prints_version() {
    let ws = Workspace::new();
    let result = run_cli_case("version_flag_prints_version", &ws.home, &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn overflow_beyond_max_count_is_offloaded() {
    let ws = Workspace::new();
    for i in 0..10 {
        write_file(&ws.active.join(format!("f{i:02}.bin")), MB);
    }

    let result = run_cli_case(
        "overflow_beyond_max_count_is_offloaded",
        &ws.home,
        &["-n", "5", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(
        Workspace::names(&ws.active),
        ["f00.bin", "f01.bin", "f02.bin", "f03.bin", "f04.bin"]
    );
    assert_eq!(Workspace::names(&ws.offload).len(), 5);
    assert!(
        result.stdout.contains("Offloading: f09.bin"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn offload_files_are_pulled_into_free_capacity() {
    let ws = Workspace::new();
    write_file(&ws.active.join("a.mkv"), 1);
    write_file(&ws.active.join("b.mkv"), 1);
    for name in ["c.mkv", "d.mkv", "e.mkv"] {
        write_file(&ws.offload.join(name), 1);
    }

    let result = run_cli_case(
        "offload_files_are_pulled_into_free_capacity",
        &ws.home,
        &["--max-count", "5", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active).len(), 5);
    assert!(Workspace::names(&ws.offload).is_empty());
    for name in ["c.mkv", "d.mkv", "e.mkv"] {
        assert!(
            result.stdout.contains(&format!("Activating: {name}")),
            "log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn name_collision_is_reported_and_exit_code_is_zero() {
    let ws = Workspace::new();
    fs::write(ws.active.join("a.txt"), b"active copy").unwrap();
    fs::write(ws.offload.join("a.txt"), b"offload copy").unwrap();

    let result = run_cli_case(
        "name_collision_is_reported_and_exit_code_is_zero",
        &ws.home,
        &["-n", "5", ws.active_str(), ws.offload_str()],
    );
    assert_eq!(result.status.code(), Some(0), "log: {}", result.log_path.display());
    assert!(
        result.stderr.contains("Conflict:") && result.stderr.contains("a.txt"),
        "log: {}",
        result.log_path.display()
    );
    assert_eq!(fs::read(ws.active.join("a.txt")).unwrap(), b"active copy");
    assert_eq!(fs::read(ws.offload.join("a.txt")).unwrap(), b"offload copy");
}

#[test]
fn missing_directory_exits_non_zero() {
    let ws = Workspace::new();
    let missing = ws.tmp.path().join("does-not-exist");
    let result = run_cli_case(
        "missing_directory_exits_non_zero",
        &ws.home,
        &["-n", "5", missing.to_str().unwrap(), ws.offload_str()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(
        result.stderr.contains("MQ-2001"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn bad_size_argument_is_a_user_error() {
    let ws = Workspace::new();
    let result = run_cli_case(
        "bad_size_argument_is_a_user_error",
        &ws.home,
        &["-s", "12q", ws.active_str(), ws.offload_str()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("invalid size"), "log: {}", result.log_path.display());
}

#[test]
fn nested_directories_are_rejected() {
    let ws = Workspace::new();
    let inner = ws.active.join("offload");
    fs::create_dir(&inner).unwrap();
    let result = run_cli_case(
        "nested_directories_are_rejected",
        &ws.home,
        &["-n", "1", ws.active_str(), inner.to_str().unwrap()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("MQ-1001"), "log: {}", result.log_path.display());
}

#[test]
fn byte_budget_keeps_prefix_that_fits() {
    let ws = Workspace::new();
    for name in ["a", "b", "c"] {
        write_file(&ws.active.join(name), 10);
    }

    let result = run_cli_case(
        "byte_budget_keeps_prefix_that_fits",
        &ws.home,
        &["-s", "25", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active), ["a", "b"]);
    assert_eq!(Workspace::names(&ws.offload), ["c"]);
}

#[test]
fn default_limit_applies_when_none_configured() {
    let ws = Workspace::new();
    for i in 1..=5 {
        write_file(&ws.offload.join(format!("ep{i}.mkv")), 1);
    }

    let result = run_cli_case(
        "default_limit_applies_when_none_configured",
        &ws.home,
        &[ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active), ["ep1.mkv", "ep2.mkv", "ep3.mkv"]);
}

#[test]
fn second_run_is_a_noop() {
    let ws = Workspace::new();
    for i in 0..6 {
        write_file(&ws.active.join(format!("f{i}")), 1);
    }
    let args = ["-n", "4", ws.active_str(), ws.offload_str()];

    let first = run_cli_case("second_run_is_a_noop_first", &ws.home, &args);
    assert!(first.status.success(), "log: {}", first.log_path.display());
    let second = run_cli_case("second_run_is_a_noop_second", &ws.home, &args);
    assert!(second.status.success(), "log: {}", second.log_path.display());
    assert!(
        second.stdout.contains("Nothing to do."),
        "log: {}",
        second.log_path.display()
    );
    assert_eq!(Workspace::names(&ws.active).len(), 4);
}

#[test]
fn dry_run_reports_plan_without_moving() {
    let ws = Workspace::new();
    for i in 0..3 {
        write_file(&ws.active.join(format!("f{i}")), 1);
    }

    let result = run_cli_case(
        "dry_run_reports_plan_without_moving",
        &ws.home,
        &["--dry-run", "-n", "1", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("[dry-run] Offloading: f2"),
        "log: {}",
        result.log_path.display()
    );
    assert_eq!(Workspace::names(&ws.active).len(), 3);
    assert!(Workspace::names(&ws.offload).is_empty());
}

#[test]
fn json_output_is_a_single_report_object() {
    let ws = Workspace::new();
    for i in 0..4 {
        write_file(&ws.active.join(format!("f{i}")), 100);
    }

    let result = run_cli_case(
        "json_output_is_a_single_report_object",
        &ws.home,
        &["--json", "-n", "2", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let report: Value = serde_json::from_str(result.stdout.trim()).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({e}); log: {}", result.log_path.display())
    });
    assert_eq!(report["offloaded"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["offloaded"][0]["method"], "rename");
    assert_eq!(report["active_count"], 2);
    assert_eq!(report["active_bytes"], 200);
    assert_eq!(report["dry_run"], false);
}

#[test]
fn directories_and_budget_come_from_config_file() {
    let ws = Workspace::new();
    for i in 0..3 {
        write_file(&ws.offload.join(format!("ep{i}")), 1);
    }
    let config_dir = ws.home.join(".config").join("mediaqueue");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        format!(
            "[dirs]\nactive = {:?}\noffload = {:?}\n\n[budget]\nmax_count = 2\n",
            ws.active_str(),
            ws.offload_str()
        ),
    )
    .unwrap();

    let result = run_cli_case("directories_and_budget_come_from_config_file", &ws.home, &[]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active), ["ep0", "ep1"]);
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let ws = Workspace::new();
    let missing = ws.tmp.path().join("absent.toml");
    let result = run_cli_case(
        "missing_explicit_config_is_a_user_error",
        &ws.home,
        &["--config", missing.to_str().unwrap(), ws.active_str(), ws.offload_str()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("MQ-1002"), "log: {}", result.log_path.display());
}

#[test]
fn env_override_sets_budget() {
    let ws = Workspace::new();
    for i in 0..4 {
        write_file(&ws.offload.join(format!("f{i}")), 1);
    }

    let result = run_cli_case_with_env(
        "env_override_sets_budget",
        &ws.home,
        &[ws.active_str(), ws.offload_str()],
        &[("MQ_BUDGET_MAX_COUNT", "1")],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active), ["f0"]);
}

#[test]
fn activity_log_records_each_move() {
    let ws = Workspace::new();
    write_file(&ws.offload.join("ep1.mkv"), 5);
    write_file(&ws.offload.join("ep2.mkv"), 5);
    let log = ws.tmp.path().join("logs").join("activity.jsonl");

    let result = run_cli_case(
        "activity_log_records_each_move",
        &ws.home,
        &[
            "-n",
            "2",
            "--log",
            log.to_str().unwrap(),
            ws.active_str(),
            ws.offload_str(),
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let contents = fs::read_to_string(&log).unwrap();
    let events: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "reconcile_start");
    assert_eq!(events.last().unwrap()["event"], "reconcile_complete");
    let activated: Vec<&Value> = events
        .iter()
        .filter(|e| e["event"] == "file_activated")
        .collect();
    assert_eq!(activated.len(), 2);
    assert_eq!(activated[0]["path"], "ep1.mkv");
    assert_eq!(activated[0]["direction"], "activate");
}

#[test]
fn grouped_layout_honours_per_group_limit() {
    let ws = Workspace::new();
    for ep in 1..=3 {
        write_file(&ws.offload.join("Show").join(format!("ep{ep}.mkv")), 1);
    }
    write_file(&ws.offload.join("Film").join("film.mkv"), 1);

    let result = run_cli_case(
        "grouped_layout_honours_per_group_limit",
        &ws.home,
        &["--layout", "grouped", "-g", "2", ws.active_str(), ws.offload_str()],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(Workspace::names(&ws.active.join("Show")), ["ep1.mkv", "ep2.mkv"]);
    assert_eq!(Workspace::names(&ws.active.join("Film")), ["film.mkv"]);
    assert_eq!(Workspace::names(&ws.offload), ["Show"]);
    assert_eq!(Workspace::names(&ws.offload.join("Show")), ["ep3.mkv"]);
}
