mod support;

use predicates::str::contains;
use serde_json::Value;

use support::{create_task, tb_cmd, TestBoard};

#[test]
fn new_then_list_round_trip() {
    let board = TestBoard::init();

    let root = create_task(&board, &["--title", "release"]);
    let child = create_task(&board, &["--parent", &root.to_string(), "--title", "docs"]);

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .expect("run tb task list");
    assert!(output.status.success());

    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["command"], "task list");
    assert_eq!(envelope["status"], "success");

    let tasks = envelope["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["id"].as_i64(), Some(root));
    assert_eq!(tasks[0]["title"], "release");
    assert_eq!(tasks[1]["id"].as_i64(), Some(child));
    assert_eq!(tasks[1]["parent_id"].as_i64(), Some(root));
}

#[test]
fn edit_changes_fields_and_reports_them() {
    let board = TestBoard::init();
    let id = create_task(&board, &[]);

    tb_cmd(&board)
        .args([
            "task",
            "edit",
            &id.to_string(),
            "--title",
            "plan sprint",
            "--priority",
            "1",
        ])
        .assert()
        .success()
        .stdout(contains("Updated task"));

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["data"][0]["title"], "plan sprint");
    assert_eq!(envelope["data"][0]["priority"].as_i64(), Some(1));
}

#[test]
fn edit_without_flags_is_a_user_error() {
    let board = TestBoard::init();
    let id = create_task(&board, &[]);

    tb_cmd(&board)
        .args(["task", "edit", &id.to_string()])
        .assert()
        .code(2)
        .stderr(contains("nothing to change"));
}

#[test]
fn cyclic_reparent_is_rejected_with_integrity_code() {
    let board = TestBoard::init();
    let a = create_task(&board, &[]);
    let b = create_task(&board, &["--parent", &a.to_string()]);

    let output = tb_cmd(&board)
        .args([
            "task",
            "edit",
            &a.to_string(),
            "--parent",
            &b.to_string(),
            "--json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));

    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["kind"], "integrity_rejected");
    assert_eq!(envelope["error"]["details"]["id"].as_i64(), Some(a));

    // The hierarchy is unchanged.
    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(envelope["data"][0]["parent_id"].is_null());
}

#[test]
fn trashing_a_parent_hides_its_subtree_from_list() {
    let board = TestBoard::init();
    let root = create_task(&board, &[]);
    let mid = create_task(&board, &["--parent", &root.to_string()]);
    let _leaf = create_task(&board, &["--parent", &mid.to_string()]);

    tb_cmd(&board)
        .args(["task", "trash", &mid.to_string()])
        .assert()
        .success();

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    let tasks = envelope["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"].as_i64(), Some(root));
}

#[test]
fn delete_trashed_reports_the_removed_count() {
    let board = TestBoard::init();
    let keep = create_task(&board, &[]);
    let toss = create_task(&board, &[]);

    tb_cmd(&board)
        .args(["task", "trash", &toss.to_string()])
        .assert()
        .success();

    let output = tb_cmd(&board)
        .args(["task", "delete-trashed", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["data"]["removed"].as_u64(), Some(1));

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["data"].as_array().unwrap().len(), 1);
    assert_eq!(envelope["data"][0]["id"].as_i64(), Some(keep));
}

#[test]
fn hours_update_is_reflected_in_list_aggregation() {
    let board = TestBoard::init();
    let id = create_task(&board, &[]);

    tb_cmd(&board)
        .args([
            "task",
            "hours",
            &id.to_string(),
            "--completed",
            "2",
            "--remaining",
            "3",
        ])
        .assert()
        .success()
        .stdout(contains("Recorded hours"));

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["data"][0]["hr_completed"].as_f64(), Some(2.0));
    assert_eq!(envelope["data"][0]["hr_remaining"].as_f64(), Some(3.0));
    // Creation and update fell in the same coalescing window, so the
    // remaining snapshot is also the original estimate.
    assert_eq!(envelope["data"][0]["hr_estimated"].as_f64(), Some(5.0));
}

#[test]
fn zero_debounce_window_keeps_the_original_estimate() {
    let board = TestBoard::init();
    board
        .write_config("[hours]\ndebounce_minutes = 0\n")
        .unwrap();
    let id = create_task(&board, &[]);

    tb_cmd(&board)
        .args([
            "task",
            "hours",
            &id.to_string(),
            "--completed",
            "2",
            "--remaining",
            "3",
        ])
        .assert()
        .success();

    let output = tb_cmd(&board)
        .args(["task", "list", "--json"])
        .output()
        .unwrap();
    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    // The zeroed creation snapshot survives as the earliest row.
    assert_eq!(envelope["data"][0]["hr_estimated"].as_f64(), Some(0.0));
    assert_eq!(envelope["data"][0]["hr_completed"].as_f64(), Some(2.0));
}

#[test]
fn hours_for_unknown_task_is_a_user_error() {
    let board = TestBoard::init();

    tb_cmd(&board)
        .args([
            "task", "hours", "42", "--completed", "1", "--remaining", "1",
        ])
        .assert()
        .code(2)
        .stderr(contains("Task not found"));
}

#[test]
fn allocate_records_a_row() {
    let board = TestBoard::init();
    let id = create_task(&board, &[]);

    let output = tb_cmd(&board)
        .args([
            "task",
            "allocate",
            &id.to_string(),
            "--hours",
            "8",
            "--start",
            "2026-08-24T09:00:00Z",
            "--end",
            "2026-08-28T17:00:00Z",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let envelope: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["command"], "task allocate");
    assert_eq!(envelope["data"]["task_id"].as_i64(), Some(id));
    assert_eq!(envelope["data"]["target_n_hours_spent"].as_f64(), Some(8.0));
}

#[test]
fn allocate_rejects_malformed_timestamps() {
    let board = TestBoard::init();
    let id = create_task(&board, &[]);

    tb_cmd(&board)
        .args([
            "task",
            "allocate",
            &id.to_string(),
            "--hours",
            "8",
            "--start",
            "next tuesday",
        ])
        .assert()
        .code(2)
        .stderr(contains("invalid timestamp"));
}

#[test]
fn quiet_suppresses_human_output() {
    let board = TestBoard::init();

    tb_cmd(&board)
        .args(["task", "new", "--quiet"])
        .assert()
        .success()
        .stdout("");
}
