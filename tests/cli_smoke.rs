use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn tb_help_works() {
    Command::cargo_bin("tb")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task board"));
}

#[test]
fn subcommand_help_works() {
    let subcommands: &[&[&str]] = &[
        &["task"],
        &["task", "new"],
        &["task", "list"],
        &["task", "edit"],
        &["task", "trash"],
        &["task", "delete"],
        &["task", "delete-trashed"],
        &["task", "hours"],
        &["task", "allocate"],
        &["graph"],
    ];

    for args in subcommands {
        Command::cargo_bin("tb")
            .expect("binary")
            .args(*args)
            .arg("--help")
            .assert()
            .success();
    }
}
