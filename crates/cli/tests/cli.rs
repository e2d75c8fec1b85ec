use assert_cmd::Command;

fn cli(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bookshelf-cli").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("BOOKSHELF_ENV")
        .arg("--config-dir")
        .arg(config_dir);
    cmd
}

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("bookshelf-cli")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for command in ["serve", "init-db", "check"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn init_db_creates_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    cli(dir.path())
        .env("BOOKSHELF_DATABASE__PATH", &db_path)
        .arg("init-db")
        .assert()
        .success();

    assert!(db_path.exists());
}

#[test]
fn check_reports_healthy_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    cli(dir.path())
        .env("BOOKSHELF_DATABASE__PATH", &db_path)
        .arg("init-db")
        .assert()
        .success();

    let output = cli(dir.path())
        .env("BOOKSHELF_DATABASE__PATH", &db_path)
        .arg("check")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "healthy");
    assert_eq!(report["database"]["type"], "SQLite");
}

#[test]
fn check_fails_without_schema() {
    let dir = tempfile::tempdir().unwrap();

    cli(dir.path())
        .env("BOOKSHELF_DATABASE__PATH", dir.path().join("empty.db"))
        .arg("check")
        .assert()
        .failure();
}

#[test]
fn unknown_environment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    cli(dir.path())
        .args(["--env", "moon", "check"])
        .assert()
        .failure();
}
