use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn help_describes_the_daemon() {
    let mut cmd = Command::cargo_bin("stratumd").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("GPS-backed"))
        .stdout(contains("--target"));
}

#[test]
fn invalid_target_port_fails_fast() {
    let mut cmd = Command::cargo_bin("stratumd").unwrap();
    cmd.arg("--target")
        .arg("localhost:notaport")
        .assert()
        .failure()
        .stdout(contains("invalid port"));
}

#[test]
fn unreadable_config_fails_fast() {
    let mut cmd = Command::cargo_bin("stratumd").unwrap();
    cmd.arg("--config")
        .arg("/definitely/not/a/real/path.toml")
        .assert()
        .failure()
        .stdout(contains("cannot read"));
}
