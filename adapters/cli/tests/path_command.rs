use std::process::Command;

fn queue_match() -> Command {
    Command::new(env!("CARGO_BIN_EXE_queue-match"))
}

#[test]
fn path_command_prints_json_waypoints() {
    let output = queue_match()
        .args(["path", "--from", "0.5,0,0.5", "--to", "2.5,0,0.5", "--json"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run queue-match");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let json_start = stdout.find('{').expect("json object in output");
    let report: serde_json::Value =
        serde_json::from_str(&stdout[json_start..]).expect("valid json");

    assert_eq!(report["search"], "AStar");
    assert_eq!(report["cells"].as_array().map(Vec::len), Some(3));
}

#[test]
fn demo_command_is_deterministic() {
    let run = || {
        queue_match()
            .args(["demo", "--seed", "9", "--units", "12"])
            .env("RUST_LOG", "off")
            .output()
            .expect("failed to run queue-match")
    };

    let first = run();
    let second = run();

    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn missing_config_file_warns_and_uses_defaults() {
    let output = queue_match()
        .args([
            "--config",
            "/nonexistent/queue-match.toml",
            "path",
            "--from",
            "0.5,0,0.5",
            "--to",
            "1.5,0,0.5",
        ])
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run queue-match");

    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).expect("utf-8 output");
    assert!(
        stderr.contains("configuration file not found, using defaults"),
        "stderr was: {stderr}"
    );
    assert!(stderr.contains("/nonexistent/queue-match.toml"));
}
