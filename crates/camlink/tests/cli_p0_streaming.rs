#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/camlink-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_path(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        assert!(
            start.elapsed() < timeout,
            "{} did not appear in time",
            path.display()
        );
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Option<i32> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status.code();
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_emulator(sock_path: &Path, frames: u64) -> Child {
    Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["--log-level", "error", "emulate"])
        .arg(sock_path)
        .args(["--unix", "--interval", "50", "--frames"])
        .arg(frames.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("emulate command should start")
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be json"))
        .collect()
}

#[test]
fn monitor_receives_detections_from_emulator() {
    let dir = unique_temp_dir("stream");
    let sock_path = dir.join("cam.sock");
    let mut emulator = spawn_emulator(&sock_path, 100);
    wait_for_path(&sock_path, Duration::from_secs(5));

    let output = Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["--log-level", "error", "--format", "json", "monitor"])
        .arg(&sock_path)
        .args(["--unix", "--count", "3", "--timeout", "15000"])
        .output()
        .expect("monitor command should run");

    let emulator_code = wait_or_kill(&mut emulator, Duration::from_secs(5));
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let lines = json_lines(&output.stdout);
    let detections: Vec<_> = lines
        .iter()
        .filter(|v| v["schema_id"] == "camlink/cli/v1/detection")
        .collect();
    assert_eq!(detections.len(), 3);
    for detection in &detections {
        assert_eq!(detection["label"], "jpeg");
        assert_eq!(detection["description"], "Object jpeg (confidence 100%)");
    }

    let status = lines
        .iter()
        .find(|v| v["schema_id"] == "camlink/cli/v1/status")
        .expect("status summary should be printed");
    assert_eq!(status["detections"], 3);
    // The last frame's counters may land after its detection was printed.
    assert!(status["frames_completed"].as_u64().unwrap_or(0) >= 2);

    // The emulator exits once its only client hangs up.
    assert_eq!(emulator_code, Some(0));
}

#[test]
fn monitor_applies_config_descriptions() {
    let dir = unique_temp_dir("config");
    let sock_path = dir.join("cam.sock");
    let config_path = dir.join("client.json");
    std::fs::write(
        &config_path,
        r#"{ "device_name": "bench-cam", "descriptions": { "jpeg": "A camera still" } }"#,
    )
    .expect("config should be writable");

    let mut emulator = spawn_emulator(&sock_path, 100);
    wait_for_path(&sock_path, Duration::from_secs(5));

    let output = Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["--log-level", "error", "--format", "json", "monitor"])
        .arg(&sock_path)
        .args(["--unix", "--count", "1", "--timeout", "15000", "--config"])
        .arg(&config_path)
        .output()
        .expect("monitor command should run");

    wait_or_kill(&mut emulator, Duration::from_secs(5));
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(0));
    let lines = json_lines(&output.stdout);
    assert_eq!(lines[0]["description"], "A camera still (confidence 100%)");
}

#[test]
fn monitor_times_out_without_device() {
    let dir = unique_temp_dir("absent");
    let sock_path = dir.join("missing.sock");

    let started = Instant::now();
    let output = Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["--log-level", "error", "--format", "json", "monitor"])
        .arg(&sock_path)
        .args(["--unix", "--count", "1", "--timeout", "1500"])
        .output()
        .expect("monitor command should run");
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(124));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: no 1 detection(s)"), "stderr: {stderr}");
}

#[test]
fn monitor_rejects_missing_config_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["monitor", "127.0.0.1:1", "--config", "/nonexistent/camlink.json"])
        .output()
        .expect("monitor command should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/camlink.json"), "stderr: {stderr}");
}
