#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::process::{Command, Stdio};

fn camlink(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(args)
        .output()
        .expect("camlink should run")
}

#[test]
fn crc_of_check_string() {
    let output = camlink(&["--format", "json", "crc", "--data", "123456789"]);
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("crc output should be json");
    assert_eq!(value["schema_id"], "camlink/cli/v1/crc");
    assert_eq!(value["crc16"], "0x29B1");
    assert_eq!(value["length"], 9);
}

#[test]
fn crc_of_empty_input_is_init_value() {
    let output = camlink(&["--format", "pretty", "crc", "--data", ""]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0xFFFF");
}

#[test]
fn crc_reads_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_camlink"))
        .args(["--format", "pretty", "crc"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("crc should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&[0x01, 0x02, 0x03, 0x04])
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("crc should finish");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x89C3");
}

#[test]
fn crc_missing_file_is_transport_error() {
    let output = camlink(&["crc", "--file", "/nonexistent/frame.jpg"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_reports_package_version() {
    let output = camlink(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("camlink {}", env!("CARGO_PKG_VERSION"))
    );

    let output = camlink(&["version", "--extended"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("frame_magic=0xCAFEBABE"));
    assert!(text.contains("handshake_ack=0xABCD4321"));
    assert!(text.contains("header_size=14"));
}
