use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use camlink_session::{DetectionResult, StatusSnapshot};
use serde::Serialize;

const DETECTION_SCHEMA: &str = "camlink/cli/v1/detection";
const STATUS_SCHEMA: &str = "camlink/cli/v1/status";
const CRC_SCHEMA: &str = "camlink/cli/v1/crc";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DetectionOutput<'a> {
    schema_id: &'a str,
    label: &'a str,
    confidence: f32,
    description: &'a str,
    source_timestamp_ms: u32,
    received_at: u64,
}

pub fn print_detection(result: &DetectionResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DetectionOutput {
                schema_id: DETECTION_SCHEMA,
                label: &result.label,
                confidence: result.confidence,
                description: &result.description,
                source_timestamp_ms: result.source_timestamp,
                received_at: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table(vec!["LABEL", "CONFIDENCE", "TIMESTAMP", "DESCRIPTION"]);
            table.add_row(vec![
                result.label.clone(),
                format!("{:.0}%", result.confidence * 100.0),
                result.source_timestamp.to_string(),
                result.description.clone(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "[{} ms] {} ({})",
                result.source_timestamp, result.description, result.label
            );
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    schema_id: &'a str,
    #[serde(flatten)]
    status: &'a StatusSnapshot,
    detections: u64,
}

pub fn print_status(status: &StatusSnapshot, detections: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            schema_id: STATUS_SCHEMA,
            status,
            detections,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["STATE", "FRAMES", "DISCARDED", "DETECTIONS", "LAST LATENCY"]);
            table.add_row(vec![
                status.state.to_string(),
                status.frames_completed.to_string(),
                status.frames_discarded.to_string(),
                detections.to_string(),
                latency_text(status),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "state={} frames={} discarded={} detections={} last_latency={}",
                status.state,
                status.frames_completed,
                status.frames_discarded,
                detections,
                latency_text(status)
            );
        }
    }
}

#[derive(Serialize)]
struct CrcOutput<'a> {
    schema_id: &'a str,
    crc16: String,
    length: usize,
}

pub fn print_crc(crc: u16, length: usize, format: OutputFormat) {
    let hex = format!("0x{crc:04X}");
    match format {
        OutputFormat::Json => print_json(&CrcOutput {
            schema_id: CRC_SCHEMA,
            crc16: hex,
            length,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["CRC16", "LENGTH"]);
            table.add_row(vec![hex, length.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn latency_text(status: &StatusSnapshot) -> String {
    match status.last_latency {
        Some(latency) if status.sla_exceeded => format!("{} ms (over SLA)", latency.as_millis()),
        Some(latency) => format!("{} ms", latency.as_millis()),
        None => "-".to_string(),
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
