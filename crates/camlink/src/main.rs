mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "camlink", version, about = "Camera frame streaming CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monitor_subcommand() {
        let cli = Cli::try_parse_from([
            "camlink",
            "monitor",
            "127.0.0.1:9000",
            "--count",
            "3",
            "--timeout",
            "5000",
        ])
        .expect("monitor args should parse");

        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor command");
        };
        assert_eq!(args.count, Some(3));
        assert_eq!(args.timeout, Some(5000));
        assert!(!args.unix);
    }

    #[test]
    fn rejects_conflicting_crc_inputs() {
        let err = Cli::try_parse_from([
            "camlink",
            "crc",
            "--data",
            "123456789",
            "--file",
            "/tmp/payload.jpg",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn emulate_interval_defaults() {
        let cli = Cli::try_parse_from(["camlink", "emulate", "/tmp/cam.sock", "--unix"])
            .expect("emulate args should parse");
        let Command::Emulate(args) = cli.command else {
            panic!("expected emulate command");
        };
        assert_eq!(args.interval, 500);
        assert!(args.frames.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["camlink", "version", "--format", "json", "--log-level", "debug"])
            .expect("global flags should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
