use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod crc;
pub mod emulate;
pub mod monitor;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a camera device and print detections.
    Monitor(MonitorArgs),
    /// Run a device emulator that streams JPEG frames.
    Emulate(EmulateArgs),
    /// Compute the CRC-16/CCITT-FALSE of some input.
    Crc(CrcArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => block_on(monitor::run(args, format)),
        Command::Emulate(args) => block_on(emulate::run(args)),
        Command::Crc(args) => crc::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: std::future::Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
    runtime.block_on(future)
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Device address: `host:port`, or a socket path with --unix.
    pub address: String,
    /// Treat the address as a Unix domain socket path.
    #[arg(long)]
    pub unix: bool,
    /// Device name to look for during discovery.
    #[arg(long)]
    pub name: Option<String>,
    /// Exit after N detections.
    #[arg(long)]
    pub count: Option<u64>,
    /// Give up after this many milliseconds without reaching --count.
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,
    /// Client configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "CAMLINK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Address to listen on: `host:port`, or a socket path with --unix.
    pub address: String,
    /// Treat the address as a Unix domain socket path.
    #[arg(long)]
    pub unix: bool,
    /// Stream the JPEG files in this directory instead of synthetic frames.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Delay between frames in milliseconds.
    #[arg(long, value_name = "MS", default_value = "500")]
    pub interval: u64,
    /// Stop after sending N frames to one client.
    #[arg(long)]
    pub frames: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CrcArgs {
    /// Checksum this string.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Checksum the contents of this file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
