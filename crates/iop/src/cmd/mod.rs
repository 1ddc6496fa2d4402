use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use iop::session::MessageType;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod heartbeat;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a gateway that answers every request with an echo response.
    Serve(ServeArgs),
    /// Log in, send one request and print its responses.
    Send(SendArgs),
    /// Send heartbeats and report the round trip.
    Heartbeat(HeartbeatArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Heartbeat(args) => heartbeat::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 0.0.0.0:7001.
    pub addr: String,
    /// Only accept logins whose payload carries this `Token`.
    #[arg(long, env = "IOP_TOKEN")]
    pub token: Option<String>,
    /// Report idle sessions after this much silence (e.g. 30m, 90s).
    #[arg(long, default_value = "30m", value_parser = parse_duration)]
    pub idle_timeout: Duration,
    /// Close sessions that stay idle instead of only logging them.
    #[arg(long)]
    pub close_idle: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Gateway address.
    pub addr: String,
    /// Request message type, e.g. QRY_POSITION.
    #[arg(long = "type", short = 't')]
    pub message_type: MessageType,
    /// Nested JSON payload.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the nested JSON payload from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// `UserID` sent with the login.
    #[arg(long, default_value = "iop", env = "IOP_USER")]
    pub user: String,
    /// `Token` sent with the login.
    #[arg(long, env = "IOP_TOKEN")]
    pub token: Option<String>,
    /// Give up when the login or the last response part takes longer.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Args, Debug)]
pub struct HeartbeatArgs {
    /// Gateway address.
    pub addr: String,
    /// Number of heartbeats to send.
    #[arg(long, default_value = "1")]
    pub count: u32,
    /// Maximum wait for each echo (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `30m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {input:?}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        other => Err(format!("unsupported duration unit {other:?} (use ms, s or m)")),
    }
}
