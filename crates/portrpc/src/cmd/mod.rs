use std::time::Duration;

use clap::{Args, Subcommand};
use portrpc_peer::{CorrelatorConfig, CorrelatorOptions};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod batch;
pub mod call;
pub mod host;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue one JSON-RPC call through a negotiated port.
    Call(CallArgs),
    /// Issue a batch of JSON-RPC calls through a negotiated port.
    Batch(BatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Batch(args) => batch::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Connection and provider-host flags shared by `call` and `batch`.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Handshake timeout (e.g. 1s, 50ms).
    #[arg(long)]
    pub handshake_timeout: Option<String>,
    /// Per-request timeout (e.g. 5s, 250ms). Disabled when omitted.
    #[arg(long)]
    pub request_timeout: Option<String>,
    /// Correlator options as JSON, e.g. '{"timeout": 500}'. Explicit
    /// timeout flags take precedence.
    #[arg(long, value_name = "JSON", env = "PORTRPC_OPTIONS")]
    pub options: Option<String>,
    /// Do not start the in-process provider host.
    #[arg(long, conflicts_with = "silent_host")]
    pub no_host: bool,
    /// Start a provider host that accepts the handshake but never answers.
    #[arg(long)]
    pub silent_host: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// JSON-RPC method name.
    #[arg(long, short = 'm')]
    pub method: String,
    /// Method params as JSON.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    /// Request id. Integers are sent as numbers, anything else as a string.
    #[arg(long, default_value = "1")]
    pub id: String,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Method name for each batch element, in order (repeatable).
    #[arg(long = "method", short = 'm', required = true)]
    pub methods: Vec<String>,
    /// Params applied to every element, as JSON.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build the correlator configuration from `--options` and the explicit
/// timeout flags.
pub fn resolve_config(args: &ConnectArgs) -> CliResult<CorrelatorConfig> {
    let mut config = match &args.options {
        Some(json) => CorrelatorOptions::from_json(json)
            .map_err(|err| CliError::new(USAGE, format!("--options is not valid: {err}")))?
            .into(),
        None => CorrelatorConfig::default(),
    };

    if let Some(raw) = &args.handshake_timeout {
        config.handshake_timeout = parse_duration(raw)?;
    }
    if let Some(raw) = &args.request_timeout {
        config.request_timeout = Some(parse_duration(raw)?);
    }
    Ok(config)
}

pub fn parse_params(raw: Option<&str>) -> CliResult<serde_json::Value> {
    match raw {
        Some(json) => serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}"))),
        None => Ok(serde_json::Value::Null),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}
