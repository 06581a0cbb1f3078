//! Sockexpect CLI - Command-line interface
//!
//! Send commands to a device over TCP or a serial port and wait for the
//! response patterns, for automation and device checks.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sockexpect::cli::exit_codes::exit_code_for;
use sockexpect::cli::output::json_value;
use sockexpect::cli::{format_output, print_exit_codes};
use sockexpect::config::{self, AppConfig};
use sockexpect::core::transport::list_ports;
use sockexpect::utils::unescape;
use sockexpect::{
    CliResult, ExitCodes, ExpectStream, LogFormat, OutputFormat, Scanner, Script, SerialConfig,
    SessionLogger, Target, TcpConfig, TransportError,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Sockexpect CLI
#[derive(Parser, Debug)]
#[command(
    name = "sockexpect",
    version,
    about = "Expect-style command/response checks over TCP and serial ports",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'C', long, global = true, env = "SOCKEXPECT_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// TCP target as host:port
    #[arg(long, conflicts_with = "serial", required_unless_present = "serial")]
    tcp: Option<String>,

    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(long)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Read timeout in seconds
    #[arg(short, long)]
    timeout: Option<f64>,

    /// TCP connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<f64>,
}

#[derive(Args, Debug)]
struct TranscriptArgs {
    /// Transcript file path
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,

    /// Transcript format (text, hex, mixed, csv, jsonl)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send commands, then wait for a pattern
    Expect {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        transcript: TranscriptArgs,

        /// Command to send before waiting (repeatable, escapes decoded)
        #[arg(short, long)]
        send: Vec<String>,

        /// Send commands without the line terminator
        #[arg(long)]
        raw: bool,

        /// Regular expression to wait for
        pattern: String,
    },

    /// Run an exchange script
    Script {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        transcript: TranscriptArgs,

        /// Script file (TOML)
        file: PathBuf,
    },

    /// List available serial ports
    Ports,

    /// Show the effective configuration
    Config {
        /// Write the defaults to the configuration file if it does not exist
        #[arg(long)]
        init: bool,
    },

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // `config --init` creates the file, so there is nothing to load yet.
    let config = if matches!(cli.command, Commands::Config { init: true }) {
        AppConfig::default()
    } else {
        match load_config(cli.config.as_deref()) {
            Ok(config) => config,
            Err(err) => return fail(&err),
        }
    };

    init_tracing(&cli, &config);

    let result = match &cli.command {
        Commands::Expect {
            target,
            transcript,
            send,
            raw,
            pattern,
        } => run_expect(&cli, &config, target, transcript, send, *raw, pattern),
        Commands::Script {
            target,
            transcript,
            file,
        } => run_script(&cli, &config, target, transcript, file),
        Commands::Ports => show_ports(&cli),
        Commands::Config { init } => show_config(&cli, &config, *init),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
    };

    match result {
        Ok(()) => CliResult::success().to_exit_code(),
        Err(err) => fail(&err),
    }
}

fn fail(err: &anyhow::Error) -> ExitCode {
    let code = err
        .chain()
        .find_map(exit_code_for)
        .unwrap_or(ExitCodes::ERROR);
    let result = CliResult::error(code, format!("{err:#}"));
    if let Some(msg) = result.message() {
        eprintln!("error: {msg}");
    }
    result.to_exit_code()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn init_tracing(cli: &Cli, config: &AppConfig) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn seconds(value: f64, what: &str) -> Result<Duration, TransportError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| TransportError::InvalidConfiguration(format!("{what} must be positive, got {value}")))
}

fn build_target(args: &TargetArgs, config: &AppConfig) -> Result<Target, TransportError> {
    let read_timeout = args
        .timeout
        .or(config.connection.read_timeout_secs)
        .map(|t| seconds(t, "read timeout"))
        .transpose()?;

    if let Some(port) = &args.serial {
        let baud = args.baud.unwrap_or(config.connection.baud_rate);
        let timeout = read_timeout.unwrap_or_else(|| config.scanner.default_timeout());
        return Ok(Target::Serial(SerialConfig::new(port, baud).timeout(timeout)));
    }

    let tcp = args
        .tcp
        .as_deref()
        .ok_or_else(|| TransportError::InvalidConfiguration("either --tcp or --serial is required".into()))?;
    let connect_timeout = seconds(
        args.connect_timeout
            .unwrap_or(config.connection.connect_timeout_secs),
        "connect timeout",
    )?;

    Ok(Target::Tcp(
        TcpConfig::parse(tcp)?
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout),
    ))
}

fn open_scanner(
    cli: &Cli,
    config: &AppConfig,
    target: &TargetArgs,
    transcript: &TranscriptArgs,
) -> anyhow::Result<Scanner<Box<dyn ExpectStream + Send>>> {
    let target = build_target(target, config)?;
    if !cli.quiet {
        eprintln!("Connecting to {target}...");
    }

    let stream = target.open().with_context(|| format!("opening {target}"))?;
    let mut scanner = Scanner::with_config(stream, &config.scanner)?;

    if cli.verbose {
        for warning in scanner.warnings() {
            eprintln!("warning: {warning}");
        }
    }

    if let Some(path) = &transcript.log {
        let mut logger = SessionLogger::new();
        logger.set_timestamps(config.logging.timestamps);
        let format = transcript
            .log_format
            .unwrap_or(config.logging.transcript_format);
        logger
            .start(path, format)
            .with_context(|| format!("opening transcript {}", path.display()))?;
        scanner = scanner.with_logger(logger.shared());
    }

    Ok(scanner)
}

fn print_split(format: OutputFormat, before: &[u8], after: &[u8], matched: &[u8]) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Text => {
            out.write_all(before)?;
            out.write_all(matched)?;
            if !matched.ends_with(b"\n") {
                writeln!(out)?;
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "before": json_value(before),
                "match": json_value(matched),
                "after": json_value(after),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        OutputFormat::Escaped | OutputFormat::Hex => {
            writeln!(out, "before: {}", format_output(before, format))?;
            writeln!(out, "match:  {}", format_output(matched, format))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn run_expect(
    cli: &Cli,
    config: &AppConfig,
    target: &TargetArgs,
    transcript: &TranscriptArgs,
    send: &[String],
    raw: bool,
    pattern: &str,
) -> anyhow::Result<()> {
    let commands = send
        .iter()
        .map(|s| unescape(s).map_err(|e| TransportError::InvalidConfiguration(format!("--send {s:?}: {e}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut scanner = open_scanner(cli, config, target, transcript)?;

    for command in &commands {
        if raw {
            scanner.send(command)?;
        } else {
            scanner.send_line(command)?;
        }
    }

    scanner.expect(pattern)?;
    print_split(cli.format, scanner.before(), scanner.after(), scanner.matched())
}

fn run_script(
    cli: &Cli,
    config: &AppConfig,
    target: &TargetArgs,
    transcript: &TranscriptArgs,
    file: &Path,
) -> anyhow::Result<()> {
    let script = Script::load(file)?;
    let mut scanner = open_scanner(cli, config, target, transcript)?;

    let report = script.run(&mut scanner)?;

    if cli.format == OutputFormat::Json {
        let records: Vec<_> = report
            .records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "step": r.step,
                    "pattern": r.pattern,
                    "before": json_value(&r.before),
                    "after": json_value(&r.after),
                })
            })
            .collect();
        let value = serde_json::json!({
            "script": script.name,
            "steps_run": report.steps_run,
            "checks_passed": report.checks_passed,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !cli.quiet {
        for record in &report.records {
            println!(
                "step {} {:?}: {}",
                record.step,
                record.pattern,
                format_output(&[record.before.as_slice(), record.after.as_slice()].concat(), OutputFormat::Escaped)
            );
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}: passed ({} steps, {} checks)",
            script.name, report.steps_run, report.checks_passed
        );
    }
    Ok(())
}

fn show_ports(cli: &Cli) -> anyhow::Result<()> {
    let ports = list_ports()?;

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            if ports.is_empty() && !cli.quiet {
                eprintln!("No serial ports found.");
            }
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }

    Ok(())
}

fn show_config(cli: &Cli, config: &AppConfig, init: bool) -> anyhow::Result<()> {
    if init {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => config::config_file().context("could not determine config directory")?,
        };
        if path.exists() {
            if !cli.quiet {
                eprintln!("{} already exists, leaving it alone", path.display());
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            AppConfig::default().save_to(&path)?;
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
        }
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        _ => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
