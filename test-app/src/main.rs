// serlink-cli -- operator tool for a serial device: list ports, send
// payloads, replay scripts, and watch traffic.
//
// Usage:
//   serlink-cli ports
//   serlink-cli check probe.script
//   serlink-cli --port /dev/ttyUSB0 --baud 9600 send "AT" --line-ending crlf
//   serlink-cli --port COM3 send --hex "01 03 00 00 00 0A"
//   serlink-cli --config bench.toml send --saved reset
//   serlink-cli --port /dev/ttyACM0 run probe.script --export traffic.log
//   serlink-cli --port /dev/ttyACM0 monitor --duration 30

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use serlink::script::parse;
use serlink::serial::{SerialPortProvider, available_ports};
use serlink::{
    DataBits, DataFormat, FlowControl, LineEnding, LinkEvent, Parity, ReadLoopEnd, ScriptRunner,
    SerialConfig, StopBits, TransportSession, encode_payload, format_bytes, is_valid_hex,
};

use crate::config::CliConfig;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// serlink-cli -- talk to a serial device from the command line.
#[derive(Parser)]
#[command(name = "serlink-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). When omitted, the only
    /// port on the system is used.
    #[arg(long, global = true)]
    port: Option<String>,

    /// TOML config file with port, serial settings and saved commands.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Baud rate override.
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Data bits override (7 or 8).
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(7..=8))]
    data_bits: Option<u8>,

    /// Stop bits override (1 or 2).
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..=2))]
    stop_bits: Option<u8>,

    /// Parity override.
    #[arg(long, global = true, value_enum)]
    parity: Option<ParityArg>,

    /// Flow control override.
    #[arg(long, global = true, value_enum)]
    flow_control: Option<FlowArg>,

    /// Write the traffic log to this file when the command finishes.
    #[arg(long, global = true)]
    export: Option<PathBuf>,

    /// Render traffic (console and export) as hex instead of text.
    #[arg(long, global = true)]
    hex_log: bool,

    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports on this system.
    Ports,

    /// Validate a script file without opening a device.
    Check {
        script: PathBuf,
    },

    /// Send one payload and print whatever comes back.
    Send {
        /// Payload: text, or hex digit pairs with --hex.
        #[arg(required_unless_present = "saved")]
        data: Option<String>,

        /// Interpret the payload as hex.
        #[arg(long)]
        hex: bool,

        /// Line ending appended to the payload.
        #[arg(long, value_enum)]
        line_ending: Option<LineEndingArg>,

        /// Send a saved command from the config file instead.
        #[arg(long, conflicts_with_all = ["data", "hex"])]
        saved: Option<String>,

        /// How long to keep listening for a reply, in milliseconds.
        #[arg(long, default_value_t = 500)]
        wait: u64,
    },

    /// Run a SEND/DELAY/LOOP script against the device. Ctrl-C stops it.
    Run {
        script: PathBuf,

        /// SEND payloads are hex.
        #[arg(long)]
        hex: bool,

        /// Line ending appended to every SEND payload.
        #[arg(long, value_enum)]
        line_ending: Option<LineEndingArg>,

        /// Step budget (default: 1000000).
        #[arg(long)]
        max_steps: Option<u64>,
    },

    /// Print device traffic until the duration elapses or Ctrl-C.
    Monitor {
        /// Seconds to monitor; 0 runs until Ctrl-C.
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ParityArg {
    None,
    Even,
    Odd,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Even => Parity::Even,
            ParityArg::Odd => Parity::Odd,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FlowArg {
    None,
    Hardware,
}

impl From<FlowArg> for FlowControl {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::None => FlowControl::None,
            FlowArg::Hardware => FlowControl::Hardware,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LineEndingArg {
    None,
    Lf,
    Cr,
    Crlf,
}

impl From<LineEndingArg> for LineEnding {
    fn from(arg: LineEndingArg) -> Self {
        match arg {
            LineEndingArg::None => LineEnding::None,
            LineEndingArg::Lf => LineEnding::Lf,
            LineEndingArg::Cr => LineEnding::Cr,
            LineEndingArg::Crlf => LineEnding::CrLf,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_flag(hex: bool) -> DataFormat {
    if hex { DataFormat::Hex } else { DataFormat::Text }
}

/// Apply command-line overrides on top of the config file's settings.
fn serial_config(cli: &Cli, file: &CliConfig) -> Result<SerialConfig> {
    let mut config = file.serial;
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(bits) = cli.data_bits {
        config.data_bits = DataBits::try_from(bits).map_err(anyhow::Error::msg)?;
    }
    if let Some(bits) = cli.stop_bits {
        config.stop_bits = StopBits::try_from(bits).map_err(anyhow::Error::msg)?;
    }
    if let Some(parity) = cli.parity {
        config.parity = parity.into();
    }
    if let Some(flow) = cli.flow_control {
        config.flow_control = flow.into();
    }
    if config.baud_rate == 0 {
        bail!("baud rate must be greater than zero");
    }
    Ok(config)
}

fn line_ending(flag: Option<LineEndingArg>, file: &CliConfig) -> LineEnding {
    flag.map(LineEnding::from).unwrap_or(file.line_ending)
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))
}

async fn open_session(cli: &Cli, file: &CliConfig) -> Result<Arc<TransportSession>> {
    let config = serial_config(cli, file)?;
    let provider = match cli.port.as_deref().or(file.port.as_deref()) {
        Some(port) => SerialPortProvider::with_port(port),
        None => SerialPortProvider::new(),
    };

    let session = Arc::new(TransportSession::new(Arc::new(provider)));
    session
        .connect(config)
        .await
        .context("could not open serial device (use --port to pick one)")?;
    if let Some(device) = session.device().await {
        println!("Connected to {device} ({config})");
    }
    Ok(session)
}

/// Print traffic events until the session disconnects.
fn spawn_printer(session: &TransportSession, format: DataFormat) -> JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LinkEvent::Sent(entry)) | Ok(LinkEvent::Received(entry)) => {
                    println!("{}", entry.render(format));
                }
                Ok(LinkEvent::ReadLoopEnded { reason }) => match reason {
                    ReadLoopEnd::Cancelled => {}
                    ReadLoopEnd::EndOfStream => println!("[device closed the stream]"),
                    ReadLoopEnd::Failed(e) => println!("[read error] {e}"),
                },
                Ok(LinkEvent::Disconnected) => break,
                Ok(LinkEvent::Connected { .. }) => {}
                Err(RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Disconnect, drain the printer, and export the log if requested.
async fn finish(cli: &Cli, session: &TransportSession, printer: JoinHandle<()>) -> Result<()> {
    session.disconnect().await;
    let _ = printer.await;

    if let Some(path) = &cli.export {
        let text = session.log().export(format_flag(cli.hex_log));
        std::fs::write(path, &text)
            .with_context(|| format!("failed to write log to {}", path.display()))?;
        println!(
            "Exported {} entries ({}) to {}",
            session.log().len(),
            format_bytes(text.len() as u64),
            path.display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in &ports {
        println!("{port}");
    }
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let text = read_script(path)?;
    let script = parse(&text).with_context(|| format!("{} is not a valid script", path.display()))?;
    println!(
        "{}: OK ({} commands, {} payloads per run)",
        path.display(),
        script.len(),
        script.total_sends()
    );
    Ok(())
}

/// Build the bytes for one operator send. Hex input must pass
/// [`is_valid_hex`] before it is converted.
fn send_payload(
    file: &CliConfig,
    data: Option<&str>,
    hex: bool,
    ending: LineEnding,
    saved: Option<&str>,
) -> Result<Vec<u8>> {
    let (data, format, ending) = match (saved, data) {
        (Some(name), _) => {
            let Some(command) = file.saved(name) else {
                bail!("no saved command named {name:?} in the config file");
            };
            (command.data.as_str(), command.format, ending)
        }
        (None, Some(data)) => (data, format_flag(hex), ending),
        (None, None) => bail!("nothing to send"),
    };
    if format == DataFormat::Hex && !is_valid_hex(data) {
        bail!("invalid hex payload {data:?}: expected pairs of hex digits");
    }
    Ok(encode_payload(data, format, ending)?)
}

async fn cmd_send(
    cli: &Cli,
    file: &CliConfig,
    data: Option<&str>,
    hex: bool,
    ending: Option<LineEndingArg>,
    saved: Option<&str>,
    wait: u64,
) -> Result<()> {
    let ending = line_ending(ending, file);
    let payload = send_payload(file, data, hex, ending, saved)?;

    let session = open_session(cli, file).await?;
    let printer = spawn_printer(&session, format_flag(cli.hex_log));

    let result = session.send(&payload).await;
    if result.is_ok() {
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }

    finish(cli, &session, printer).await?;
    result.context("send failed")?;
    Ok(())
}

async fn cmd_run(
    cli: &Cli,
    file: &CliConfig,
    path: &Path,
    hex: bool,
    ending: Option<LineEndingArg>,
    max_steps: Option<u64>,
) -> Result<()> {
    let text = read_script(path)?;
    // Reject bad scripts before touching the device.
    let script = parse(&text).with_context(|| format!("{} is not a valid script", path.display()))?;
    println!("Running {} ({} commands)", path.display(), script.len());

    let session = open_session(cli, file).await?;
    let printer = spawn_printer(&session, format_flag(cli.hex_log));

    let mut runner = ScriptRunner::new(session.clone()).line_ending(line_ending(ending, file));
    if let Some(steps) = max_steps {
        runner = runner.max_steps(steps);
    }
    let runner = Arc::new(runner);

    let progress = {
        let mut rx = runner.progress();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let p = *rx.borrow();
                if p.total > 0 {
                    tracing::debug!(current = p.current, total = p.total, "script progress");
                }
            }
        })
    };
    let stopper = {
        let runner = runner.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("Stopping script...");
                runner.stop();
            }
        })
    };

    let result = runner.run(&text, format_flag(hex)).await;
    stopper.abort();
    progress.abort();

    finish(cli, &session, printer).await?;
    match result {
        Ok(summary) => {
            println!(
                "Script finished: {} payloads sent in {} steps",
                summary.sends, summary.steps
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("Script stopped: {e}");
            Ok(())
        }
        Err(e) => Err(e).context("script failed"),
    }
}

async fn cmd_monitor(cli: &Cli, file: &CliConfig, duration_secs: u64) -> Result<()> {
    let session = open_session(cli, file).await?;
    let printer = spawn_printer(&session, format_flag(cli.hex_log));

    if duration_secs > 0 {
        println!("Monitoring for {duration_secs}s (Ctrl-C to stop)...");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {
                println!("Monitor duration elapsed.");
            }
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        println!("Monitoring (Ctrl-C to stop)...");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }

    finish(cli, &session, printer).await
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };

    match &cli.command {
        Command::Ports => cmd_ports(),
        Command::Check { script } => cmd_check(script),
        Command::Send {
            data,
            hex,
            line_ending,
            saved,
            wait,
        } => {
            cmd_send(
                &cli,
                &file,
                data.as_deref(),
                *hex,
                *line_ending,
                saved.as_deref(),
                *wait,
            )
            .await
        }
        Command::Run {
            script,
            hex,
            line_ending,
            max_steps,
        } => cmd_run(&cli, &file, script, *hex, *line_ending, *max_steps).await,
        Command::Monitor { duration } => cmd_monitor(&cli, &file, *duration).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_file() {
        let cli = Cli::parse_from([
            "serlink-cli",
            "--baud",
            "9600",
            "--parity",
            "odd",
            "--data-bits",
            "7",
            "monitor",
        ]);
        let file = CliConfig::parse("[serial]\nbaud_rate = 19200\nstop_bits = 2\n").unwrap();

        let config = serial_config(&cli, &file).unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::Odd);
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.stop_bits, StopBits::Two);
    }

    #[test]
    fn zero_baud_is_rejected() {
        let cli = Cli::parse_from(["serlink-cli", "--baud", "0", "monitor"]);
        assert!(serial_config(&cli, &CliConfig::default()).is_err());
    }

    #[test]
    fn data_bits_out_of_range_is_a_usage_error() {
        let result = Cli::try_parse_from(["serlink-cli", "--data-bits", "5", "monitor"]);
        assert!(result.is_err());
    }

    #[test]
    fn line_ending_flag_beats_config() {
        let file = CliConfig::parse("line_ending = \"lf\"").unwrap();
        assert_eq!(line_ending(None, &file), LineEnding::Lf);
        assert_eq!(line_ending(Some(LineEndingArg::Crlf), &file), LineEnding::CrLf);
    }

    #[test]
    fn send_requires_data_or_saved() {
        assert!(Cli::try_parse_from(["serlink-cli", "send"]).is_err());
        assert!(Cli::try_parse_from(["serlink-cli", "send", "--saved", "reset"]).is_ok());
        assert!(Cli::try_parse_from(["serlink-cli", "send", "--hex", "01 02"]).is_ok());
    }

    #[test]
    fn hex_send_requires_valid_hex() {
        let file = CliConfig::default();
        let bytes = send_payload(&file, Some("01 0a FF"), true, LineEnding::CrLf, None).unwrap();
        assert_eq!(bytes, vec![0x01, 0x0A, 0xFF]);

        assert!(send_payload(&file, Some("01,02"), true, LineEnding::None, None).is_err());
        assert!(send_payload(&file, Some("012"), true, LineEnding::None, None).is_err());

        // The same text is fine as a text payload.
        let bytes = send_payload(&file, Some("01,02"), false, LineEnding::Lf, None).unwrap();
        assert_eq!(bytes, b"01,02\n");
    }

    #[test]
    fn saved_command_payload() {
        let file = CliConfig::parse(
            "[[commands]]\nname = \"reset\"\ndata = \"ATZ\"\nformat = \"text\"\n\n\
             [[commands]]\nname = \"bad\"\ndata = \"AA-55\"\nformat = \"hex\"\n",
        )
        .unwrap();
        let bytes = send_payload(&file, None, false, LineEnding::Cr, Some("reset")).unwrap();
        assert_eq!(bytes, b"ATZ\r");
        assert!(send_payload(&file, None, false, LineEnding::None, Some("bad")).is_err());
        assert!(send_payload(&file, None, false, LineEnding::None, Some("missing")).is_err());
    }
}
