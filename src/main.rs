//! Line-oriented test harness: feeds g-code blocks from stdin or a file
//! into the motion pipeline and prints the resulting status/position after
//! each block, grounded in the teacher's `test_motion_modes` command-list
//! smoke test.

use clap::Parser;
use motionctl::config::Config;
use motionctl::printer::Printer;
use motionctl::status::MachineState;
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "motionctl", about = "CNC motion-controller core driver")]
struct Cli {
    /// Path to a TOML configuration file. Falls back to built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to connect to, overriding the config file's `serial_port`.
    #[arg(short, long)]
    port: Option<String>,

    /// Read g-code from this file instead of stdin.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Don't connect to hardware; just run the planner/DDA in-process.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial_port = port;
    }
    config.validate()?;

    tracing::info!("starting motionctl driver");
    tracing::info!("serial port: {} @ {} baud", config.serial_port, config.baud);

    let mut printer = Printer::new(config);

    if !cli.dry_run && !printer.config().serial_port.is_empty() {
        match printer.connect_hardware().await {
            Ok(()) => tracing::info!("hardware connected"),
            Err(e) => tracing::warn!("could not connect to hardware ({e}), continuing without it"),
        }
    }

    printer.start();

    let input: Box<dyn BufRead> = match &cli.file {
        Some(path) => Box::new(std::io::BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(std::io::BufReader::new(std::io::stdin())),
    };

    let mut line_no = 0u32;
    for line in input.lines() {
        let line = line?;
        let text = line.split(';').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        line_no += 1;
        let status = printer.execute_block(text, line_no);
        if status.is_ok() {
            tracing::debug!("ok: {text}");
        } else {
            tracing::warn!("line {line_no} ({text}): {status}");
        }
    }

    tracing::info!("draining planner queue...");
    loop {
        let report = printer.status_report(MachineState::Ready);
        if report.cycle_state == motionctl::status::CycleState::Idle {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
    }

    let report = printer.status_report(MachineState::Ready);
    tracing::info!("final position: {:?}", report.position);

    printer.shutdown();
    Ok(())
}
