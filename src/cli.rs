use std::env;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use touchpoint::config::Settings;
use touchpoint::emulator::{HeadlessEmulator, ReportFormat};
use touchpoint::hardware::{ConnectionState, EmulatorState, HardwareDriver, StartupReport, UartState};
use touchpoint::init_logging;

/// How long `send` waits for a running emulator to ping
const EMULATOR_WAIT: Duration = Duration::from_millis(2500);

fn print_usage() {
    eprintln!("touchpoint - Touchpoint haptic device tools");
    eprintln!();
    eprintln!("Usage: touchpoint <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  emulator [--json]             Run a headless device emulator");
    eprintln!("  probe                         Open the serial device and report the handshake");
    eprintln!("  send elevation <value>        Send one elevation command");
    eprintln!("  send vibration <amp> <hz> <pulses>");
    eprintln!("                                Send one vibration command (0 0 0 stops)");
    eprintln!("  send speed <units/sec>        Set the maximum elevation speed");
    eprintln!("  config [--write]              Print effective settings, optionally saving them");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  touchpoint emulator --json    # Log received commands as JSON lines");
    eprintln!("  touchpoint send vibration 0.1 180 1");
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_arg<T>(args: &[String], index: usize, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing <{}>", name))?;
    raw.parse().with_context(|| format!("invalid <{}>: {}", name, raw))
}

fn run_emulator(settings: &Settings, json: bool) -> Result<()> {
    let controller = settings
        .emulator
        .controller_addr()
        .map_err(|e| anyhow!(e))?;
    let format = if json { ReportFormat::Json } else { ReportFormat::Log };
    let emulator = HeadlessEmulator::open(settings.emulator.remote_port, controller, format)
        .context("failed to open emulator socket")?;
    emulator.run();
    Ok(())
}

async fn connect(settings: Settings) -> Result<(HardwareDriver, StartupReport)> {
    let driver = HardwareDriver::new(settings.max_elevation_speed);
    let worker = driver.clone();
    let report = tokio::task::spawn_blocking(move || {
        let report = worker.initialize(&settings);
        if report.emulator == EmulatorState::Listening {
            // A running emulator pings every couple of seconds
            let deadline = Instant::now() + EMULATOR_WAIT;
            while worker.emulator_state() != EmulatorState::Connected && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
        StartupReport {
            emulator: worker.emulator_state(),
            ..report
        }
    })
    .await
    .context("startup task failed")?;
    Ok((driver, report))
}

async fn probe(mut settings: Settings) -> Result<()> {
    settings.serial.enabled = true;
    settings.emulator.enabled = false;
    let (driver, report) = connect(settings).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    driver.close();

    if report.uart != UartState::Connected {
        bail!("device not connected");
    }
    Ok(())
}

async fn send(settings: Settings, args: &[String]) -> Result<()> {
    let what = args.get(2).map(String::as_str).unwrap_or("");
    // Validate before spending seconds on the handshake
    let action: Box<dyn FnOnce(&HardwareDriver) + Send> = match what {
        "elevation" => {
            let value: f32 = parse_arg(args, 3, "value")?;
            Box::new(move |d: &HardwareDriver| d.send_elevation(value))
        }
        "vibration" => {
            let amplitude: f32 = parse_arg(args, 3, "amp")?;
            let frequency: f32 = parse_arg(args, 4, "hz")?;
            let pulses: i16 = parse_arg(args, 5, "pulses")?;
            Box::new(move |d: &HardwareDriver| d.send_vibration(amplitude, frequency, pulses))
        }
        "speed" => {
            let speed: f32 = parse_arg(args, 3, "units/sec")?;
            Box::new(move |d: &HardwareDriver| d.set_max_elevation_speed(speed))
        }
        other => bail!("unknown send target '{}' (elevation, vibration, speed)", other),
    };

    let (driver, _report) = connect(settings).await?;
    let (device, emulator) = driver.connection_states();
    if device != ConnectionState::Connected && emulator != ConnectionState::Connected {
        driver.close();
        bail!("neither the device nor the emulator is connected");
    }

    action(&driver);
    // Closing waits briefly for the queued command to go out
    tokio::task::spawn_blocking(move || driver.close()).await?;
    Ok(())
}

fn show_config(settings: &Settings, write: bool) -> Result<()> {
    print!("{}", serde_yml::to_string(settings)?);
    if write {
        settings.save().map_err(|e| anyhow!(e))?;
        if let Some(path) = Settings::file_path() {
            eprintln!("Saved to {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let settings = Settings::load();
    let command = args[1].as_str();
    if command != "config" {
        init_logging(&settings);
    }

    match command {
        "emulator" => {
            let json = has_flag(&args, "--json");
            tokio::task::spawn_blocking({
                let settings = settings.clone();
                move || run_emulator(&settings, json)
            })
            .await?
        }
        "probe" => probe(settings).await,
        "send" => send(settings, &args).await,
        "config" => show_config(&settings, has_flag(&args, "--write")),
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}
