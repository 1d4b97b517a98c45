use clap::{App, Arg, ArgMatches};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use thrustbus::protocol::encode_command;
use thrustbus::{Command, DriverConfig, SerialDriver, ThrusterIndex, ThrusterOutput, HEARTBEAT_FRAME};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("thrustbus")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("Thruster bus console - type frames as hex, get the engine's answer back")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON driver configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .value_name("MS")
                .help("Heartbeat timeout in milliseconds")
                .takes_value(true)
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("tick")
                .long("tick")
                .value_name("MS")
                .help("Watchdog tick period in milliseconds")
                .takes_value(true)
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("byte-order")
                .long("byte-order")
                .value_name("ORDER")
                .help("Byte order of thruster floats")
                .takes_value(true)
                .possible_values(&["little", "big"]),
        )
        .arg(
            Arg::with_name("kill-semantics")
                .long("kill-semantics")
                .value_name("MODE")
                .help("Meaning of type codes 0x05/0x06")
                .takes_value(true)
                .possible_values(&["wire_compatible", "named"]),
        )
        .arg(
            Arg::with_name("auto-heartbeat")
                .long("auto-heartbeat")
                .value_name("MS")
                .help("Send a heartbeat on this period")
                .takes_value(true)
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print each exchange as JSON"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = build_config(&matches)?;
    let mut driver = SerialDriver::with_config(config)?;
    driver.start()?;
    let driver = Arc::new(Mutex::new(driver));

    let heartbeat_task = match matches.value_of("auto-heartbeat") {
        Some(ms) => {
            let period = Duration::from_millis(ms.parse()?);
            let heartbeat_driver = Arc::clone(&driver);
            info!("Sending heartbeats every {} ms", period.as_millis());
            Some(tokio::spawn(async move {
                let mut interval = time::interval(period);
                loop {
                    interval.tick().await;
                    heartbeat_driver.lock().await.send(&HEARTBEAT_FRAME);
                }
            }))
        }
        None => None,
    };

    println!("{}", "Thruster bus console".bright_blue().bold());
    println!("Enter frames as hex (e.g. {}), or: heartbeat, thrust <i> <v>, status, quit", "47 44 02 35".bright_cyan());

    let json = matches.is_present("json");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut driver_guard = driver.lock().await;
        let request = match parse_line(line, driver_guard.config()) {
            Ok(Input::Quit) => break,
            Ok(Input::Status) => {
                println!("{}", serde_json::to_string_pretty(&driver_guard.snapshot())?);
                continue;
            }
            Ok(Input::Frame(bytes)) => bytes,
            Err(e) => {
                eprintln!("{} {}", "❌".red(), e);
                continue;
            }
        };

        let exchange = driver_guard.exchange(&request);
        drop(driver_guard);

        if json {
            println!("{}", serde_json::to_string(&exchange)?);
        } else if exchange.answered() {
            println!("{} {}", "<-".bright_green(), to_hex(&exchange.response));
        } else {
            println!("{}", "<- (no response)".bright_black());
        }
    }

    if let Some(task) = heartbeat_task {
        task.abort();
    }
    let stop = driver.lock().await.stop();
    match stop {
        Ok(handle) => {
            if let Err(e) = handle.await {
                error!("Watchdog task failed: {}", e);
            }
        }
        Err(e) => error!("Failed to stop watchdog: {}", e),
    }

    Ok(())
}

enum Input {
    Frame(Vec<u8>),
    Status,
    Quit,
}

fn build_config(matches: &ArgMatches) -> Result<DriverConfig, Box<dyn std::error::Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => DriverConfig::from_file(path)?,
        None => DriverConfig::default(),
    };
    if let Some(ms) = matches.value_of("timeout") {
        config.heartbeat_timeout_ms = ms.parse()?;
    }
    if let Some(ms) = matches.value_of("tick") {
        config.tick_period_ms = ms.parse()?;
    }
    if let Some(order) = matches.value_of("byte-order") {
        config.float_byte_order = order.parse()?;
    }
    if let Some(mode) = matches.value_of("kill-semantics") {
        config.kill_semantics = mode.parse()?;
    }
    config.validate()?;
    Ok(config)
}

fn parse_line(line: &str, config: &DriverConfig) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("quit" | "exit") => Ok(Input::Quit),
        Some("status") => Ok(Input::Status),
        Some("heartbeat" | "hb") => Ok(Input::Frame(HEARTBEAT_FRAME.to_vec())),
        Some("thrust") => {
            let index: u8 = words
                .next()
                .ok_or("usage: thrust <index> <value>")?
                .parse()
                .map_err(|e| format!("bad index: {}", e))?;
            let value: f32 = words
                .next()
                .ok_or("usage: thrust <index> <value>")?
                .parse()
                .map_err(|e| format!("bad value: {}", e))?;
            let command = Command::SetThruster {
                index: ThrusterIndex::new(index).map_err(|e| e.to_string())?,
                output: ThrusterOutput::new(value).map_err(|e| e.to_string())?,
            };
            Ok(Input::Frame(encode_command(command, config.float_byte_order).to_vec()))
        }
        Some(_) => parse_hex(line).map(Input::Frame),
        None => Err("empty line".to_string()),
    }
}

fn parse_hex(line: &str) -> Result<Vec<u8>, String> {
    let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(format!("not a hex frame: '{}'", line));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", line));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_millis(v: String) -> Result<(), String> {
    match v.parse::<u64>() {
        Ok(0) => Err("Value must be greater than zero".into()),
        Ok(_) => Ok(()),
        Err(_) => Err("Value must be a number of milliseconds".into()),
    }
}
