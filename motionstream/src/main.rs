/*!
# Motionstream

Command-line client for the Motion Service real-time data streams.

## Features

- Stream Preview, Sensor, Raw or Configurable data as JSON lines
- Raw payload dumps in hex
- Interactive scripting console
- Take file conversion to CSV or other delimited text
- TOML configuration file for host, ports and timeouts

## Usage

### Stream sensor data
```bash
motionstream stream --service sensor --samples 100
```

### Configurable service with custom channels
```bash
motionstream stream --service configurable --channel preview.Gq --channel sensor.a
```

### Send a console chunk
```bash
motionstream console "print(node.get_version())"
```

### Convert take files
```bash
motionstream convert --raw take/raw_data.bin
```
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use motion_sdk::console::{self, ResultCode};
use motion_sdk::{Connection, Service};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod convert;
mod stream;

use config::AppConfig;
use convert::{ConvertOptions, OutputTarget};
use stream::{MotionStreamer, StreamOptions};

#[derive(Parser)]
#[command(name = "motionstream")]
#[command(about = "Stream, script and export Motion Service data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "motionstream.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print messages from a data service
    Stream {
        /// Data service: preview, sensor, raw or configurable
        #[arg(short, long, value_parser = parse_service)]
        service: Option<Service>,

        /// Motion Service host
        #[arg(long)]
        host: Option<String>,

        /// Override the service port
        #[arg(short, long)]
        port: Option<u16>,

        /// Stop after this many messages
        #[arg(short = 'n', long)]
        samples: Option<u64>,

        /// Print raw payloads as hex
        #[arg(long)]
        hex: bool,

        /// Configurable channel as service.name, repeatable
        #[arg(long = "channel")]
        channels: Vec<String>,
    },

    /// Send script chunks to the console service
    Console {
        /// Chunk to run, reads lines from stdin when omitted
        chunk: Option<String>,

        /// Motion Service host
        #[arg(long)]
        host: Option<String>,

        /// Override the console port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert binary take files to delimited text
    Convert {
        /// Take files to convert
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Input files are raw format, default is sensor format
        #[arg(short, long)]
        raw: bool,

        /// Do not print the channel name header
        #[arg(short, long)]
        no_names: bool,

        /// Column separator
        #[arg(short, long, default_value = ",")]
        separator: String,

        /// Output file, - for standard output, default is <input>.csv
        #[arg(short = 'f', long = "file")]
        output: Option<PathBuf>,

        /// Records include a temperature channel
        #[arg(short, long)]
        temperature: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "motionstream.toml")]
        output: PathBuf,
    },
}

fn parse_service(s: &str) -> std::result::Result<Service, String> {
    Service::from_name(s).ok_or_else(|| {
        format!(
            "unknown service {:?}, expected one of preview, sensor, raw, configurable",
            s
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr to keep stdout clean for data
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Stream {
            service,
            host,
            port,
            samples,
            hex,
            channels,
        } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            run_stream(config, service, host, port, samples, hex, channels)
        }

        Commands::Console { chunk, host, port } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            run_console(config, chunk, host, port)
        }

        Commands::Convert {
            inputs,
            raw,
            no_names,
            separator,
            output,
            temperature,
        } => {
            let options = ConvertOptions {
                raw,
                show_names: !no_names,
                separator,
                temperature,
            };
            let target = OutputTarget::from_arg(output.as_deref());
            let rows = convert::run(&inputs, &target, &options)?;
            info!("Converted {} file(s), {} rows", inputs.len(), rows);
            Ok(())
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Stream one service to stdout, command line values override the config file
fn run_stream(
    config: AppConfig,
    service: Option<Service>,
    host: Option<String>,
    port: Option<u16>,
    samples: Option<u64>,
    hex: bool,
    channel_args: Vec<String>,
) -> Result<()> {
    let service = service.unwrap_or(config.stream.service);

    let channels = if channel_args.is_empty() {
        config.stream.channel_set()?
    } else {
        let mut channels = motion_sdk::channels::ChannelSet::new();
        for entry in &channel_args {
            channels
                .insert_entry(entry)
                .with_context(|| format!("Invalid --channel {}", entry))?;
        }
        channels
    };

    let max_samples = samples.or(match config.stream.max_samples {
        0 => None,
        n => Some(n),
    });

    let options = StreamOptions {
        host: host.unwrap_or(config.connection.host),
        port: port.unwrap_or_else(|| config.ports.port_for(service)),
        service,
        max_samples,
        hex,
        channels,
        channel_capacity: config.stream.channel_capacity,
        wait_timeout_secs: config.connection.wait_timeout_secs,
        read_timeout_secs: config.connection.read_timeout_secs,
        write_timeout_secs: config.connection.write_timeout_secs,
    };

    let mut streamer = MotionStreamer::new(options);

    let running = streamer.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("Received Ctrl+C, shutting down");
        running.store(false, Ordering::SeqCst);
    })?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = streamer.start(&mut out)?;
    info!("Stream finished, {} messages", written);
    Ok(())
}

/// Run one chunk, or a read-eval-print loop over stdin lines
fn run_console(
    config: AppConfig,
    chunk: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let host = host.unwrap_or(config.connection.host);
    let port = port.unwrap_or(config.ports.console);
    let timeout = Some(config.connection.wait_timeout_secs);

    let mut client = Connection::connect(&host, port)
        .with_context(|| format!("Failed to connect to console at {}:{}", host, port))?;
    // Console replies never carry XML acknowledgments
    client.set_intercept_control(false);

    if let Some(chunk) = chunk {
        let result = console::send_chunk(&mut client, &chunk, timeout)?;
        print!("{}", result.output);
        io::stdout().flush()?;
        return match result.code {
            ResultCode::Success => Ok(()),
            ResultCode::Failure => bail!("Console chunk failed"),
            ResultCode::Continue => bail!("Console chunk is incomplete"),
        };
    }

    // Incomplete chunks are accumulated until the console accepts them
    let mut pending = String::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        pending.push_str(&line);
        pending.push('\n');

        let result = console::send_chunk(&mut client, &pending, timeout)?;
        match result.code {
            ResultCode::Success => {
                print!("{}", result.output);
                pending.clear();
            }
            ResultCode::Failure => {
                eprint!("{}", result.output);
                warn!("Console chunk failed");
                pending.clear();
            }
            ResultCode::Continue => {}
        }
        io::stdout().flush()?;

        if !client.is_connected() {
            bail!("Console service closed the connection");
        }
    }

    if !pending.is_empty() {
        warn!("Discarding incomplete chunk at end of input");
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    info!("Generated configuration file: {}", output_path.display());
    info!("Edit the file to customize settings, then run:");
    info!("   motionstream --config {} stream", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stream_arguments() {
        let cli = Cli::parse_from([
            "motionstream",
            "--verbose",
            "stream",
            "--service",
            "Configurable",
            "-n",
            "10",
            "--channel",
            "preview.Gq",
            "--channel",
            "sensor.a",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("motionstream.toml"));

        match cli.command {
            Commands::Stream {
                service,
                samples,
                channels,
                hex,
                ..
            } => {
                assert_eq!(service, Some(Service::Configurable));
                assert_eq!(samples, Some(10));
                assert_eq!(channels, vec!["preview.Gq", "sensor.a"]);
                assert!(!hex);
            }
            _ => panic!("expected stream command"),
        }
    }

    #[test]
    fn test_unknown_service_rejected() {
        assert!(Cli::try_parse_from(["motionstream", "stream", "--service", "video"]).is_err());
    }

    #[test]
    fn test_parse_convert_arguments() {
        let cli = Cli::parse_from([
            "motionstream",
            "convert",
            "-r",
            "-n",
            "-s",
            ";",
            "-f",
            "-",
            "a.bin",
            "b.bin",
        ]);

        match cli.command {
            Commands::Convert {
                inputs,
                raw,
                no_names,
                separator,
                output,
                temperature,
            } => {
                assert_eq!(inputs, vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")]);
                assert!(raw && no_names && !temperature);
                assert_eq!(separator, ";");
                assert_eq!(
                    OutputTarget::from_arg(output.as_deref()),
                    OutputTarget::Stdout
                );
            }
            _ => panic!("expected convert command"),
        }
    }

    #[test]
    fn test_generate_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motionstream.toml");
        generate_config_file(path.clone()).unwrap();
        assert_eq!(AppConfig::load_from_file(&path).unwrap(), AppConfig::new());
    }
}
