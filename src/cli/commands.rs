use crate::cli::args::{Args, Command, ConfigCommand, DataFormat, MonitorArgs, PortArgs, RunArgs, SendArgs, SendFileArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter, SendReport};
use crate::core::observer::{ChannelObserver, FanoutObserver, PortEventKind, PortObserver, TracingObserver};
use crate::core::port::LinePort;
use crate::core::transport::TransportOpener;
use crate::domain::config::{LinePortConfig, SerialSettings};
use crate::domain::error::{LinePortError, LinePortResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::memory::MemoryDevice;
use crate::infrastructure::serial::{available_ports, SerialOpener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const MONITOR_HEALTH_INTERVAL: Duration = Duration::from_millis(250);

/// Execute CLI command
pub async fn execute_command(args: Args) -> LinePortResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = ConfigManager::new()?;
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    if !args.quiet {
        init_logging(&config.global.log_level, args.verbose)?;
    }

    let ctx = CommandContext {
        writer: &writer,
        config: &config,
        simulate: args.simulate,
    };

    match args.command {
        Command::Ports => {
            let ports = available_ports().map_err(|e| LinePortError::InvalidInput(format!("Failed to list serial ports: {}", e)))?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Send(send_args) => execute_send(&ctx, send_args).await,
        Command::Monitor(monitor_args) => execute_monitor(&ctx, monitor_args).await,
        Command::SendFile(file_args) => execute_send_file(&ctx, file_args).await,
        Command::Run(run_args) => execute_run(&ctx, run_args).await,
        Command::Config(config_args) => execute_config_command(config_args.command, &writer, &config, &config_manager),
        Command::Version => {
            writer.write_message(&format!("lineport {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

struct CommandContext<'a> {
    writer: &'a ConsoleWriter,
    config: &'a LinePortConfig,
    simulate: bool,
}

impl CommandContext<'_> {
    /// Port wired to real hardware, or to an echoing in-memory device under `--simulate`
    fn port(&self, settings: &SerialSettings, eol: Option<u8>, observer: Arc<dyn PortObserver>) -> LinePort {
        let opener: Arc<dyn TransportOpener> = if self.simulate {
            Arc::new(MemoryDevice::echoing())
        } else {
            Arc::new(SerialOpener::from_settings(settings))
        };

        let mut builder = LinePort::builder()
            .opener(opener)
            .observer(observer)
            .global_config(&self.config.global)
            .transfer(self.config.transfer);
        if let Some(eol) = eol {
            builder = builder.eol(eol);
        }
        builder.build()
    }

    async fn open(&self, args: &PortArgs, observer: Arc<dyn PortObserver>) -> LinePortResult<LinePort> {
        let eol = args.eol.as_deref().map(parse_eol).transpose()?;
        let port = self.port(&SerialSettings::from(args), eol, observer);
        let timeout = args.read_timeout_ms.map(Duration::from_millis);
        port.open(&args.port, args.baud, timeout).await?;
        Ok(port)
    }
}

async fn execute_send(ctx: &CommandContext<'_>, args: SendArgs) -> LinePortResult<()> {
    let mut data = parse_data(&args.data, args.format)?;
    if args.line {
        data.extend_from_slice(b"\r\n");
    }

    let port = ctx.open(&args.port, Arc::new(TracingObserver)).await?;
    let result: LinePortResult<Option<String>> = async {
        port.write(&data).await?;
        match &args.expect {
            Some(pattern) => port
                .wait_for_regex_timeout(pattern, Duration::from_millis(args.timeout))
                .await
                .map(Some),
            None => Ok(None),
        }
    }
    .await;
    port.close().await?;

    ctx.writer.write_report(&SendReport {
        port: args.port.port,
        bytes_sent: data.len(),
        matched: result?,
    })?;
    Ok(())
}

async fn execute_monitor(ctx: &CommandContext<'_>, args: MonitorArgs) -> LinePortResult<()> {
    let (channel, mut events) = ChannelObserver::new();
    let observer = FanoutObserver::new()
        .with(Arc::new(TracingObserver))
        .with(Arc::new(channel));
    let port = ctx.open(&args.port, Arc::new(observer)).await?;

    let deadline = args.duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    info!("Monitoring {} (Ctrl+C to stop)", args.port.port);

    let result = loop {
        let stop = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = stop => break Ok(()),
            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                match event.kind {
                    // The line is already buffered; consuming it keeps the buffer from growing
                    PortEventKind::LineReceived(_) => {
                        let printed = match port.read_line().await {
                            Ok(line) => ctx.writer.write_line(&event.port, &line).map_err(LinePortError::from),
                            Err(e) => Err(e),
                        };
                        if let Err(e) = printed {
                            break Err(e);
                        }
                    }
                    PortEventKind::Closed => break Ok(()),
                    other => debug!("Monitor event: {:?}", other),
                }
            }
            _ = tokio::time::sleep(MONITOR_HEALTH_INTERVAL) => {
                // A dead reader produces no events; surface its error
                if !port.is_open() {
                    break port.read_line().await.map(|_| ());
                }
            }
        }
    };

    port.close().await?;
    result
}

async fn execute_send_file(ctx: &CommandContext<'_>, args: SendFileArgs) -> LinePortResult<()> {
    let port = ctx.open(&args.port, Arc::new(TracingObserver)).await?;
    let result = port.send_file(&args.path).await;
    port.close().await?;

    ctx.writer.write_report(&SendReport {
        port: args.port.port,
        bytes_sent: result?,
        matched: None,
    })?;
    Ok(())
}

async fn execute_run(ctx: &CommandContext<'_>, args: RunArgs) -> LinePortResult<()> {
    let device = ctx
        .config
        .device(&args.device)
        .ok_or_else(|| LinePortError::InvalidInput(format!("Unknown device '{}'", args.device)))?;
    let command = device.command(&args.command).ok_or_else(|| {
        LinePortError::InvalidInput(format!("Device '{}' has no command '{}'", device.name, args.command))
    })?;

    let port = ctx.port(&device.serial, None, Arc::new(TracingObserver));
    port.open(&device.serial.port, device.serial.baud_rate, None).await?;

    info!("Running '{}' on {}", command.name, device.name);
    let result: LinePortResult<Option<String>> = async {
        port.println(&command.template).await?;
        match &command.response_pattern {
            Some(pattern) => port
                .wait_for_regex_timeout(pattern, Duration::from_millis(command.timeout_ms))
                .await
                .map(Some),
            None => Ok(None),
        }
    }
    .await;
    port.close().await?;

    ctx.writer.write_report(&SendReport {
        port: device.serial.port.clone(),
        bytes_sent: command.template.len() + 2,
        matched: result?,
    })?;
    Ok(())
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &LinePortConfig,
    config_manager: &ConfigManager,
) -> LinePortResult<()> {
    match command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Validate { file } => {
            let loaded = match &file {
                Some(config_path) => config_manager.load_config_from_path(config_path.as_ref()),
                None => config_manager.load_config(),
            };
            let label = file.map_or_else(|| "Current configuration".to_string(), |path| format!("Configuration file '{}'", path));
            match loaded.and_then(|config| validate_config(&config)) {
                Ok(()) => writer.write_message(&format!("{} is valid", label))?,
                Err(e) => writer.write_error(&format!("Configuration validation failed: {}", e))?,
            }
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            if global {
                let global_path = config_manager.get_global_config_path_ref();
                config_manager.save_config_to_path(global_path, &LinePortConfig::default())?;
                writer.write_message(&format!("Global configuration initialized at '{}'", global_path.display()))?;
            } else {
                let base = match dir {
                    Some(dir) => PathBuf::from(dir),
                    None => std::env::current_dir().map_err(|e| LinePortError::Config {
                        message: format!("Failed to get current directory: {}", e),
                    })?,
                };
                let path = config_manager.init_project_config(&base)?;
                writer.write_message(&format!("Project configuration initialized at '{}'", path.display()))?;
            }
            Ok(())
        }
        ConfigCommand::Devices => {
            writer.write_devices(&config.devices)?;
            Ok(())
        }
    }
}

/// Check the parts of a configuration that only fail at use time
fn validate_config(config: &LinePortConfig) -> LinePortResult<()> {
    if config.transfer.chunk_size == 0 {
        return Err(LinePortError::Config {
            message: "transfer.chunk_size must be greater than zero".to_string(),
        });
    }
    for device in &config.devices {
        for command in &device.commands {
            if let Some(pattern) = &command.response_pattern {
                regex::Regex::new(pattern).map_err(|e| LinePortError::Config {
                    message: format!("Device '{}' command '{}': {}", device.name, command.name, e),
                })?;
            }
        }
    }
    Ok(())
}

fn parse_data(data: &str, format: DataFormat) -> LinePortResult<Vec<u8>> {
    match format {
        DataFormat::Text => Ok(data.as_bytes().to_vec()),
        DataFormat::Hex => {
            let cleaned = data.replace([' ', '\n'], "");
            hex::decode(&cleaned).map_err(|e| LinePortError::InvalidInput(format!("Invalid hex data: {}", e)))
        }
        DataFormat::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| LinePortError::InvalidInput(format!("Invalid base64 data: {}", e)))
        }
    }
}

/// Delimiter from the command line: `;`, `\r`, `\n`, `\t` or `0x0d`
fn parse_eol(value: &str) -> LinePortResult<u8> {
    match value {
        "\\n" => return Ok(b'\n'),
        "\\r" => return Ok(b'\r'),
        "\\t" => return Ok(b'\t'),
        _ => {}
    }
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|e| LinePortError::InvalidInput(format!("Invalid EOL '{}': {}", value, e)));
    }
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(LinePortError::InvalidInput(format!(
            "EOL must be a single byte, got '{}'",
            value
        ))),
    }
}
