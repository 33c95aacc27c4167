//! Terra Monitor - MIDI monitor for Terra sensor hardware
//!
//! Finds Terra devices among the host's MIDI ports, decodes their traffic and
//! serves it on the console, a REPL and a small web UI.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use terra_monitor::api::{self, ApiState};
use terra_monitor::cli::Repl;
use terra_monitor::config::{AppConfig, ConfigWatcher, MidiConfig};
use terra_monitor::device::discovery::{DeviceChange, PortScanner};
use terra_monitor::device::DeviceClassifier;
use terra_monitor::midi::{self, format_hex, MessageDecoder};
use terra_monitor::monitor::{self, should_connect, InputHub};
use terra_monitor::paths::AppPaths;
use terra_monitor::session::Session;

/// Terra Monitor - detect Terra sensor hardware and decode its MIDI traffic
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TERRA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log to stdout as JSON
    #[arg(long)]
    log_json: bool,

    /// List available MIDI ports with their classification
    #[arg(long)]
    list_ports: bool,

    /// Classify a device name and exit
    #[arg(long, value_name = "NAME")]
    classify: Option<String>,

    /// Manufacturer string for --classify
    #[arg(long, requires = "classify")]
    manufacturer: Option<String>,

    /// Decode hex bytes (e.g. "90 3C 7F") and exit
    #[arg(long, value_name = "HEX")]
    decode: Option<String>,

    /// Start the interactive REPL
    #[arg(long)]
    repl: bool,

    /// Do not start the web server
    #[arg(long)]
    no_web: bool,

    /// Override the web server port
    #[arg(long)]
    web_port: Option<u16>,

    /// Do not print messages to the console
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.classify.is_some() || args.decode.is_some() || args.list_ports {
        init_logging(&args.log_level, args.log_json, None)?;
        return run_tool(&args);
    }

    let mut paths = AppPaths::detect();
    if let Some(config) = &args.config {
        paths = paths.with_config(config.clone());
    }
    paths.ensure_directories()?;

    let _log_guard = init_logging(&args.log_level, args.log_json, Some(&paths.logs_dir))?;

    info!("Starting Terra Monitor v{}...", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", paths.base_dir().display());

    let config_path = paths.config.to_string_lossy().to_string();
    let mut config = AppConfig::load_or_init(&config_path).await?;
    if let Some(port) = args.web_port {
        config.web.port = port;
    }
    info!("Configuration file: {}", config_path);

    let config_watcher = ConfigWatcher::new(config_path)?;

    run_app(args, paths, config, config_watcher, shutdown_signal()).await?;

    info!("Terra Monitor shutdown complete");
    Ok(())
}

/// One-shot commands that exit without starting capture
fn run_tool(args: &Args) -> Result<()> {
    let classifier = DeviceClassifier::new();

    if args.list_ports {
        monitor::list_ports_formatted(
            &classifier,
            terra_monitor::device::classifier::DEFAULT_TARGET_THRESHOLD,
        )?;
    }

    if let Some(name) = &args.classify {
        let result = classifier.classify_strings(Some(name), args.manufacturer.as_deref());
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if let Some(hex) = &args.decode {
        let bytes = midi::parse_hex(hex)?;
        let event = MessageDecoder::new().decode_now(&bytes);
        println!(
            "{} => {}",
            format_hex(&bytes).bright_white(),
            event.to_string().bright_blue()
        );
        println!("{}", serde_json::to_string_pretty(&event)?);
    }

    Ok(())
}

async fn run_app(
    args: Args,
    paths: AppPaths,
    mut config: AppConfig,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let session = Arc::new(Session::new(config.session_settings()));

    let (frames_tx, mut frames_rx) = mpsc::channel(config.midi.frame_buffer);
    let mut hub = InputHub::new(config.midi.client_name.clone(), frames_tx);
    let mut scanner = PortScanner::new();

    sync_ports(&mut scanner, &mut hub, &session, &config.midi);
    match session.best_target() {
        Some(best) => info!(
            "🎯 Auto-selected Terra input: {} ({:.0}%)",
            best.descriptor.display_name(),
            best.confidence * 100.0
        ),
        None => info!("No Terra device found yet, rescanning every {}ms", config.midi.rescan_interval_ms),
    }
    if hub.is_empty() {
        warn!("No matching MIDI input connected yet, waiting for devices...");
    }

    let api_state = if config.web.enabled && !args.no_web {
        let state = Arc::new(ApiState::new(session.clone(), config.log.recent_limit));
        let server_state = state.clone();
        let host = config.web.host.clone();
        let port = config.web.port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(server_state, &host, port).await {
                error!("Web server stopped: {:#}", e);
            }
        });
        Some(state)
    } else {
        None
    };

    // rustyline blocks, so it gets its own thread
    let mut repl_rx = if args.repl {
        let (tx, rx) = oneshot::channel();
        let repl = Repl::new(
            session.clone(),
            paths.exports_dir.clone(),
            config.midi.client_name.clone(),
        );
        std::thread::spawn(move || {
            let _ = tx.send(repl.run());
        });
        Some(rx)
    } else {
        None
    };

    let mut console = config.log.console && !args.quiet;
    if console {
        monitor::print_banner();
    }

    let mut rescan = tokio::time::interval(Duration::from_millis(config.midi.rescan_interval_ms));

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(frame) = frames_rx.recv() => {
                let entry = session.ingest(frame);
                if console {
                    monitor::print_entry(&entry);
                }
            }

            _ = rescan.tick() => {
                sync_ports(&mut scanner, &mut hub, &session, &config.midi);
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, applying...");

                session.update_settings(new_config.session_settings());
                if let Some(state) = &api_state {
                    state.set_recent_limit(new_config.log.recent_limit);
                }
                console = new_config.log.console && !args.quiet;

                if new_config.midi.rescan_interval_ms != config.midi.rescan_interval_ms {
                    rescan = tokio::time::interval(Duration::from_millis(
                        new_config.midi.rescan_interval_ms,
                    ));
                }
                if new_config.web != config.web {
                    warn!("Web server settings change on restart only");
                }

                config.classifier = new_config.classifier;
                config.log = new_config.log;
                config.midi.connect = new_config.midi.connect;
                config.midi.port_pattern = new_config.midi.port_pattern;
                config.midi.rescan_interval_ms = new_config.midi.rescan_interval_ms;

                apply_connect_policy(&mut hub, &session, &config.midi);
            }

            Some(result) = async {
                match repl_rx.as_mut() {
                    Some(rx) => Some(rx.await.unwrap_or_else(|_| {
                        Err(anyhow::anyhow!("REPL thread ended unexpectedly"))
                    })),
                    None => None,
                }
            } => {
                if let Err(e) = result {
                    warn!("REPL exited with error: {:#}", e);
                }
                info!("REPL closed");
                break;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    hub.close_all();
    let stats = session.stats();
    info!(
        "Captured {} messages ({} Terra, {} invalid)",
        stats.log.total, stats.log.terra_messages, stats.log.invalid_messages
    );

    Ok(())
}

/// Apply hotplug changes from a port rescan
fn sync_ports(scanner: &mut PortScanner, hub: &mut InputHub, session: &Session, midi: &MidiConfig) {
    let changes = match scanner.rescan_inputs() {
        Ok(changes) => changes,
        Err(e) => {
            warn!("MIDI port scan failed: {}", e);
            return;
        }
    };

    for change in changes {
        match change {
            DeviceChange::Connected(device) => {
                session.device_connected(device);
            }
            DeviceChange::Disconnected(device) => {
                hub.disconnect(&device.id);
                session.device_disconnected(&device.id);
            }
        }
    }

    apply_connect_policy(hub, session, midi);
}

/// Open or close capture connections to match the connect policy
fn apply_connect_policy(hub: &mut InputHub, session: &Session, midi: &MidiConfig) {
    let threshold = session.settings().target_threshold;

    for device in session.devices() {
        let id = device.descriptor.id.as_str();
        let wanted = should_connect(&device, midi, threshold);

        if wanted && !hub.is_connected(id) {
            if let Err(e) = hub.connect(&device.descriptor) {
                warn!("Failed to open {}: {}", device.descriptor.display_name(), e);
            }
        } else if !wanted && hub.is_connected(id) {
            info!("Closing {} (no longer selected)", device.descriptor.display_name());
            hub.disconnect(id);
        }
    }
}

fn init_logging(level: &str, json: bool, logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "terra-monitor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
