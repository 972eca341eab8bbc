// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod correlation;
mod dispatcher;
mod logger;
mod mqtt;
mod publisher;
mod receiver;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rigbridge_app::{init_logging, ConfigFile};
use rigbridge_backend::{register_builtin_backends_on, RegistrationContext};
use rigbridge_core::rig::policies::{ExponentialBackoff, FixedDelay};
use rigbridge_core::{DynResult, RadioAdapter, RadioLink};

use config::{RigConfig, ServerConfig};
use dispatcher::CommandDispatcher;
use logger::{LoggerLoop, LoggerSender};
use mqtt::MessageSink;
use publisher::Publisher;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - radio to MQTT and logger bridge");
/// Upper bound for writing queued messages and the DISCONNECT on exit.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
    /// Store the logger datagram destination and exit
    #[arg(long = "set-sender-address", num_args = 2, value_names = ["HOST", "PORT"])]
    set_sender_address: Option<Vec<String>>,
    /// Store the logger listen port and exit
    #[arg(long = "set-receiver-port", value_name = "PORT")]
    set_receiver_port: Option<u16>,
    /// Store the MQTT broker address and exit
    #[arg(long = "set-broker", num_args = 2, value_names = ["ADDRESS", "PORT"])]
    set_broker: Option<Vec<String>>,
}

fn parse_host_port(values: &[String]) -> DynResult<(String, u16)> {
    let [host, port] = values else {
        return Err("expected <HOST> <PORT>".into());
    };
    let port: u16 = port
        .parse()
        .map_err(|e| format!("Invalid port '{}': {}", port, e))?;
    Ok((host.clone(), port))
}

/// Apply the setter options. Returns a confirmation line per change.
fn apply_setters(cli: &Cli, cfg: &mut ServerConfig) -> DynResult<Vec<String>> {
    let mut changes = Vec::new();
    if let Some(values) = &cli.set_sender_address {
        let (address, port) = parse_host_port(values)?;
        changes.push(format!(
            "Updated sender address to: {} and port to: {}",
            address, port
        ));
        cfg.udp_sender.address = address;
        cfg.udp_sender.port = port;
    }
    if let Some(port) = cli.set_receiver_port {
        cfg.udp_receiver.port = port;
        changes.push(format!("Updated receiver port to: {}", port));
    }
    if let Some(values) = &cli.set_broker {
        let (address, port) = parse_host_port(values)?;
        changes.push(format!(
            "Updated broker address to: {} and port to: {}",
            address, port
        ));
        cfg.mqtt.address = address;
        cfg.mqtt.port = port;
    }
    Ok(changes)
}

fn load_config(cli: &Cli) -> DynResult<(ServerConfig, PathBuf)> {
    match &cli.config {
        Some(path) => Ok((ServerConfig::load_from_file(path)?, path.clone())),
        None => Ok(ServerConfig::load_or_persist_defaults()?),
    }
}

fn build_link(
    section: &str,
    rig: &RigConfig,
    registry: &RegistrationContext,
) -> DynResult<Box<dyn RadioLink>> {
    if !registry.is_backend_registered(&rig.backend) {
        return Err(format!(
            "[{}].backend '{}' is unknown (available: {})",
            section,
            rig.backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }
    let access = rig.access.to_rig_access()?;
    info!("{}: backend {} ({:?})", section, rig.backend, access);
    registry.build_link(&rig.backend, access)
}

fn log_summary(cfg: &ServerConfig, path: &Path) {
    info!("Loaded configuration from {}", path.display());
    info!(
        "Logger datagrams: {}:{} every {} ms",
        cfg.udp_sender.address, cfg.udp_sender.port, cfg.logger.interval_ms
    );
    if cfg.udp_receiver.enabled {
        info!("Logger listener: port {}", cfg.udp_receiver.port);
    } else {
        info!("Logger listener: disabled");
    }
    info!(
        "Publisher: frequent {} ms, sporadic {} s",
        cfg.publisher.frequent_interval_ms, cfg.publisher.sporadic_interval_secs
    );
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = load_config(&cli)?;

    let changes = apply_setters(&cli, &mut cfg)?;
    if !changes.is_empty() {
        cfg.validate()
            .map_err(|e| format!("Invalid configuration: {}", e))?;
        cfg.save_to_file(&config_path)?;
        for line in changes {
            println!("{}", line);
        }
        return Ok(());
    }

    if cli.log_level.is_some() {
        cfg.general.log_level = cli.log_level.clone();
    }
    cfg.validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;
    init_logging(cfg.general.log_level.as_deref());
    log_summary(&cfg, &config_path);

    let rig1 = build_link("rig1", &cfg.rig1, &registry)?;
    let rig2 = cfg
        .rig2
        .as_ref()
        .map(|rig| build_link("rig2", rig, &registry))
        .transpose()?;
    let adapter = RadioAdapter::new(rig1, rig2);
    let mut task_handles: Vec<JoinHandle<()>> = adapter.spawn_event_pump();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Broker session
    let (mqtt_sink, eventloop) = mqtt::connect(&cfg.mqtt);
    let sink: Arc<dyn MessageSink> = Arc::new(mqtt_sink.clone());
    let (connected_tx, mut connected_rx) = watch::channel(false);
    let dispatcher = CommandDispatcher::new(adapter.clone());
    let reconnect = ExponentialBackoff::new(
        Duration::from_secs(cfg.mqtt.reconnect_delay_secs),
        Duration::from_secs(cfg.mqtt.reconnect_max_delay_secs),
    );
    let mqtt_task = tokio::spawn(mqtt::run_event_loop(
        eventloop,
        Arc::clone(&sink),
        dispatcher,
        adapter.clone(),
        Box::new(reconnect),
        connected_tx,
        shutdown_rx.clone(),
    ));

    let connect_timeout = Duration::from_secs(cfg.mqtt.connect_timeout_secs);
    match tokio::time::timeout(connect_timeout, connected_rx.wait_for(|connected| *connected)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => return Err("MQTT session ended before connecting".into()),
        Err(_) => {
            mqtt_task.abort();
            return Err(format!(
                "Failed to connect to MQTT broker {}:{} within {:?}",
                cfg.mqtt.address, cfg.mqtt.port, connect_timeout
            )
            .into());
        }
    }

    // Logger datagram target; must resolve before anything is sent.
    let target = logger::resolve_ipv4(&cfg.udp_sender.address, cfg.udp_sender.port).await?;
    let sender = LoggerSender::bind(
        target,
        Duration::from_secs(cfg.logger.resend_after_secs),
    )
    .await?;

    if cfg.udp_receiver.enabled {
        let socket = receiver::bind(cfg.udp_receiver.port).await?;
        task_handles.push(tokio::spawn(receiver::run(
            socket,
            adapter.clone(),
            shutdown_rx.clone(),
        )));
    }

    let publisher = Publisher::new(adapter.clone(), Arc::clone(&sink), &cfg.publisher);
    task_handles.push(tokio::spawn(publisher.run(shutdown_rx.clone())));

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // Dropping the sender would stop every loop.
                let _keep = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    let logger = LoggerLoop::new(
        adapter,
        sender,
        cfg.logger.station(),
        Duration::from_millis(cfg.logger.interval_ms),
        Box::new(FixedDelay::new(Duration::from_secs(cfg.logger.error_backoff_secs))),
        sink,
    );
    logger.run(shutdown_rx).await;

    // Flush queued publishes, then DISCONNECT.
    match mqtt_sink.disconnect() {
        Ok(()) => {
            if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, mqtt_task).await.is_err() {
                warn!("MQTT session did not close within {:?}", SHUTDOWN_FLUSH_TIMEOUT);
            }
        }
        Err(e) => {
            warn!("Failed to queue MQTT disconnect: {}", e);
            mqtt_task.abort();
        }
    }

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    info!("Stopped");
    Ok(())
}
