//! Binary entry point: CLI parsing, process wiring, and graceful shutdown.
//!
//! Owns nothing but wiring — the Relay Engine and the Bridge each own their
//! own state and run as independent tasks connected by two channels.

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use timeguard_gateway::bridge::{Bridge, BridgeConfig};
use timeguard_gateway::config::{Cli, PendingReplyConfig};
use timeguard_gateway::relay::{RelayEngine, RelayEngineConfig};
use timeguard_gateway::{log_error, log_info};

const EVENT_QUEUE_CAPACITY: usize = 256;
const COMMAND_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    timeguard_gateway::init_logger(cli.debug);

    let relay_cfg = RelayEngineConfig {
        mode: cli.mode,
        debug: cli.debug,
        print_parsed_data: cli.print_parsed_data,
        mask: cli.mask,
        pending_reply: PendingReplyConfig::default(),
    };

    let engine = match RelayEngine::bind(relay_cfg) {
        Ok(engine) => engine,
        Err(err) => {
            log_error(&format!("failed to bind relay engine: {err}"));
            std::process::exit(1);
        }
    };

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();

    let relay_shutdown = shutdown.clone();
    let relay_task = tokio::spawn(engine.run(command_rx, event_tx, relay_shutdown));

    // Kept alive for the process lifetime when no Bridge is running, so the
    // Relay Engine's `command_rx.recv()` parks instead of observing a closed
    // channel (which would otherwise resolve immediately on every poll).
    let mut _command_tx_keepalive = None;
    let bridge_task = match cli.mqtt_host.clone() {
        Some(mqtt_host) => {
            let bridge_cfg = BridgeConfig {
                mqtt_host,
                mqtt_port: cli.mqtt_port,
                mqtt_clientid: cli.mqtt_clientid.clone(),
                mqtt_username: cli.mqtt_username.clone(),
                mqtt_password: cli.mqtt_password.clone(),
                root_topic: cli.mqtt_root_topic.clone(),
                discovery_root: cli.homeassistant_discovery.clone(),
                homeassistant_status_topic: cli.homeassistant_status_topic.clone(),
                device_online_timeout: cli.device_online_timeout(),
            };
            let bridge = match Bridge::new(bridge_cfg) {
                Ok(bridge) => bridge,
                Err(err) => {
                    log_error(&format!("failed to construct bridge: {err}"));
                    shutdown.cancel();
                    std::process::exit(1);
                }
            };
            let bridge_shutdown = shutdown.clone();
            Some(tokio::spawn(bridge.run(event_rx, command_tx, bridge_shutdown)))
        }
        None => {
            log_info("no --mqtt-host given, running with the relay engine only");
            _command_tx_keepalive = Some(command_tx);
            tokio::spawn(async move {
                let mut event_rx = event_rx;
                while event_rx.recv().await.is_some() {}
            });
            None
        }
    };

    wait_for_shutdown_signal().await;
    log_info("shutdown signal received, draining");
    shutdown.cancel();

    if let Err(err) = relay_task.await {
        log_error(&format!("relay task panicked: {err}"));
    }
    if let Some(bridge_task) = bridge_task {
        if let Err(err) = bridge_task.await {
            log_error(&format!("bridge task panicked: {err}"));
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
