//! csi-link CLI
//!
//! Runs either end of the CSI telemetry link. Without a subcommand the
//! receiver starts with the stored configuration, which is what the firmware
//! image does on boot.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csi_link::{
    capture::{spawn_emitter, CaptureCore, Emitter},
    config::Config,
    link::{bind_udp, AssociationManager, LivenessSignal},
    radio::Radio,
    receiver::CsiReceiver,
    stats::create_shared_stats_with_persistence,
    transmitter::Transmitter,
    VERSION,
};
use macaddr::MacAddr6;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const RECEIVER_STATS_FILE: &str = "receiver_stats.json";
const TRANSMITTER_STATS_FILE: &str = "transmitter_stats.json";

#[derive(Parser)]
#[command(name = "csi-link")]
#[command(version = VERSION)]
#[command(about = "Wi-Fi CSI telemetry link: beacon transmitter and filtered CSI receiver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the transmitter's network and stream its CSI to stdout
    Receive(ReceiveArgs),

    /// Host the network and broadcast beacon frames
    Transmit {
        /// Beacon destination (default 192.168.4.255:8080)
        #[arg(long)]
        broadcast: Option<SocketAddr>,

        /// Milliseconds between beacons
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Show cumulative link statistics
    Status,

    /// Show configuration
    Config,
}

#[derive(clap::Args, Default)]
struct ReceiveArgs {
    /// Transmitter hardware address, e.g. 84:1F:E8:67:F6:AD
    #[arg(long)]
    peer: Option<String>,

    /// Network name to join
    #[arg(long)]
    ssid: Option<String>,

    /// Network password
    #[arg(long)]
    password: Option<String>,

    /// Keepalive destination (default 192.168.4.1:8080)
    #[arg(long)]
    target: Option<SocketAddr>,

    /// Capacity of the queue between the CSI callback and the output writer
    #[arg(long)]
    queue_capacity: Option<usize>,
}

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    esp_idf_svc::sys::link_patches();

    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        None => cmd_receive(ReceiveArgs::default()),
        Some(Commands::Receive(args)) => cmd_receive(args),
        Some(Commands::Transmit {
            broadcast,
            interval_ms,
        }) => cmd_transmit(broadcast, interval_ms),
        Some(Commands::Status) => {
            cmd_status();
            Ok(())
        }
        Some(Commands::Config) => cmd_config(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });
    if let Err(e) = config.ensure_directories() {
        tracing::warn!(error = %e, "could not create data directory");
    }
    config
}

fn cmd_receive(args: ReceiveArgs) -> Result<()> {
    let mut config = load_config();

    if let Some(peer) = args.peer {
        config.receiver.peer = peer
            .parse::<MacAddr6>()
            .with_context(|| format!("invalid peer address {peer:?}"))?;
    }
    if let Some(ssid) = args.ssid {
        config.network.ssid = ssid;
    }
    if let Some(password) = args.password {
        config.network.password = password;
    }
    if let Some(target) = args.target {
        config.receiver.target = target;
    }
    if let Some(capacity) = args.queue_capacity {
        config.receiver.queue_capacity = capacity;
    }

    let stats = create_shared_stats_with_persistence(config.data_path.join(RECEIVER_STATS_FILE));
    tracing::info!(
        version = VERSION,
        session = %stats.session_id(),
        peer = %config.receiver.peer,
        ssid = %config.network.ssid,
        "starting receiver"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_shutdown_handler(running.clone())?;

    let (core, queue) = CaptureCore::new(
        config.receiver.peer,
        config.receiver.queue_capacity,
        stats.clone(),
    );
    let emitter = Emitter::new(queue, std::io::stdout(), stats.clone());
    let emitter_thread = spawn_emitter(emitter, running.clone());

    let radio = create_radio()?;

    #[cfg(not(target_os = "espidf"))]
    let mut synthetic_peer = {
        let mut peer = csi_link::radio::SyntheticPeer::new(
            radio.handle(),
            config.receiver.peer.into_array(),
            config.transmitter.beacon_interval,
        );
        peer.start();
        peer
    };

    let association = AssociationManager::new(
        radio,
        config.network.ssid.clone(),
        config.network.password.clone(),
        Arc::new(core),
        config.receiver.retry.clone(),
        stats.clone(),
    );
    let socket = bind_udp(false).context("failed to open keepalive socket")?;
    let liveness = LivenessSignal::new(socket, config.receiver.target, stats.clone());
    let mut receiver = CsiReceiver::new(association, liveness, config.receiver.loop_interval);

    let result = receiver.run(&running);

    running.store(false, Ordering::SeqCst);

    #[cfg(not(target_os = "espidf"))]
    synthetic_peer.stop();

    match emitter_thread.join() {
        Ok(emitted) => tracing::info!(emitted, "capture stopped"),
        Err(_) => tracing::error!("emitter thread panicked"),
    }

    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "could not save link statistics");
    }
    eprintln!("{}", stats.summary());

    result.context("receiver stopped")
}

fn cmd_transmit(broadcast: Option<SocketAddr>, interval_ms: Option<u64>) -> Result<()> {
    let mut config = load_config();

    if let Some(broadcast) = broadcast {
        config.transmitter.broadcast = broadcast;
    }
    if let Some(ms) = interval_ms {
        config.transmitter.beacon_interval = Duration::from_millis(ms);
    }

    let stats =
        create_shared_stats_with_persistence(config.data_path.join(TRANSMITTER_STATS_FILE));
    tracing::info!(version = VERSION, session = %stats.session_id(), "starting transmitter");

    let running = Arc::new(AtomicBool::new(true));
    install_shutdown_handler(running.clone())?;

    let radio = create_radio()?;
    let socket = bind_udp(true).context("failed to open beacon socket")?;
    let mut transmitter = Transmitter::new(
        radio,
        socket,
        config.access_point(),
        config.transmitter.broadcast,
        config.transmitter.payload.clone(),
        config.transmitter.beacon_interval,
        stats.clone(),
    );

    let result = transmitter.run(&running);

    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "could not save link statistics");
    }
    eprintln!("{}", stats.summary());

    result.context("transmitter stopped")
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("csi-link Status");
    println!("===============");
    println!();
    println!("Peer: {}", config.receiver.peer);
    println!("Network: {}", config.network.ssid);
    println!();

    print_persisted("Receiver", &config.data_path.join(RECEIVER_STATS_FILE));
    print_persisted("Transmitter", &config.data_path.join(TRANSMITTER_STATS_FILE));
}

fn print_persisted(role: &str, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        println!("{role}: no previous session data found.");
        return;
    };
    let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) else {
        println!("{role}: statistics file {path:?} is unreadable.");
        return;
    };

    println!("{role} cumulative statistics:");
    let fields = [
        ("frames_admitted", "Frames admitted"),
        ("frames_emitted", "Frames emitted"),
        ("frames_dropped", "Frames dropped"),
        ("write_errors", "Write errors"),
        ("reconnects", "Reconnects"),
        ("keepalives_sent", "Keepalives sent"),
        ("beacons_sent", "Beacons sent"),
        ("last_updated", "Last updated"),
    ];
    for (key, label) in fields {
        if let Some(value) = stats.get(key) {
            println!("  {label}: {value}");
        }
    }
    println!();
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(target_os = "espidf")]
fn create_radio() -> Result<Radio> {
    Ok(csi_link::radio::EspRadio::new()?)
}

#[cfg(not(target_os = "espidf"))]
fn create_radio() -> Result<Radio> {
    tracing::warn!("no CSI-capable radio on this target, using the simulated radio");
    Ok(csi_link::radio::SimRadio::default())
}

/// Set up Ctrl+C handler.
#[cfg(not(target_os = "espidf"))]
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl+C handler")
}

/// The firmware runs until reset.
#[cfg(target_os = "espidf")]
fn install_shutdown_handler(_running: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
