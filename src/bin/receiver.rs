//! Screen Receiver Application
//!
//! Answers discovery requests and keeps ffplay listening for incoming streams,
//! relaunching it after every disconnect.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_screen_mirror::{
    config::AppConfig,
    network::{local_lan_ip, DiscoveryResponder},
    session::{
        probe_executable, FfplayReceiverCommand, SessionEvent, SessionState, StreamSupervisor,
    },
};

#[derive(Debug, Parser)]
#[command(name = "receiver", about = "Play a mirrored screen streamed from the LAN")]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stream port to listen on
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// UDP port for discovery requests
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Play in a window instead of fullscreen
    #[arg(long)]
    windowed: bool,

    /// Do not answer discovery requests
    #[arg(long)]
    no_discovery: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };
    let mut config = AppConfig::load_or_default(&config_path)?;
    if let Some(port) = args.port {
        config.receiver.port = port;
    }
    if let Some(port) = args.discovery_port {
        config.network.discovery_port = port;
    }
    if args.windowed {
        config.receiver.fullscreen = false;
    }
    config.validate()?;

    tracing::info!("Starting Screen Receiver");
    println!("IP: {}", local_lan_ip());

    probe_executable(&config.receiver.executable)
        .await
        .with_context(|| format!("{} is required for playback", config.receiver.executable))?;

    let responder = if args.no_discovery {
        None
    } else {
        let responder = DiscoveryResponder::start(config.network.discovery_port)
            .await
            .context("Failed to start discovery responder")?;
        Some(responder)
    };

    let receiver = config.receiver.clone();
    let mut supervisor = StreamSupervisor::new(FfplayReceiverCommand, config.supervisor.clone());
    tokio::spawn(print_events(supervisor.subscribe()));
    supervisor.start(receiver.clone())?;

    println!("Listening on {}:{}. Press Ctrl+C to stop.", receiver.listen_ip, receiver.port);

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            true
        }
        _ = supervisor.join() => false,
    };

    println!("Stopping receiver...");
    supervisor.shutdown().await;
    if let Some(responder) = responder {
        let stats = responder.stats();
        tracing::info!(
            "Discovery: {} requests answered, {} datagrams ignored",
            stats.replies_sent,
            stats.ignored
        );
        responder.shutdown().await;
    }

    if !interrupted && supervisor.state() == SessionState::Failed {
        let status = supervisor.status();
        bail!(
            "Receiver stopped: {}",
            status.last_error.unwrap_or_else(|| status.state.to_string())
        );
    }

    println!("Receiver stopped.");
    Ok(())
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(SessionState::Running)) => {
                println!("Waiting for connection...")
            }
            Ok(SessionEvent::StateChanged(state)) => println!("Status: {}", state),
            Ok(SessionEvent::Exited(outcome)) => println!("Stream {}", outcome),
            Ok(SessionEvent::LaunchFailed(reason)) => println!("Cannot start player: {}", reason),
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}
