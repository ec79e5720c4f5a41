//! Screen Sender Application
//!
//! Captures the screen with ffmpeg and streams it to a receiver over TCP,
//! relaunching the encoder whenever the stream drops.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_screen_mirror::{
    config::AppConfig,
    network::discover,
    protocol::PeerAddress,
    session::{
        command::list_devices_command, probe_executable, process::run_to_completion,
        FfmpegSenderCommand, SessionEvent, StreamSupervisor,
    },
};

#[derive(Debug, Parser)]
#[command(name = "sender", about = "Stream this screen to a receiver on the LAN")]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Receiver IP address
    #[arg(long, short = 'r')]
    receiver: Option<String>,

    /// Receiver stream port
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Output resolution as width:height, or "native"
    #[arg(long)]
    resolution: Option<String>,

    /// Find a receiver on the LAN and use the first one that answers
    #[arg(long)]
    scan: bool,

    /// Only list receivers found on the LAN, then exit
    #[arg(long)]
    scan_only: bool,

    /// Print --scan-only results as JSON
    #[arg(long, requires = "scan_only")]
    json: bool,

    /// Discovery wait in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,
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
    let explicit_receiver =
        args.receiver.is_some() || std::env::var_os("OSD_RECEIVER_IP").is_some();
    config.sender.apply_env()?;
    apply_args(&mut config, &args);

    if args.list_devices {
        let output = run_to_completion(&list_devices_command(&config.sender.executable)).await?;
        // ffmpeg prints the device list on stderr
        println!("{}", String::from_utf8_lossy(&output.stderr));
        println!(
            "Set sender.screen_index in {} to the video device index above.",
            config_path.display()
        );
        return Ok(());
    }

    if args.scan || args.scan_only {
        config.network.validate()?;
        let peers = discover(config.network.discovery_port, config.network.discovery_timeout())
            .await
            .context("Discovery failed")?;

        if args.scan_only {
            print_peers(&peers, args.json)?;
            return Ok(());
        }

        match scanned_receiver(&peers, explicit_receiver)? {
            Some(first) => {
                if peers.len() > 1 {
                    println!("Found {} receivers, using the first:", peers.len());
                    for peer in &peers {
                        println!("  {}", peer);
                    }
                }
                println!("Selected receiver {}", first);
                config.sender.receiver_ip = first.ip.clone();
            }
            None => {
                tracing::info!(
                    "Receiver {} set explicitly, {} found by scan left unused",
                    config.sender.receiver_ip,
                    peers.len()
                );
            }
        }
    }

    config.validate()?;
    probe_executable(&config.sender.executable)
        .await
        .with_context(|| {
            format!("{} is required to capture the screen", config.sender.executable)
        })?;

    let sender = config.sender.clone();
    tracing::info!(
        "Streaming to {}:{} at {} @ {}fps, {}",
        sender.receiver_ip,
        sender.receiver_port,
        sender.scaling_resolution.as_deref().unwrap_or("native"),
        sender.fps,
        sender.bitrate
    );

    let mut supervisor = StreamSupervisor::new(FfmpegSenderCommand, config.supervisor.clone());
    tokio::spawn(print_events(supervisor.subscribe()));
    supervisor.start(sender)?;

    println!("Press Ctrl+C to stop streaming.");

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            true
        }
        _ = supervisor.join() => false,
    };

    if interrupted {
        println!("Stopping stream...");
        supervisor.shutdown().await;
        println!("Stream stopped.");
        return Ok(());
    }

    let status = supervisor.status();
    bail!(
        "Sender stopped: {}",
        status.last_error.unwrap_or_else(|| status.state.to_string())
    )
}

fn apply_args(config: &mut AppConfig, args: &Args) {
    if let Some(receiver) = &args.receiver {
        config.sender.receiver_ip = receiver.clone();
    }
    if let Some(port) = args.port {
        config.sender.receiver_port = port;
    }
    if let Some(resolution) = &args.resolution {
        config.sender.scaling_resolution =
            (!resolution.eq_ignore_ascii_case("native")).then(|| resolution.clone());
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.network.discovery_timeout_ms = timeout_ms;
    }
}

/// Receiver a `--scan` switches to. An explicit `--receiver` or
/// `OSD_RECEIVER_IP` always wins and yields `None`.
fn scanned_receiver(peers: &[PeerAddress], explicit: bool) -> Result<Option<&PeerAddress>> {
    if explicit {
        return Ok(None);
    }
    match peers.first() {
        Some(first) => Ok(Some(first)),
        None => bail!("No receivers found on the LAN"),
    }
}

fn print_peers(peers: &[PeerAddress], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(peers)?);
    } else if peers.is_empty() {
        println!("No receivers found.");
    } else {
        for peer in peers {
            println!("{}", peer);
        }
    }
    Ok(())
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(state)) => println!("Status: {}", state),
            Ok(SessionEvent::Exited(outcome)) if !outcome.is_clean() => {
                println!("Encoder {}", outcome);
                println!("Retrying shortly...");
            }
            Ok(SessionEvent::LaunchFailed(reason)) => println!("Cannot start encoder: {}", reason),
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}
