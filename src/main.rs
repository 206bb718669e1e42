// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/coopcam

//! Coopcam - motion-triggered capture and notify node
//!
//! Runs the monitor node against either a real GPIO line and an external
//! capture command, or (demo mode) a simulated sensor and camera.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use coopcam::camera::{CaptureDevice, CommandCamera, SimulatedCamera};
use coopcam::notify::{CallMeBotNotifier, LogNotifier, Notifier};
use coopcam::sensors::{poll_edges, InputPin, SensorSimulator, SimulatedPin, SysfsPin};
use coopcam::{Config, MonitorNode, WallClock, NAME, VERSION};

/// Coopcam - motion-triggered capture and notify node
#[derive(Parser, Debug)]
#[command(name = "coopcam")]
#[command(version = VERSION)]
#[command(about = "Presence-triggered camera with WhatsApp alerts and a status page")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated sensor and camera
    #[arg(long)]
    demo: bool,

    /// Web server port
    #[arg(long)]
    port: Option<u16>,

    /// Disable the web server
    #[arg(long)]
    no_web: bool,

    /// Disable outbound notifications
    #[arg(long)]
    no_notify: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - motion-triggered capture node", NAME, VERSION);
    let build = coopcam::build_info();
    info!("   {}-{} features: [{}]", build.os, build.target, build.features.join(", "));

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if args.no_web {
        config.web.enabled = false;
    }
    if args.no_notify {
        config.notify.enabled = false;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

fn build_notifier(config: &Config) -> Option<Arc<dyn Notifier>> {
    if !config.notify.enabled {
        info!("Notifications disabled");
        return None;
    }
    if !config.notify.has_credentials() {
        warn!("No CallMeBot credentials configured, alerts go to the log");
        return Some(Arc::new(LogNotifier));
    }
    match CallMeBotNotifier::new(&config.notify) {
        Ok(notifier) => Some(Arc::new(notifier)),
        Err(e) => {
            warn!("CallMeBot client unavailable ({}), alerts go to the log", e);
            Some(Arc::new(LogNotifier))
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let clock = WallClock::new(config.clock.utc_offset_minutes);
    if config.clock.assume_synced {
        clock.mark_synced();
    }
    let notifier = build_notifier(&config);
    let active_level = config.sensor.active_level;

    let node = if config.demo_mode {
        let pin = Arc::new(SimulatedPin::new(config.sensor.pin, active_level.inverted()));
        let camera: Box<dyn CaptureDevice> =
            Box::new(SimulatedCamera::new(config.camera.simulated_failure_rate));

        let node = MonitorNode::new(config.clone(), pin.clone(), camera, notifier, clock.clone()).await?;
        node.start()?;

        let simulator = SensorSimulator::new(pin, node.edge_trigger(), active_level);
        tokio::spawn(simulator.run(node.shutdown_rx()));
        info!("Simulated sensor running on GPIO {}", config.sensor.pin);
        node
    } else {
        let path = config
            .sensor
            .sysfs_path
            .clone()
            .unwrap_or_else(|| SysfsPin::default_path(config.sensor.pin));
        let pin: Arc<dyn InputPin> = Arc::new(SysfsPin::new(config.sensor.pin, path));
        let camera: Box<dyn CaptureDevice> = Box::new(
            CommandCamera::new(&config.camera.command)
                .context("camera.command must be set when demo mode is off")?,
        );

        let node = MonitorNode::new(config.clone(), pin.clone(), camera, notifier, clock.clone()).await?;
        node.start()?;

        tokio::spawn(poll_edges(
            pin,
            node.edge_trigger(),
            config.sensor.poll_interval(),
            node.shutdown_rx(),
        ));
        node
    };

    #[cfg(feature = "web")]
    let web_task = if config.web.enabled {
        let state = coopcam::web::WebState {
            cache: node.cache().clone(),
            store: node.store().clone(),
            clock,
            refresh_secs: config.web.refresh_secs,
        };
        let web_config = config.web.clone();
        let shutdown = node.shutdown_rx();
        Some(tokio::spawn(async move {
            if let Err(e) = coopcam::web::serve(&web_config, state, shutdown).await {
                tracing::error!("{:#}", e);
            }
        }))
    } else {
        None
    };

    info!("{} running - press Ctrl+C to shut down", NAME);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, cleaning up...");

    node.stop().await;

    #[cfg(feature = "web")]
    if let Some(task) = web_task {
        let _ = task.await;
    }

    let stats = node.detector().statistics();
    info!("{} shutdown complete - {} detection(s), {} photo(s)", NAME, stats.detection_count, node.store().photo_count());
    Ok(())
}
