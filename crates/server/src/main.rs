//! yubiswitch helper
//!
//! Privileged service that disables a hardware token's keyboard interface
//! on request and re-enables it later. Controlled over a local Unix socket.

use anyhow::{Context, Result};
use clap::Parser;
use common::{create_controller_bridge, setup_logging};
use server::config::HelperConfig;
use server::controller::HidUsage;
use server::ipc::IpcServer;
use server::usb::{UsbCapability, device};
use server::{lifecycle, service, worker};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "yubiswitch-helper")]
#[command(
    author,
    version,
    about = "yubiswitch helper - take a hardware token's keyboard away and give it back"
)]
#[command(long_about = "
Privileged helper that holds a YubiKey-style token's keyboard interface
exclusively while disabled, so it cannot type OTP strings, and releases it
when enabled again. Callers send Enable / Disable requests over a local
Unix socket and always receive \"OK\".

EXAMPLES:
    # Run with default config
    yubiswitch-helper

    # Run with a custom socket location
    yubiswitch-helper --socket /tmp/yubiswitch.sock

    # List keyboard-class USB devices without starting the helper
    yubiswitch-helper --list-devices

    # Run with debug logging
    yubiswitch-helper --log-level debug

CONFIGURATION:
    The helper looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/yubiswitch-helper/helper.toml
    3. /etc/yubiswitch-helper/helper.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Control socket path (overrides the configuration file)
    #[arg(short, long, value_name = "PATH")]
    socket: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List keyboard-class USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HelperConfig::default();
        let path = HelperConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let (mut config, config_source) = if let Some(ref path) = args.config {
        let config =
            HelperConfig::load(Some(path.clone())).context("Failed to load configuration")?;
        (config, Some(path.clone()))
    } else {
        HelperConfig::load_or_default(&HelperConfig::candidate_paths())
            .context("Failed to load configuration")?
    };

    if let Some(socket) = args.socket {
        config.server.socket_path = socket;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("yubiswitch helper v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);
    match config_source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root; claiming USB interfaces will likely fail");
    }

    if args.list_devices {
        return list_devices_mode();
    }

    run(config).await
}

/// Print attached devices that expose a keyboard or mouse usage
fn list_devices_mode() -> Result<()> {
    let capability = UsbCapability::new().context("Failed to initialize libusb")?;
    let devices = capability
        .list_hid_devices()
        .context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No HID keyboard or mouse devices found.");
        return Ok(());
    }

    println!("Found {} HID device(s):\n", devices.len());
    for (usb_device, identity) in devices {
        let (manufacturer, product) = device::read_strings(&usb_device);
        println!(
            "  {:04x}:{:04x} - {} {}",
            identity.vendor_id,
            identity.product_id,
            manufacturer.as_deref().unwrap_or("Unknown Manufacturer"),
            product.as_deref().unwrap_or("Unknown Product")
        );
        let usages: Vec<&str> = identity
            .usages
            .iter()
            .map(|usage| match *usage {
                HidUsage::KEYBOARD => "keyboard",
                HidUsage::MOUSE => "mouse",
                _ => "other",
            })
            .collect();
        println!(
            "      {}  usages: {}",
            identity.location,
            usages.join(", ")
        );
        println!(
            "      disable with: id_vendor={} id_product={}",
            identity.vendor_id, identity.product_id
        );
        println!();
    }

    Ok(())
}

async fn run(config: HelperConfig) -> Result<()> {
    let socket_path = config.server.socket_path()?;
    let socket_mode = config.server.socket_mode()?;

    if service::is_systemd() {
        info!("Running under systemd");
    }

    // Installed before serving so an early SIGTERM still runs the teardown
    let mut signals = lifecycle::TerminationSignals::install()?;

    let (bridge, worker) = create_controller_bridge();

    let server = IpcServer::bind(&socket_path, socket_mode, bridge.clone()).with_context(|| {
        format!(
            "Failed to create IPC endpoint at {}",
            socket_path.display()
        )
    })?;

    let capability = UsbCapability::new().context("Failed to initialize libusb")?;
    let worker_handle =
        worker::spawn_controller_worker(worker, capability, config.usb.event_tick())
            .context("Failed to spawn controller worker thread")?;

    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status("Running - waiting for requests")
        .context("Failed to send status to systemd")?;

    let server_handle = tokio::spawn(server.run());

    signals.wait().await;

    if let Err(e) = service::notify_stopping() {
        warn!("Failed to notify systemd stopping: {:#}", e);
    }

    if let Err(e) = lifecycle::teardown(&bridge).await {
        error!("Error shutting down device controller: {:#}", e);
    }

    // Dropping the server closes open connections and removes the socket
    server_handle.abort();
    let _ = server_handle.await;

    if let Err(e) = worker_handle.join() {
        error!("Controller worker thread panicked: {:?}", e);
    }

    info!("Helper shutdown complete");
    Ok(())
}
