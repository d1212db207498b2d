//! camfleet CLI - camera fleet supervisor
//!
//! Usage:
//!   camfleet serve [--port 8080] [--cameras 2]   Run the supervisor and HTTP API
//!   camfleet config                              Print a sample config file
//!   camfleet config --write [--config PATH]      Write the default config file

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use camfleet_core::usb::UsbReset;
use camfleet_core::{Config, InterfaceReset};
use camfleet_daemon::{serve, spawn_management_thread, FleetState, SimBank};

#[derive(Parser)]
#[command(name = "camfleet")]
#[command(about = "Multi-camera fleet supervisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the fleet and serve the HTTP control surface
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<IpAddr>,

        /// Directory clips are downloaded into
        #[arg(long)]
        download_path: Option<PathBuf>,

        /// Preset file
        #[arg(long)]
        preset: Option<PathBuf>,

        /// Config file (default: platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of simulated cameras
        #[arg(long, default_value = "2")]
        cameras: usize,

        /// Reset matching USB devices through usbfs instead of the driver
        #[arg(long)]
        usb_reset: bool,
    },

    /// Print a sample configuration file
    Config {
        /// Write the default configuration instead of printing it
        #[arg(long)]
        write: bool,

        /// Config file to write (default: platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            download_path,
            preset,
            config,
            cameras,
            usb_reset,
        } => {
            let mut config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load(),
            };
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(dir) = download_path {
                config.transfer.download_dir = dir;
            }
            if let Some(path) = preset {
                config.preset.path = path;
            }
            run_serve(config, cameras, usb_reset).await?;
        }
        Commands::Config { write: false, .. } => {
            print!("{}", Config::sample());
        }
        Commands::Config { write: true, config } => {
            let path = Config::write_default(config.as_deref())?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

async fn run_serve(
    config: Config,
    cameras: usize,
    usb_reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::new(config.server.bind, config.server.port);

    let bank = Arc::new(SimBank::with_cameras(cameras, &config.fleet.model_filter));
    let reset: Arc<dyn InterfaceReset> = if usb_reset {
        if !UsbReset::is_supported() {
            warn!("USB reset is not available on this platform");
        }
        Arc::new(UsbReset::new(
            config.fleet.usb_vendor_id,
            config.fleet.usb_product_id,
        ))
    } else {
        bank.clone()
    };

    info!("Starting camfleet");
    info!("  Simulated cameras: {}", cameras);
    info!("  Download path: {:?}", config.transfer.download_dir);
    info!("  Preset: {:?}", config.preset.path);

    let fleet = FleetState::new(config, bank, Some(reset))?;
    let management = spawn_management_thread(Arc::clone(&fleet))?;

    let served = serve(Arc::clone(&fleet), addr, async {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
        }
    })
    .await;

    fleet.stop();
    tokio::task::spawn_blocking(move || {
        if management.join().is_err() {
            warn!("Management thread panicked");
        }
        fleet.shutdown();
    })
    .await?;

    served?;
    info!("Server stopped");
    Ok(())
}
