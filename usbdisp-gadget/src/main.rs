//! USB display gadget — entry point.
//!
//! ```text
//! usbdisp-gadget                     Receive chunks over UDP
//! usbdisp-gadget --replay <path>     Play back a recorded chunk stream
//! usbdisp-gadget --listen <addr>     UDP address to receive on
//! usbdisp-gadget --config <path>     Load a custom config TOML
//! usbdisp-gadget --dump <path>       Write the final surface to a file
//! usbdisp-gadget --gen-config        Write default config to stdout
//! usbdisp-gadget --gen-demo <path>   Write a test-pattern replay file
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use usbdisp_gadget::config::{GadgetConfig, LoggingConfig, TransportKind};
use usbdisp_gadget::demo;
use usbdisp_gadget::service::GadgetService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "usbdisp-gadget", about = "USB display gadget service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "usbdisp-gadget.toml")]
    config: PathBuf,

    /// Replay a recorded chunk stream instead of listening.
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// UDP address to receive chunks on (overrides config).
    #[arg(short, long)]
    listen: Option<String>,

    /// Write the final surface to this file.
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write a test-pattern replay file for the configured panel and exit.
    #[arg(long, value_name = "PATH")]
    gen_demo: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&GadgetConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = GadgetConfig::load(&cli.config);
    if let Some(path) = cli.replay {
        config.transport.kind = TransportKind::Replay;
        config.transport.replay_path = path.display().to_string();
    }
    if let Some(addr) = cli.listen {
        config.transport.kind = TransportKind::Udp;
        config.transport.listen = addr;
    }
    if let Some(path) = cli.dump {
        config.output.dump_path = path.display().to_string();
    }

    init_tracing(&config.logging)?;
    info!("usbdisp-gadget v{}", env!("CARGO_PKG_VERSION"));

    // --gen-demo: write a replay file and exit.
    if let Some(path) = cli.gen_demo {
        let chunks = demo::write_pattern(
            &path,
            config.display.width,
            config.display.height,
            config.protocol.header_byte_order,
        )
        .await?;
        info!("wrote {chunks} chunks to {}", path.display());
        return Ok(());
    }

    info!("panel: {}x{}", config.display.width, config.display.height);
    info!("ring slots: {}", config.ring.slots);

    let service = GadgetService::new(config.clone());
    let stop = service.stop_handle();

    // Ctrl-C handler.
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let report = match service.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("service failed: {e}");
            return Err(e.into());
        }
    };

    if config.output.stats_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new().create(true).append(true).open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
