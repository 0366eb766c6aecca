//! svrelay: entry point.
//!
//! ```text
//! svrelay                  Relay with ./svrelay.toml (or defaults)
//! svrelay --config <path>  Load a custom config TOML
//! svrelay --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use svrelay::config::RelayConfig;
use svrelay::service::RelayService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "svrelay", about = "Shared-memory frame relay to a strip display")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "svrelay.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (config, source) = RelayConfig::load(&cli.config);
    init_tracing(&config)?;
    source.log(&cli.config);

    info!("svrelay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "producer objects: {} / {} / {}",
        config.channel.map_name, config.channel.event_name, config.channel.lock_name
    );

    let service = RelayService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    if let Err(e) = service.run().await {
        error!("relay failed: {e}");
        return Err(e.into());
    }

    Ok(())
}

/// Log to the configured file, or stderr when none is set.
fn init_tracing(config: &RelayConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
