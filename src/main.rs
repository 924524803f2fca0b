use anyhow::Result;
use clap::Parser;
use interscribe::asr::engine::HttpRecognizer;
use interscribe::cli::{Cli, Commands};
use interscribe::config::Config;
use interscribe::{Recognizer, server};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Devices) => {
            list_capture_devices()?;
        }
        Some(Commands::Serve) | None => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(listen) = cli.listen {
                config.server.listen = listen;
            }
            let recognizer: Arc<dyn Recognizer> =
                Arc::new(HttpRecognizer::new(config.asr.engine_url.clone()));
            server::serve(config, recognizer).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "interscribe={},tower_http=info",
            default_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/interscribe/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top in every case.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };
    Ok(config.with_env_overrides())
}

#[cfg(feature = "capture")]
fn list_capture_devices() -> Result<()> {
    let devices = interscribe::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio capture devices found");
        std::process::exit(1);
    }

    println!("Available capture devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}

#[cfg(not(feature = "capture"))]
fn list_capture_devices() -> Result<()> {
    eprintln!("This build has no 'capture' feature; server-side system audio is unavailable");
    Ok(())
}
