use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use volumebot::api::{BinanceClient, SimulatedExchange, SimulatedExchangeConfig};
use volumebot::config::{validate, ExchangeKind, ExchangeSettings, RawConfig, VolumeConfig};
use volumebot::{Exchange, Result, VolumeEngine};

/// Generate paced trading volume along a configured price walk
#[derive(Parser, Debug)]
#[command(name = "volumebot", version, about)]
struct Cli {
    /// Optional config file (TOML/YAML/JSON); environment variables override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many hours instead of running until Ctrl+C
    #[arg(long, value_name = "HOURS")]
    duration_hours: Option<f64>,

    /// Force dry-run mode regardless of configuration
    #[arg(long)]
    dry_run: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    tracing::info!("🚀 VolumeBot starting");

    let raw = RawConfig::load(cli.config.as_deref())?;
    let mut settings = match validate(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration rejected:");
            for violation in &e.violations {
                tracing::error!("  - {}", violation);
            }
            return Err(e.into());
        }
    };

    if cli.dry_run {
        settings.volume.dry_run = true;
    }

    for warning in &settings.warnings {
        tracing::warn!("⚠️  {}", warning);
    }

    tracing::info!(
        "  Exchange: {} ({}){}",
        settings.exchange.kind.name(),
        settings.exchange.trading_pair,
        if settings.exchange.sandbox { " [sandbox]" } else { "" }
    );
    settings.volume.log_summary();

    if cli.check_config {
        tracing::info!("✅ Configuration is valid");
        return Ok(());
    }

    let duration = match cli.duration_hours {
        Some(hours) if hours.is_finite() && hours > 0.0 => {
            Some(std::time::Duration::from_secs_f64(hours * 3600.0))
        }
        Some(hours) => return Err(format!("--duration-hours must be positive, got {}", hours).into()),
        None => None,
    };

    let exchange = build_exchange(&settings.exchange, &settings.volume)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("\n⚠️  Received Ctrl+C, finishing current cycle..."),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    if duration.is_none() {
        tracing::info!("\nPress Ctrl+C to stop...\n");
    }

    let mut engine = VolumeEngine::new(
        settings.volume,
        exchange,
        settings.exchange.trading_pair.clone(),
    );
    engine.run(shutdown_rx, duration).await?;

    tracing::info!("👋 VolumeBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("volumebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_exchange(
    settings: &ExchangeSettings,
    volume: &VolumeConfig,
) -> anyhow::Result<Arc<dyn Exchange>> {
    match settings.kind {
        ExchangeKind::Binance => {
            let client = BinanceClient::new(
                settings.api_key.clone(),
                settings.api_secret.clone(),
                settings.sandbox,
            )?;
            Ok(Arc::new(client))
        }
        ExchangeKind::Simulated => {
            let mut config = SimulatedExchangeConfig::default();
            if let Some(seed) = volume.rng_seed {
                config.seed = seed;
            }
            Ok(Arc::new(SimulatedExchange::new(config)))
        }
    }
}
