use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stockbot::api::{AlpacaClient, Brokerage, LiveBarStream, TradeUpdateStream};
use stockbot::config::Settings;
use stockbot::execution::{
    run_polling_loop, AccountMonitor, BarRouter, MarketHours, OrderDispatcher, PollingConfig,
    SignalEngine, TradeLedger,
};
use stockbot::registry::{load_instruments, InstrumentRegistry};
use stockbot::VenueError;
use stockbot::server::{self, AppState};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "stockbot", about = "SMA crossover trading agent for Alpaca")]
struct Args {
    /// Settings file (TOML); defaults to config/stockbot.toml if present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument list CSV (Symbol,Quantity)
    #[arg(long)]
    instruments: Option<PathBuf>,

    /// Status server port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 StockBot starting");

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = args.instruments {
        settings.instruments_path = path;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    settings.validate().context("Invalid settings")?;

    let client = AlpacaClient::new(settings.alpaca_config()).context("Failed to build Alpaca client")?;
    let broker: Arc<dyn Brokerage> = Arc::new(client);

    let hours = Arc::new(MarketHours::new(
        broker.clone(),
        Duration::from_secs(settings.polling.clock_ttl_secs),
    ));
    let clock = hours
        .refresh()
        .await
        .context("Failed to read market clock")?;
    if !clock.is_open {
        if settings.require_open_market {
            bail!(
                "Market is closed (next open {}); not starting",
                clock.next_open.to_rfc3339()
            );
        }
        tracing::warn!("Market is closed; bars will be discarded until {}", clock.next_open);
    }

    let specs = load_instruments(&settings.instruments_path).with_context(|| {
        format!(
            "Failed to load instruments from {}",
            settings.instruments_path.display()
        )
    })?;
    let registry = Arc::new(
        InstrumentRegistry::initialize(broker.as_ref(), &specs, settings.seed_config())
            .await
            .context("Failed to initialize instrument registry")?,
    );

    let account = Arc::new(AccountMonitor::new(broker.clone(), settings.baseline_equity));
    match account.refresh().await {
        Ok(snapshot) => tracing::info!(
            "💰 Equity ${:.2}, buying power ${:.2}",
            snapshot.equity,
            snapshot.buying_power
        ),
        Err(e) => tracing::warn!("Failed to read account: {}", e),
    }

    let ledger = TradeLedger::new();
    let dispatcher = OrderDispatcher::new(
        broker.clone(),
        ledger.clone(),
        Duration::from_secs(settings.execution.dispatch_timeout_secs),
    );
    let engine = Arc::new(SignalEngine::new(hours.clone(), dispatcher));
    let (router, _workers) =
        BarRouter::spawn(registry.clone(), engine, settings.execution.queue_capacity);

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Resolution: {}", settings.strategy.resolution);
    tracing::info!(
        "  Windows: short {} / long {}",
        settings.strategy.short_window,
        settings.strategy.long_window
    );
    tracing::info!("  Instruments: {}", registry.len());
    tracing::info!("  Trading endpoint: {}", settings.alpaca_config().trading_url);

    tracing::info!("\n🔄 Spawning loops...");

    let polling_task = {
        let broker = broker.clone();
        let registry = registry.clone();
        let router = router.clone();
        let hours = hours.clone();
        let account = account.clone();
        let config = PollingConfig {
            interval: Duration::from_secs(settings.polling.interval_secs),
            window: Duration::from_secs(settings.polling.window_secs),
        };
        tokio::spawn(async move {
            run_polling_loop(broker, registry, router, hours, account, config).await;
        })
    };

    let live_bars = settings.strategy.resolution == LiveBarStream::RESOLUTION;
    let stream_task = if live_bars {
        let stream = LiveBarStream::new(settings.bar_stream_config(), registry.symbols());
        let (tx, rx) = mpsc::channel(settings.execution.queue_capacity.max(1));
        let router = router.clone();
        tokio::spawn(async move {
            tokio::spawn(async move { router.forward(rx, LiveBarStream::RESOLUTION).await });
            stream.run(tx).await
        })
    } else {
        tracing::info!(
            "Live bars are {}; {} bars come from polling only",
            LiveBarStream::RESOLUTION,
            settings.strategy.resolution
        );
        tokio::spawn(std::future::pending::<Result<(), VenueError>>())
    };

    let trade_updates_task = {
        let stream = TradeUpdateStream::new(settings.trade_stream_config());
        tokio::spawn(async move { stream.run().await })
    };

    let server_task = {
        let state = AppState {
            registry: registry.clone(),
            ledger: ledger.clone(),
            hours: hours.clone(),
            account: account.clone(),
        };
        let port = settings.server.port;
        let static_dir = settings.server.static_dir.clone();
        tokio::spawn(async move { server::run(state, port, static_dir).await })
    };

    tracing::info!("✅ All loops spawned successfully");
    if live_bars {
        tracing::info!("  📡 Live bars: {}", settings.alpaca.stream_url);
    }
    tracing::info!("  🔄 Polling: every {}s", settings.polling.interval_secs);
    tracing::info!("  🌐 Status server: port {}", settings.server.port);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = polling_task => {
            tracing::error!("Polling loop exited: {:?}", result);
        }
        result = stream_task => {
            tracing::error!("Live bar stream exited: {:?}", result);
        }
        result = server_task => {
            tracing::error!("Status server exited: {:?}", result);
        }
        result = trade_updates_task => {
            tracing::error!("Trade update stream exited: {:?}", result);
        }
    }

    tracing::info!("👋 StockBot stopped ({} trades this session)", ledger.len());
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stockbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
