use anyhow::{Context, Result};
use clap::Parser;
use hashswitch::config::{Args, Config};
use hashswitch::logging::{init_logging, LogConfig};
use hashswitch::miner::ProcessSupervisor;
use hashswitch::pool::HttpQuoteOracle;
use hashswitch::profit::HttpPriceOracle;
use hashswitch::SwitchController;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// HTTP 报价/汇率请求超时
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };

    let log_config = LogConfig::from_general(&config.general, args.log_level.as_deref());
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Starting {} v{}", hashswitch::NAME, hashswitch::VERSION);
    info!("Configuration loaded from: {}", args.config);

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, config: Config) -> Result<()> {
    let quote_oracle = HttpQuoteOracle::new(HTTP_TIMEOUT).context("Failed to build quote client")?;
    let price_oracle = HttpPriceOracle::new(config.price.url.clone(), HTTP_TIMEOUT)
        .context("Failed to build price client")?;
    let supervisor = ProcessSupervisor::new(&config.status);

    let mut controller =
        SwitchController::new(config, supervisor, Arc::new(quote_oracle), Arc::new(price_oracle));

    let outcome = tokio::select! {
        result = controller.run(args.force_benchmark, args.benchmark_only) => {
            result.context("Switch controller failed")
        }
        signal = shutdown_signal() => {
            info!("Received {}, shutting down", signal);
            Ok(())
        }
    };

    if let Err(e) = controller.shutdown().await {
        error!("Error during shutdown: {}", e);
    }
    info!("Stopped");
    outcome
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "Ctrl-C",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                "Ctrl-C"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}
