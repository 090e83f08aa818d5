use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, task::JoinHandle};
use weather_core::{Config, RateLimiter, WeatherGateway};

use crate::http;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-proxy", version, about = "Weather proxy with caller keys and quotas")]
pub struct Cli {
    /// Path to the TOML config file. Defaults to the platform config directory.
    #[arg(long, global = true, env = "WEATHER_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the weather API over HTTP.
    Serve {
        /// Address to bind, overriding `listen_addr` from the config.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Look up the weather once through the full gateway pipeline.
    Lookup {
        /// City name, e.g. "Paris".
        city: String,

        /// Country code, e.g. "fr".
        country: String,

        /// Caller API key to authorize with.
        #[arg(long, env = "WEATHER_PROXY_KEY")]
        key: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        let gateway = Arc::new(WeatherGateway::from_config(&config)?);

        match self.command {
            Command::Serve { listen } => {
                let addr = listen.unwrap_or_else(|| config.listen_addr.clone());
                let cleanup = spawn_usage_cleanup(
                    gateway.rate_limiter().clone(),
                    Duration::from_secs(config.rate_limit.cleanup_interval_secs),
                );

                let listener = TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("Failed to bind {addr}"))?;
                tracing::info!(%addr, "Weather proxy listening");

                axum::serve(listener, http::router(gateway))
                    .with_graceful_shutdown(shutdown_signal())
                    .await
                    .context("HTTP server failed")?;

                cleanup.abort();
                tracing::info!("Weather proxy stopped");
            }
            Command::Lookup { city, country, key } => {
                let record = gateway
                    .handle(&city, &country, &key)
                    .await
                    .with_context(|| format!("Weather lookup for {city}, {country} failed"))?;

                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }

        Ok(())
    }

    fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

/// Periodically drop rate-limit entries whose window has ended.
fn spawn_usage_cleanup(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.purge_stale();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    tracked = limiter.tracked_callers(),
                    "Purged stale rate limit entries"
                );
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
