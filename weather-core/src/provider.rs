use crate::{
    Config, UpstreamError, WeatherRecord, credentials::CredentialPool,
    provider::openweather::OpenWeatherClient,
};
use anyhow::Context;
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;

/// Upstream source of current weather.
///
/// Implementations own any credential rotation they perform; `credential` is the
/// one to try first.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(
        &self,
        city: &str,
        country: &str,
        credential: &str,
    ) -> Result<WeatherRecord, UpstreamError>;
}

/// Construct the OpenWeather provider from config, sharing `credentials` for rotation.
pub fn provider_from_config(
    config: &Config,
    credentials: Arc<CredentialPool>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let client = OpenWeatherClient::new(
        config.upstream.base_url.clone(),
        Duration::from_secs(config.upstream.timeout_secs),
        credentials,
    )
    .context("Failed to build HTTP client for upstream weather provider")?;

    Ok(Arc::new(client))
}
