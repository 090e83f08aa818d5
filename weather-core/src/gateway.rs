//! Request pipeline: input check, caller authorization, rate limiting, upstream fetch.

use std::sync::Arc;

use anyhow::Context;

use crate::{
    Config,
    access::{AccessGuard, redact_key},
    credentials::CredentialPool,
    error::{GatewayError, UpstreamError},
    model::WeatherRecord,
    provider::{WeatherProvider, provider_from_config},
    rate_limit::{RateDecision, RateLimiter},
};

#[derive(Debug)]
pub struct WeatherGateway {
    guard: AccessGuard,
    limiter: Arc<RateLimiter>,
    credentials: Arc<CredentialPool>,
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherGateway {
    pub fn new(
        guard: AccessGuard,
        limiter: Arc<RateLimiter>,
        credentials: Arc<CredentialPool>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            guard,
            limiter,
            credentials,
            provider,
        }
    }

    /// Wire every component from a validated config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let credentials = Arc::new(
            CredentialPool::new(config.upstream_api_keys())
                .context("Failed to initialize upstream credential pool")?,
        );
        let guard = AccessGuard::new(config.allowed_api_keys.iter().cloned());
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let provider = provider_from_config(config, credentials.clone())?;

        tracing::info!(
            allowed_keys = guard.len(),
            upstream_keys = credentials.len(),
            max_requests = config.rate_limit.max_requests,
            window_secs = config.rate_limit.window_secs,
            "Weather gateway initialized"
        );

        Ok(Self::new(guard, limiter, credentials, provider))
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolve current weather for `city`/`country` on behalf of `caller_key`.
    ///
    /// Steps short-circuit on the first failure; the upstream is only contacted
    /// for authorized callers that are within their quota.
    pub async fn handle(
        &self,
        city: &str,
        country: &str,
        caller_key: &str,
    ) -> Result<WeatherRecord, GatewayError> {
        let caller = redact_key(caller_key);
        let city = city.trim();
        let country = country.trim();

        if city.is_empty() || country.is_empty() {
            tracing::warn!(%caller, city, country, "Rejected request without city or country");
            return Err(GatewayError::InvalidInput(
                "City and country are required.".to_string(),
            ));
        }

        if !self.guard.validate(caller_key) {
            tracing::warn!(%caller, city, country, "Unauthorized API key");
            return Err(GatewayError::Unauthorized);
        }

        if let RateDecision::Limited { retry_after } = self.limiter.check_and_record(caller_key) {
            tracing::warn!(
                %caller,
                city,
                country,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded for API key"
            );
            return Err(GatewayError::TooManyRequests { retry_after });
        }

        let credential = self.credentials.current();

        match self.provider.fetch(city, country, credential).await {
            Ok(record) => {
                tracing::info!(%caller, city, country, "Served weather");
                Ok(record)
            }
            Err(err) => {
                match &err {
                    UpstreamError::Auth { status } => tracing::error!(
                        %caller,
                        city,
                        country,
                        status,
                        "Upstream rejected our API key; check `upstream.api_keys`"
                    ),
                    UpstreamError::Unavailable { status } => tracing::error!(
                        %caller,
                        city,
                        country,
                        status,
                        "Failed to fetch weather"
                    ),
                    _ => tracing::error!(
                        %caller,
                        city,
                        country,
                        error = %err,
                        "Failed to fetch weather"
                    ),
                }
                Err(err.into())
            }
        }
    }
}
