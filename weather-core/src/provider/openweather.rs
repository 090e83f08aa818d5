use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

use crate::{
    access::redact_key, credentials::CredentialPool, error::UpstreamError, model::WeatherRecord,
};

use super::WeatherProvider;

/// Client for the OpenWeather current weather endpoint.
///
/// A 429 from the provider moves the shared [`CredentialPool`] off the exhausted
/// credential and the request is retried exactly once with whatever credential
/// is then current. Other statuses are final.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialPool>,
}

/// Raw status and body of one upstream exchange.
struct RawResponse {
    status: StatusCode,
    body: String,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<CredentialPool>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
        })
    }

    async fn send(
        &self,
        city: &str,
        country: &str,
        credential: &str,
    ) -> Result<RawResponse, UpstreamError> {
        let location = format!("{city},{country}");

        tracing::debug!(
            city,
            country,
            credential = %redact_key(credential),
            "Requesting current weather from OpenWeather"
        );

        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", location.as_str()),
                ("appid", credential),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        let body = res.text().await.map_err(transport_error)?;

        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch(
        &self,
        city: &str,
        country: &str,
        credential: &str,
    ) -> Result<WeatherRecord, UpstreamError> {
        let mut response = self.send(city, country, credential).await?;

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let rotated = self.credentials.rotate_from(credential);
            tracing::warn!(
                exhausted = %redact_key(credential),
                next = %redact_key(rotated),
                "OpenWeather rate limit hit, switching API key"
            );
            response = self.send(city, country, rotated).await?;
        }

        let RawResponse { status, body } = response;

        if status == StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::Auth {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(UpstreamError::Unavailable {
                status: status.as_u16(),
            });
        }

        parse_current(city, country, &body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
}

/// Validate the body against the expected shape and build the record.
///
/// City and country come from the caller, not from the upstream body.
fn parse_current(city: &str, country: &str, body: &str) -> Result<WeatherRecord, UpstreamError> {
    if body.trim().is_empty() {
        return Err(UpstreamError::Malformed("empty response body".to_string()));
    }

    let parsed: OwCurrentResponse = serde_json::from_str(body).map_err(|e| {
        UpstreamError::Malformed(format!("{e}; body: {}", truncate_body(body)))
    })?;

    let description = parsed
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .ok_or_else(|| UpstreamError::Malformed("`weather` list is empty".to_string()))?;

    Ok(WeatherRecord::new(
        city,
        country,
        description,
        parsed.main.temp,
        parsed.main.humidity,
    ))
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        // The URL carries the credential in its query string.
        UpstreamError::Transport(err.without_url().to_string())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
