//! Core library for the weather proxy.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - Caller authorization ([`AccessGuard`]) and per-caller quotas ([`RateLimiter`])
//! - The upstream weather provider with credential rotation ([`CredentialPool`])
//! - The [`WeatherGateway`] pipeline tying them together
//!
//! It is used by the `weather-proxy` binary, but can also be embedded in other services.

pub mod access;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod model;
pub mod provider;
pub mod rate_limit;

pub use access::AccessGuard;
pub use config::{Config, RateLimitConfig, UpstreamConfig};
pub use credentials::{CredentialPool, EmptyCredentialPool};
pub use error::{GatewayError, UpstreamError};
pub use gateway::WeatherGateway;
pub use model::WeatherRecord;
pub use provider::{WeatherProvider, openweather::OpenWeatherClient};
pub use rate_limit::{Clock, RateDecision, RateLimiter, SystemClock};
