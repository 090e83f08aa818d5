use serde::Serialize;

/// Normalized current-weather observation for a city.
///
/// Only the upstream provider builds these, and only from a response that passed
/// structural validation, so every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherRecord {
    city: String,
    country: String,
    description: String,
    #[serde(rename = "temperature")]
    temperature_c: f64,
    #[serde(rename = "humidity")]
    humidity_pct: f64,
}

impl WeatherRecord {
    pub(crate) fn new(
        city: impl Into<String>,
        country: impl Into<String>,
        description: impl Into<String>,
        temperature_c: f64,
        humidity_pct: f64,
    ) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
            description: description.into(),
            temperature_c,
            humidity_pct,
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> f64 {
        self.humidity_pct
    }
}
