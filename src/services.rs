use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Coordinate, PinCode, WeatherSnapshot};
use crate::solar::estimate_solar_radiation;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

/// Multiplier applied to the solar estimate before it is reported as a
/// weather attribute. The crop models were trained on values on this scale.
pub const SOLAR_RADIATION_SCALE: f64 = 10.0;

/// Divisor that turns the provider's pressure (hPa) into the reported unit.
pub const PRESSURE_SCALE: f64 = 1000.0;

/// OpenWeatherMap current-weather payload, restricted to the fields we use.
#[derive(Debug, Deserialize)]
struct OwmCurrentResponse {
    coord: OwmCoord,
    weather: Vec<OwmWeather>,
    main: OwmMain,
    wind: OwmWind,
    sys: OwmSys,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OwmCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    country: String,
}

impl OwmCurrentResponse {
    fn into_snapshot(self, date: NaiveDate) -> Result<WeatherSnapshot, AppError> {
        let coordinate = Coordinate::new(self.coord.lat, self.coord.lon)?;

        let description = self
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .ok_or_else(|| {
                AppError::Validation("weather response has an empty 'weather' list".to_string())
            })?;

        if !(0.0..=100.0).contains(&self.main.humidity) {
            return Err(AppError::Validation(format!(
                "humidity {} outside [0, 100]",
                self.main.humidity
            )));
        }
        if self.wind.speed < 0.0 {
            return Err(AppError::Validation(format!(
                "wind speed {} is negative",
                self.wind.speed
            )));
        }

        Ok(WeatherSnapshot {
            coordinate,
            country: self.sys.country,
            city: self.name,
            temp_current: self.main.temp,
            temp_max: self.main.temp_max,
            temp_min: self.main.temp_min,
            humidity: self.main.humidity,
            wind_speed: self.wind.speed,
            description,
            solar_radiation: estimate_solar_radiation(coordinate, date) * SOLAR_RADIATION_SCALE,
            pressure: self.main.pressure / PRESSURE_SCALE,
        })
    }
}

/// Client for the current-weather endpoint, geocoded by postal code.
#[derive(Clone)]
pub struct WeatherService {
    client: Client,
    base_url: String,
    api_key: String,
    country_code: String,
}

impl WeatherService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.weather_base_url.clone(),
            api_key: config.weather_api_key.clone(),
            country_code: config.weather_country_code.clone(),
        }
    }

    /// Fetch current conditions for a postal code.
    ///
    /// Returns `Ok(None)` when the provider answers with a non-success status
    /// (unknown postal code, bad key, rate limit). Network failures are
    /// `Transport` errors; a payload that does not match the documented shape
    /// is a `Validation` error.
    pub async fn current_by_pincode(
        &self,
        pincode: PinCode,
    ) -> Result<Option<WeatherSnapshot>, AppError> {
        let zip = format!("{},{}", pincode, self.country_code);

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &format!("{}/weather", self.base_url),
            &[
                ("zip", zip.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to build weather URL: {}", e)))?;

        tracing::info!("Fetching current weather for pincode: {}", pincode);
        // Redact the key from logs
        tracing::debug!(
            "Weather URL: {}/weather?zip={}&appid=[REDACTED]&units=metric",
            self.base_url,
            zip
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::Transport(format!("Weather API request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                "Weather API returned {} for pincode {}: {}",
                status,
                pincode,
                error_text
            );
            return Ok(None);
        }

        let body = response.text().await.map_err(|e| {
            AppError::Transport(format!("Failed to read weather response: {}", e))
        })?;
        let payload: OwmCurrentResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::Validation(format!("Unexpected weather response shape: {}", e))
        })?;

        let snapshot = payload.into_snapshot(Utc::now().date_naive())?;
        tracing::info!(
            "Weather for pincode {}: {} ({}), {:.1}°C, solar radiation {}",
            pincode,
            snapshot.city,
            snapshot.description,
            snapshot.temp_current,
            snapshot.solar_radiation
        );
        Ok(Some(snapshot))
    }
}
