use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_WEATHER_BASE_URL: &str = "http://api.openweathermap.org/data/2.5";
pub const DEFAULT_WEATHER_COUNTRY_CODE: &str = "IN";
pub const DEFAULT_SOIL_TABLE_PATH: &str = "data/soil_data.csv";
pub const DEFAULT_PREDICTION_LOG_PATH: &str = "data/status_data.csv";
pub const DEFAULT_MODEL_DIR: &str = "model_artifacts";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub weather_api_key: String,
    pub weather_base_url: String,
    pub weather_country_code: String,
    pub soil_table_path: PathBuf,
    pub prediction_log_path: PathBuf,
    pub model_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Never log the API key
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Weather Base URL: {}", config.weather_base_url);
        tracing::debug!("Weather Country Code: {}", config.weather_country_code);
        tracing::debug!("Soil table: {}", config.soil_table_path.display());
        tracing::debug!("Prediction log: {}", config.prediction_log_path.display());
        tracing::debug!("Model directory: {}", config.model_dir.display());
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: non_empty("PORT")
                .map(|p| p.trim().parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?
                .unwrap_or(DEFAULT_PORT),
            weather_api_key: lookup("OPENWEATHER_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("OPENWEATHER_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("OPENWEATHER_API_KEY cannot be empty");
                    }
                    Ok(key.trim().to_string())
                })?,
            weather_base_url: {
                let url = non_empty("WEATHER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_WEATHER_BASE_URL.to_string())
                    .trim()
                    .trim_end_matches('/')
                    .to_string();
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    anyhow::bail!("WEATHER_BASE_URL must start with http:// or https://");
                }
                url
            },
            weather_country_code: {
                let code = non_empty("WEATHER_COUNTRY_CODE")
                    .unwrap_or_else(|| DEFAULT_WEATHER_COUNTRY_CODE.to_string())
                    .trim()
                    .to_ascii_uppercase();
                if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                    anyhow::bail!("WEATHER_COUNTRY_CODE must be a two-letter country code");
                }
                code
            },
            soil_table_path: non_empty("SOIL_TABLE_PATH")
                .unwrap_or_else(|| DEFAULT_SOIL_TABLE_PATH.to_string())
                .into(),
            prediction_log_path: non_empty("PREDICTION_LOG_PATH")
                .unwrap_or_else(|| DEFAULT_PREDICTION_LOG_PATH.to_string())
                .into(),
            model_dir: non_empty("MODEL_DIR")
                .unwrap_or_else(|| DEFAULT_MODEL_DIR.to_string())
                .into(),
        })
    }
}
