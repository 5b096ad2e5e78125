/// Field data aggregation for a postal code
///
/// Combines the two location lookups used by postal-code predictions:
/// 1. Soil attributes from the reference table (range match)
/// 2. Current weather from the provider, with the solar estimate attached
/// 3. Merge into a single `FieldData` record
///
/// A location only yields data when both lookups succeed.
use crate::errors::AppError;
use crate::models::{FieldData, PinCode};
use crate::services::WeatherService;
use crate::soil_store::SoilTableStore;

#[derive(Clone)]
pub struct FieldDataAggregator {
    soil: SoilTableStore,
    weather: WeatherService,
}

impl FieldDataAggregator {
    pub fn new(soil: SoilTableStore, weather: WeatherService) -> Self {
        Self { soil, weather }
    }

    /// Gather weather and soil data for a raw postal code.
    ///
    /// Malformed codes are rejected before any lookup. Both lookups always
    /// run; `Ok(None)` means at least one of them found nothing. Weather
    /// failures of any kind count as "nothing found", while an unreadable soil
    /// table is a storage error.
    pub async fn gather(&self, pincode: &str) -> Result<Option<FieldData>, AppError> {
        let pincode = PinCode::parse(pincode)?;
        self.gather_for(pincode).await
    }

    pub async fn gather_for(&self, pincode: PinCode) -> Result<Option<FieldData>, AppError> {
        tracing::info!("Step 1: Looking up soil data for pincode {}", pincode);
        let table = self.soil.current().await?;
        let soil = table.lookup(pincode).cloned();
        match &soil {
            Some(record) => tracing::info!(
                "✓ Soil found for {}: {} ({})",
                pincode,
                record.soil_type,
                record.drainage
            ),
            None => tracing::warn!("No soil range covers pincode {}", pincode),
        }

        tracing::info!("Step 2: Fetching weather for pincode {}", pincode);
        let weather = match self.weather.current_by_pincode(pincode).await {
            Ok(Some(snapshot)) => {
                tracing::info!("✓ Weather found for {}: {}", pincode, snapshot.city);
                Some(snapshot)
            }
            Ok(None) => {
                tracing::warn!("No weather data for pincode {}", pincode);
                None
            }
            Err(e) => {
                tracing::warn!("Weather lookup failed for pincode {}: {}", pincode, e);
                None
            }
        };

        match (weather, soil) {
            (Some(weather), Some(soil)) => {
                tracing::info!("Step 3: Merged field data for pincode {}", pincode);
                Ok(Some(FieldData::merge(weather, soil)))
            }
            (weather, soil) => {
                tracing::warn!(
                    "Incomplete field data for pincode {} (weather: {}, soil: {})",
                    pincode,
                    weather.is_some(),
                    soil.is_some()
                );
                Ok(None)
            }
        }
    }
}
