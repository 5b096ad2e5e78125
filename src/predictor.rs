//! Crop models and the registry that resolves a crop name to its model.
//!
//! Each crop is scored by a linear model stored as a JSON artifact:
//!
//! ```json
//! {
//!   "intercept": 12.5,
//!   "coefficients": { "Upper_Temperature": 0.8, "Rainfall": -0.4 },
//!   "categories": { "Soil Type": { "Sandy": 6.0, "Clay": -3.0 } }
//! }
//! ```
//!
//! Attribute names must be drawn from [`ATTRIBUTE_NAMES`]; numeric attributes
//! go under `coefficients`, categorical ones under `categories`. Attributes
//! omitted from the artifact contribute nothing, as does a category level the
//! artifact has no weight for.

use crate::errors::{AppError, ResultExt};
use crate::models::{Crop, FeatureRecord, FeatureValue, ATTRIBUTE_NAMES};
use crate::solar::round2;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Anything that turns a feature record into a predicted water volume.
pub trait IrrigationModel: Send + Sync {
    fn score(&self, features: &FeatureRecord) -> f64;
}

/// Linear scoring model loaded from a JSON artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearModel {
    intercept: f64,
    #[serde(default)]
    coefficients: BTreeMap<String, f64>,
    #[serde(default)]
    categories: BTreeMap<String, BTreeMap<String, f64>>,
}

impl LinearModel {
    /// Parses and validates an artifact.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let model: LinearModel = serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("invalid model artifact: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading model artifact {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("loading {}", path.display()))
    }

    fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: String| Err(AppError::Validation(msg));

        if !self.intercept.is_finite() {
            return invalid("intercept must be finite".to_string());
        }
        for (name, weight) in &self.coefficients {
            if !ATTRIBUTE_NAMES.contains(&name.as_str()) {
                return invalid(format!("unknown attribute '{}'", name));
            }
            if FeatureRecord::is_categorical(name) {
                return invalid(format!("'{}' is categorical; weight it under 'categories'", name));
            }
            if !weight.is_finite() {
                return invalid(format!("coefficient for '{}' must be finite", name));
            }
        }
        for (name, levels) in &self.categories {
            if !ATTRIBUTE_NAMES.contains(&name.as_str()) {
                return invalid(format!("unknown attribute '{}'", name));
            }
            if !FeatureRecord::is_categorical(name) {
                return invalid(format!("'{}' is numeric; weight it under 'coefficients'", name));
            }
            if let Some((level, _)) = levels.iter().find(|(_, w)| !w.is_finite()) {
                return invalid(format!("weight for '{}' = '{}' must be finite", name, level));
            }
        }
        Ok(())
    }
}

impl IrrigationModel for LinearModel {
    fn score(&self, features: &FeatureRecord) -> f64 {
        features
            .attributes()
            .into_iter()
            .fold(self.intercept, |acc, (name, value)| match value {
                FeatureValue::Number(n) => acc + self.coefficients.get(name).map_or(0.0, |w| w * n),
                FeatureValue::Category(level) => {
                    acc + self
                        .categories
                        .get(name)
                        .and_then(|levels| levels.get(level))
                        .copied()
                        .unwrap_or(0.0)
                }
            })
    }
}

/// Crop to model mapping, built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<Crop, Arc<dyn IrrigationModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{dir}/{crop}.json` for every known crop.
    ///
    /// Crops without an artifact are left out with a warning. An invalid
    /// artifact, or a directory with no artifacts at all, is an error.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref();
        let mut registry = Self::new();

        for crop in Crop::ALL {
            let path = dir.join(crop.artifact_file_name());
            if !path.is_file() {
                tracing::warn!("No model artifact for {} at {}", crop, path.display());
                continue;
            }
            let model = LinearModel::load(&path)?;
            tracing::info!("✓ Loaded model for {} from {}", crop, path.display());
            registry = registry.with_model(crop, model);
        }

        if registry.models.is_empty() {
            return Err(AppError::Storage(format!(
                "no model artifacts found in {}",
                dir.display()
            )));
        }
        Ok(registry)
    }

    pub fn with_model(mut self, crop: Crop, model: impl IrrigationModel + 'static) -> Self {
        self.models.insert(crop, Arc::new(model));
        self
    }

    /// Crops that have a model, in declaration order.
    pub fn crops(&self) -> Vec<Crop> {
        Crop::ALL
            .into_iter()
            .filter(|crop| self.models.contains_key(crop))
            .collect()
    }

    /// Predicted irrigation requirement for `crop`, rounded to two decimals.
    pub fn predict(&self, crop: &str, features: &FeatureRecord) -> Result<f64, AppError> {
        let crop: Crop = crop.parse()?;
        let model = self
            .models
            .get(&crop)
            .ok_or_else(|| AppError::UnknownCrop(crop.to_string()))?;

        let water = round2(model.score(features));
        tracing::info!("Predicted {} mm of water for {}", water, crop);
        Ok(water)
    }
}
