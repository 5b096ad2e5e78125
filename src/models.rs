use crate::errors::AppError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ============ Location ============

/// Geographic coordinate reported by the weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    #[serde(rename = "lat")]
    latitude: f64,
    #[serde(rename = "lon")]
    longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting values outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Validation(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Validation(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Postal code (Indian PIN code) used for soil range lookup and weather geocoding.
///
/// Accepts either a JSON number or a string of digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPinCode", into = "u32")]
pub struct PinCode(u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPinCode {
    Number(u64),
    Text(String),
}

fn pincode_regex() -> &'static Regex {
    static PINCODE: OnceLock<Regex> = OnceLock::new();
    PINCODE.get_or_init(|| Regex::new(r"^\d{1,9}$").expect("static pincode pattern"))
}

impl PinCode {
    /// Parses a postal code from user input.
    ///
    /// Surrounding whitespace is ignored; anything other than digits is a
    /// validation error.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if !pincode_regex().is_match(trimmed) {
            tracing::warn!("Rejected malformed pincode: {:?}", raw);
            return Err(AppError::Validation(format!(
                "pincode must be a non-negative integer, got {:?}",
                raw
            )));
        }
        trimmed
            .parse::<u32>()
            .map(PinCode)
            .map_err(|e| AppError::Validation(format!("invalid pincode {:?}: {}", raw, e)))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PinCode {
    fn from(value: u32) -> Self {
        PinCode(value)
    }
}

impl From<PinCode> for u32 {
    fn from(pincode: PinCode) -> Self {
        pincode.0
    }
}

impl TryFrom<RawPinCode> for PinCode {
    type Error = AppError;

    fn try_from(raw: RawPinCode) -> Result<Self, Self::Error> {
        match raw {
            RawPinCode::Number(n) => u32::try_from(n)
                .map(PinCode)
                .map_err(|_| AppError::Validation(format!("pincode {} out of range", n))),
            RawPinCode::Text(text) => PinCode::parse(&text),
        }
    }
}

impl fmt::Display for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PinCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PinCode::parse(s)
    }
}

// ============ Field Data ============

/// One row of the soil reference table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoilRecord {
    #[serde(skip)]
    pub pincode_start: u32,
    #[serde(skip)]
    pub pincode_end: u32,
    pub soil_type: String,
    pub drainage: String,
    #[serde(rename = "infiltration")]
    pub infiltration_rate: f64,
    pub wilting_point: f64,
    pub field_capacity: f64,
}

impl SoilRecord {
    /// Whether the record's inclusive range covers `pincode`.
    pub fn covers(&self, pincode: PinCode) -> bool {
        (self.pincode_start..=self.pincode_end).contains(&pincode.value())
    }

    /// Checks the record's internal invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.pincode_start > self.pincode_end {
            return Err(format!(
                "pincode_start {} greater than pincode_end {}",
                self.pincode_start, self.pincode_end
            ));
        }
        for (name, value) in [
            ("infiltration", self.infiltration_rate),
            ("wilting_point", self.wilting_point),
            ("field_capacity", self.field_capacity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if self.field_capacity <= self.wilting_point {
            return Err(format!(
                "field_capacity {} must exceed wilting_point {}",
                self.field_capacity, self.wilting_point
            ));
        }
        Ok(())
    }
}

/// Current conditions for a postal code, normalized from the provider response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    #[serde(rename = "coordinates")]
    pub coordinate: Coordinate,
    pub country: String,
    pub city: String,
    #[serde(rename = "temp")]
    pub temp_current: f64,
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(rename = "weather_description")]
    pub description: String,
    pub solar_radiation: f64,
    pub pressure: f64,
}

/// Weather and soil data for one location, merged for a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub weather: WeatherSnapshot,
    pub soil: SoilRecord,
}

impl FieldData {
    pub fn merge(weather: WeatherSnapshot, soil: SoilRecord) -> Self {
        Self { weather, soil }
    }

    /// Flattened attribute view of the merged record.
    ///
    /// Soil attributes are applied after weather attributes, so a soil value
    /// replaces a weather value published under the same name.
    pub fn attributes(&self) -> Map<String, Value> {
        overlay(object_of(&self.weather), object_of(&self.soil))
    }
}

fn object_of<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Union of two attribute maps where `top` wins on key collision.
///
/// `WeatherSnapshot` and `SoilRecord` serialize to disjoint key sets, so
/// this rule is the only place soil-over-weather precedence is expressed.
pub(crate) fn overlay(mut base: Map<String, Value>, top: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in top {
        base.insert(key, value);
    }
    base
}

// ============ Prediction Inputs ============

/// Model attribute names, in the column order the models were trained on.
pub const ATTRIBUTE_NAMES: [&str; 19] = [
    "Upper_Temperature",
    "Lower_Temperature",
    "Humidity",
    "Rainfall",
    "Wind Speed",
    "Solar Radiation",
    "Soil Type",
    "Soil Moisture Content",
    "Infiltration Rate",
    "Field Capacity",
    "Wilting Point",
    "Growth Stage",
    "Root Depth",
    "Crop Coefficient",
    "Water Availability",
    "Irrigation System Efficiency",
    "Water Quality",
    "Slope",
    "Drainage Conditions",
];

/// A single model input value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Number(f64),
    Category(&'a str),
}

/// The full set of agronomic and environmental inputs scored by a crop model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub upper_temperature: f64,
    pub lower_temperature: f64,
    pub humidity: f64,
    pub rainfall: f64,
    pub wind_speed: f64,
    pub solar_radiation: f64,
    pub soil_type: String,
    pub soil_moisture_content: f64,
    pub infiltration_rate: f64,
    pub field_capacity: f64,
    pub wilting_point: f64,
    pub growth_stage: String,
    pub root_depth: f64,
    pub crop_coefficient: f64,
    pub water_availability: String,
    pub irrigation_system_efficiency: f64,
    pub water_quality: String,
    pub slope: f64,
    pub drainage_conditions: String,
}

impl FeatureRecord {
    /// Named attributes in `ATTRIBUTE_NAMES` order.
    pub fn attributes(&self) -> [(&'static str, FeatureValue<'_>); 19] {
        use FeatureValue::{Category, Number};
        [
            (ATTRIBUTE_NAMES[0], Number(self.upper_temperature)),
            (ATTRIBUTE_NAMES[1], Number(self.lower_temperature)),
            (ATTRIBUTE_NAMES[2], Number(self.humidity)),
            (ATTRIBUTE_NAMES[3], Number(self.rainfall)),
            (ATTRIBUTE_NAMES[4], Number(self.wind_speed)),
            (ATTRIBUTE_NAMES[5], Number(self.solar_radiation)),
            (ATTRIBUTE_NAMES[6], Category(&self.soil_type)),
            (ATTRIBUTE_NAMES[7], Number(self.soil_moisture_content)),
            (ATTRIBUTE_NAMES[8], Number(self.infiltration_rate)),
            (ATTRIBUTE_NAMES[9], Number(self.field_capacity)),
            (ATTRIBUTE_NAMES[10], Number(self.wilting_point)),
            (ATTRIBUTE_NAMES[11], Category(&self.growth_stage)),
            (ATTRIBUTE_NAMES[12], Number(self.root_depth)),
            (ATTRIBUTE_NAMES[13], Number(self.crop_coefficient)),
            (ATTRIBUTE_NAMES[14], Category(&self.water_availability)),
            (ATTRIBUTE_NAMES[15], Number(self.irrigation_system_efficiency)),
            (ATTRIBUTE_NAMES[16], Category(&self.water_quality)),
            (ATTRIBUTE_NAMES[17], Number(self.slope)),
            (ATTRIBUTE_NAMES[18], Category(&self.drainage_conditions)),
        ]
    }

    /// Whether the named attribute is categorical.
    pub fn is_categorical(name: &str) -> bool {
        matches!(
            name,
            "Soil Type" | "Growth Stage" | "Water Availability" | "Water Quality" | "Drainage Conditions"
        )
    }

    /// Builds the record for postal-code mode from looked-up field data and
    /// the values the user still supplies.
    pub fn from_field_data(field: &FieldData, overrides: &FieldOverrides) -> Self {
        Self {
            upper_temperature: field.weather.temp_max,
            lower_temperature: field.weather.temp_min,
            humidity: field.weather.humidity,
            rainfall: overrides.rainfall,
            wind_speed: field.weather.wind_speed,
            solar_radiation: field.weather.solar_radiation,
            soil_type: overrides
                .soil_type
                .clone()
                .unwrap_or_else(|| field.soil.soil_type.clone()),
            soil_moisture_content: overrides.soil_moisture_content,
            infiltration_rate: field.soil.infiltration_rate,
            field_capacity: field.soil.field_capacity,
            wilting_point: field.soil.wilting_point,
            growth_stage: overrides.growth_stage.clone(),
            root_depth: overrides.root_depth,
            crop_coefficient: overrides.crop_coefficient,
            water_availability: overrides.water_availability.clone(),
            irrigation_system_efficiency: overrides.irrigation_system_efficiency,
            water_quality: overrides.water_quality.clone(),
            slope: overrides.slope,
            drainage_conditions: field.soil.drainage.clone(),
        }
    }

    /// Rejects non-finite numbers, out-of-range percentages, negative
    /// amounts and blank categories.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in self.attributes() {
            match value {
                FeatureValue::Number(n) if !n.is_finite() => {
                    return Err(AppError::Validation(format!("{} must be a finite number", name)));
                }
                FeatureValue::Category(c) if c.trim().is_empty() => {
                    return Err(AppError::Validation(format!("{} cannot be empty", name)));
                }
                _ => {}
            }
        }

        for (name, value) in [
            ("Humidity", self.humidity),
            ("Irrigation System Efficiency", self.irrigation_system_efficiency),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(AppError::Validation(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [
            ("Rainfall", self.rainfall),
            ("Wind Speed", self.wind_speed),
            ("Solar Radiation", self.solar_radiation),
            ("Soil Moisture Content", self.soil_moisture_content),
            ("Infiltration Rate", self.infiltration_rate),
            ("Field Capacity", self.field_capacity),
            ("Wilting Point", self.wilting_point),
            ("Root Depth", self.root_depth),
        ] {
            if value < 0.0 {
                return Err(AppError::Validation(format!(
                    "{} cannot be negative, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Values the user supplies in postal-code mode; everything else comes from
/// the field data lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOverrides {
    pub rainfall: f64,
    /// Replaces the soil table's soil type when present.
    #[serde(default)]
    pub soil_type: Option<String>,
    pub soil_moisture_content: f64,
    pub growth_stage: String,
    pub root_depth: f64,
    pub crop_coefficient: f64,
    pub water_availability: String,
    pub irrigation_system_efficiency: f64,
    pub water_quality: String,
    pub slope: f64,
}

// ============ Crops & Log ============

/// Crops with a known model artifact naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crop {
    Wheat,
    Rice,
    Maize,
    Cotton,
    Sugarcane,
    Potato,
}

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::Wheat,
        Crop::Rice,
        Crop::Maize,
        Crop::Cotton,
        Crop::Sugarcane,
        Crop::Potato,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Crop::Wheat => "wheat",
            Crop::Rice => "rice",
            Crop::Maize => "maize",
            Crop::Cotton => "cotton",
            Crop::Sugarcane => "sugarcane",
            Crop::Potato => "potato",
        }
    }

    /// File name of the crop's model artifact inside the model directory.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Crop {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Crop::ALL
            .into_iter()
            .find(|crop| crop.as_str() == wanted)
            .ok_or_else(|| AppError::UnknownCrop(s.trim().to_string()))
    }
}

/// How the prediction inputs were gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    /// Every attribute entered by hand.
    #[serde(rename = "PRO")]
    Manual,
    /// Weather and soil filled in from the postal code.
    #[serde(rename = "PIN")]
    PostalCode,
}

impl InputMode {
    /// Short tag stored in the prediction log.
    pub fn tag(&self) -> &'static str {
        match self {
            InputMode::Manual => "PRO",
            InputMode::PostalCode => "PIN",
        }
    }
}

/// One logged prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub crop: Crop,
    pub pincode: PinCode,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureRecord,
    /// Predicted irrigation requirement in mm.
    pub water_required: f64,
    pub input_mode: InputMode,
}

// ============ API Request/Response Models ============

#[derive(Debug, Clone, Deserialize)]
pub struct ManualPredictionRequest {
    pub crop: String,
    pub pincode: PinCode,
    #[serde(flatten)]
    pub features: FeatureRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PincodePredictionRequest {
    pub crop: String,
    pub pincode: PinCode,
    #[serde(flatten)]
    pub overrides: FieldOverrides,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub message: String,
    pub entry: PredictionLogEntry,
}
