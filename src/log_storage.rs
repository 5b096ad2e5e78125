/// Append-only CSV log of predictions
///
/// Every prediction becomes one row. The header is written once, when the
/// file is created (or found empty). Rows are encoded in memory and written
/// with a single `write_all` while holding the log mutex, so concurrent
/// appends never interleave. Handles opened on the same path share one mutex.
use crate::errors::{AppError, ResultExt};
use crate::models::{Crop, FeatureRecord, InputMode, PinCode, PredictionLogEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// On-disk row layout. Field order is column order.
#[derive(Debug, Serialize, Deserialize)]
struct LogRow {
    crop: Crop,
    pincode: u32,
    timestamp: DateTime<Utc>,
    upper_temp: f64,
    lower_temp: f64,
    humidity: f64,
    rainfall: f64,
    wind_speed: f64,
    solar_rad: f64,
    soil_type: String,
    soil_moisture: f64,
    infiltration_rate: f64,
    field_capacity: f64,
    wilting_point: f64,
    growth_stage: String,
    root_depth: f64,
    crop_coeff: f64,
    water_availability: String,
    irrigation_efficiency: f64,
    water_quality: String,
    slope: f64,
    drainage_conditions: String,
    water_supplied: f64,
    #[serde(rename = "type")]
    input_mode: InputMode,
}

impl From<&PredictionLogEntry> for LogRow {
    fn from(entry: &PredictionLogEntry) -> Self {
        let f = &entry.features;
        Self {
            crop: entry.crop,
            pincode: entry.pincode.value(),
            timestamp: entry.timestamp,
            upper_temp: f.upper_temperature,
            lower_temp: f.lower_temperature,
            humidity: f.humidity,
            rainfall: f.rainfall,
            wind_speed: f.wind_speed,
            solar_rad: f.solar_radiation,
            soil_type: f.soil_type.clone(),
            soil_moisture: f.soil_moisture_content,
            infiltration_rate: f.infiltration_rate,
            field_capacity: f.field_capacity,
            wilting_point: f.wilting_point,
            growth_stage: f.growth_stage.clone(),
            root_depth: f.root_depth,
            crop_coeff: f.crop_coefficient,
            water_availability: f.water_availability.clone(),
            irrigation_efficiency: f.irrigation_system_efficiency,
            water_quality: f.water_quality.clone(),
            slope: f.slope,
            drainage_conditions: f.drainage_conditions.clone(),
            water_supplied: entry.water_required,
            input_mode: entry.input_mode,
        }
    }
}

impl From<LogRow> for PredictionLogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            crop: row.crop,
            pincode: PinCode::from(row.pincode),
            timestamp: row.timestamp,
            features: FeatureRecord {
                upper_temperature: row.upper_temp,
                lower_temperature: row.lower_temp,
                humidity: row.humidity,
                rainfall: row.rainfall,
                wind_speed: row.wind_speed,
                solar_radiation: row.solar_rad,
                soil_type: row.soil_type,
                soil_moisture_content: row.soil_moisture,
                infiltration_rate: row.infiltration_rate,
                field_capacity: row.field_capacity,
                wilting_point: row.wilting_point,
                growth_stage: row.growth_stage,
                root_depth: row.root_depth,
                crop_coefficient: row.crop_coeff,
                water_availability: row.water_availability,
                irrigation_system_efficiency: row.irrigation_efficiency,
                water_quality: row.water_quality,
                slope: row.slope,
                drainage_conditions: row.drainage_conditions,
            },
            water_required: row.water_supplied,
            input_mode: row.input_mode,
        }
    }
}

/// Process-wide lock per log file, keyed by absolute path.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

#[derive(Clone)]
pub struct PredictionLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = lock_for(&path);
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the file (and header) if needed.
    pub async fn append(&self, entry: &PredictionLogEntry) -> Result<(), AppError> {
        let row = LogRow::from(entry);
        let path = self.path.clone();
        let lock = self.lock.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| AppError::Storage("prediction log lock poisoned".to_string()))?;
            append_row(&path, &row)
        })
        .await
        .map_err(|e| AppError::Internal(format!("log append task failed: {}", e)))?
        .with_context(|| format!("appending to {}", self.path.display()))?;

        tracing::info!(
            "Logged {} prediction for {} at pincode {}",
            entry.input_mode.tag(),
            entry.crop,
            entry.pincode
        );
        Ok(())
    }

    /// Every entry in file order. A missing file is an empty log.
    pub async fn entries(&self) -> Result<Vec<PredictionLogEntry>, AppError> {
        let path = self.path.clone();
        let lock = self.lock.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| AppError::Storage("prediction log lock poisoned".to_string()))?;
            read_rows(&path)
        })
        .await
        .map_err(|e| AppError::Internal(format!("log read task failed: {}", e)))?
        .with_context(|| format!("reading {}", self.path.display()))
    }

    /// The most recently appended entry.
    pub async fn latest(&self) -> Result<Option<PredictionLogEntry>, AppError> {
        Ok(self.entries().await?.pop())
    }

    /// Entry at a zero-based position.
    pub async fn entry(&self, index: usize) -> Result<Option<PredictionLogEntry>, AppError> {
        Ok(self.entries().await?.into_iter().nth(index))
    }

    pub async fn len(&self) -> Result<usize, AppError> {
        Ok(self.entries().await?.len())
    }
}

fn append_row(path: &Path, row: &LogRow) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let write_header = file.metadata()?.len() == 0;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(vec![]);
    wtr.serialize(row)?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Storage(format!("encoding log row: {}", e)))?;

    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<PredictionLogEntry>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = csv::Reader::from_path(path)?;
    rdr.deserialize::<LogRow>()
        .map(|row| row.map(PredictionLogEntry::from).map_err(AppError::from))
        .collect()
}
