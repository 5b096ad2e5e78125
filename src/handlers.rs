use crate::enrichment::FieldDataAggregator;
use crate::errors::AppError;
use crate::log_storage::PredictionLog;
use crate::models::*;
use crate::predictor::ModelRegistry;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const NO_FIELD_DATA: &str = "No data found for the given pincode.";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Soil + weather lookup for postal-code mode.
    pub aggregator: FieldDataAggregator,
    /// Crop models, loaded once at startup.
    pub models: ModelRegistry,
    /// Append-only prediction log.
    pub log: PredictionLog,
}

/// Application routes, without middleware.
///
/// `main` wraps the `/api/v1` routes in the body limit and rate limiter.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/crops", get(list_crops))
        .route("/api/v1/field-data/:pincode", get(get_field_data))
        .route("/api/v1/predictions/manual", post(predict_manual))
        .route("/api/v1/predictions/pincode", post(predict_by_pincode))
        .route("/api/v1/predictions/latest", get(latest_prediction))
        .route("/api/v1/predictions/:index", get(get_prediction))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/crops
///
/// Crops that currently have a model loaded.
pub async fn list_crops(State(state): State<Arc<AppState>>) -> Json<Value> {
    let crops = state.models.crops();
    Json(json!({ "crops": crops }))
}

/// GET /api/v1/field-data/:pincode
///
/// Merged weather and soil attributes for a postal code.
pub async fn get_field_data(
    State(state): State<Arc<AppState>>,
    Path(pincode): Path<String>,
) -> Result<Json<Map<String, Value>>, AppError> {
    tracing::info!("GET /field-data/{}", pincode);

    let field = state
        .aggregator
        .gather(&pincode)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_FIELD_DATA.to_string()))?;

    Ok(Json(field.attributes()))
}

/// POST /api/v1/predictions/manual
///
/// Every attribute is supplied by the caller.
pub async fn predict_manual(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ManualPredictionRequest>,
) -> Result<Json<PredictionResponse>, AppError> {
    tracing::info!(
        "POST /predictions/manual - crop: {}, pincode: {}",
        request.crop,
        request.pincode
    );

    request.features.validate()?;
    let entry = predict_and_log(
        &state,
        &request.crop,
        request.pincode,
        request.features,
        InputMode::Manual,
    )
    .await?;

    Ok(Json(PredictionResponse {
        success: true,
        message: format!(
            "Predicted water requirement for {}: {} mm",
            entry.crop, entry.water_required
        ),
        entry,
    }))
}

/// POST /api/v1/predictions/pincode
///
/// Weather and soil attributes are filled in from the postal code; the rest
/// come from the request.
pub async fn predict_by_pincode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PincodePredictionRequest>,
) -> Result<Json<PredictionResponse>, AppError> {
    tracing::info!(
        "POST /predictions/pincode - crop: {}, pincode: {}",
        request.crop,
        request.pincode
    );

    // Reject unknown crops before spending a weather call
    let crop: Crop = request.crop.parse()?;
    if !state.models.crops().contains(&crop) {
        return Err(AppError::UnknownCrop(crop.to_string()));
    }

    let field = state
        .aggregator
        .gather_for(request.pincode)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_FIELD_DATA.to_string()))?;

    let features = FeatureRecord::from_field_data(&field, &request.overrides);
    features.validate()?;

    let entry = predict_and_log(
        &state,
        &request.crop,
        request.pincode,
        features,
        InputMode::PostalCode,
    )
    .await?;

    Ok(Json(PredictionResponse {
        success: true,
        message: format!(
            "Predicted water requirement for {} at {}: {} mm",
            entry.crop, field.weather.city, entry.water_required
        ),
        entry,
    }))
}

/// GET /api/v1/predictions/latest
pub async fn latest_prediction(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PredictionLogEntry>, AppError> {
    state
        .log
        .latest()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No predictions have been logged yet.".to_string()))
}

/// GET /api/v1/predictions/:index
pub async fn get_prediction(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<PredictionLogEntry>, AppError> {
    state
        .log
        .entry(index)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No prediction at index {}", index)))
}

async fn predict_and_log(
    state: &AppState,
    crop: &str,
    pincode: PinCode,
    features: FeatureRecord,
    input_mode: InputMode,
) -> Result<PredictionLogEntry, AppError> {
    let water_required = state.models.predict(crop, &features)?;
    let entry = PredictionLogEntry {
        crop: crop.parse()?,
        pincode,
        timestamp: Utc::now(),
        features,
        water_required,
        input_mode,
    };

    state.log.append(&entry).await?;
    Ok(entry)
}
