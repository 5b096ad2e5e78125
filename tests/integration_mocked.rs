/// Integration tests with a mocked weather provider
/// Exercises the postal-code pipeline and HTTP handlers without hitting the real API
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use irrigation_advisor_api::config::Config;
use irrigation_advisor_api::enrichment::FieldDataAggregator;
use irrigation_advisor_api::errors::AppError;
use irrigation_advisor_api::handlers::{self, AppState};
use irrigation_advisor_api::log_storage::PredictionLog;
use irrigation_advisor_api::models::{Coordinate, PinCode};
use irrigation_advisor_api::predictor::ModelRegistry;
use irrigation_advisor_api::services::{WeatherService, SOLAR_RADIATION_SCALE};
use irrigation_advisor_api::soil_store::SoilTableStore;
use irrigation_advisor_api::solar::estimate_solar_radiation;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOIL_TABLE: &str = "\
pincode_start,pincode_end,soil_type,drainage,infiltration,wilting_point,field_capacity
110000,110099,Loamy,Well-drained,5.0,12.0,30.0
560000,560099,Red,Moderate,3.5,10.0,25.0
";

/// Helper function to create test config
fn create_test_config(weather_base_url: String, dir: &Path) -> Config {
    Config {
        port: 5000,
        weather_api_key: "test_key".to_string(),
        weather_base_url,
        weather_country_code: "IN".to_string(),
        soil_table_path: dir.join("soil_data.csv"),
        prediction_log_path: dir.join("status_data.csv"),
        model_dir: dir.join("model_artifacts"),
    }
}

fn write_fixtures(dir: &Path) {
    std::fs::write(dir.join("soil_data.csv"), SOIL_TABLE).unwrap();
    let models = dir.join("model_artifacts");
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(
        models.join("wheat.json"),
        r#"{
            "intercept": 20.0,
            "coefficients": {"Upper_Temperature": 0.5, "Rainfall": -0.5},
            "categories": {"Soil Type": {"Loamy": 1.5}}
        }"#,
    )
    .unwrap();
}

fn delhi_weather() -> Value {
    json!({
        "coord": {"lon": 77.2, "lat": 28.6},
        "weather": [{"id": 721, "main": "Haze", "description": "haze", "icon": "50d"}],
        "main": {
            "temp": 30.0, "feels_like": 33.0, "temp_min": 22.0, "temp_max": 35.0,
            "pressure": 1008, "humidity": 75
        },
        "wind": {"speed": 2.0, "deg": 270},
        "sys": {"country": "IN"},
        "name": "New Delhi"
    })
}

async fn mount_weather(server: &MockServer, pincode: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("zip", format!("{},IN", pincode)))
        .and(query_param("appid", "test_key"))
        .and(query_param("units", "metric"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn aggregator(config: &Config) -> FieldDataAggregator {
    FieldDataAggregator::new(
        SoilTableStore::new(&config.soil_table_path),
        WeatherService::new(config),
    )
}

fn app(config: &Config) -> axum::Router {
    let state = Arc::new(AppState {
        aggregator: aggregator(config),
        models: ModelRegistry::load_dir(&config.model_dir).unwrap(),
        log: PredictionLog::new(&config.prediction_log_path),
    });
    axum::Router::new()
        .route("/health", axum::routing::get(handlers::health))
        .merge(handlers::api_routes())
        .with_state(state)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn pincode_request(crop: &str, pincode: &str) -> Value {
    json!({
        "crop": crop,
        "pincode": pincode,
        "rainfall": 10.0,
        "soil_moisture_content": 20.0,
        "growth_stage": "Vegetative",
        "root_depth": 40.0,
        "crop_coefficient": 1.2,
        "water_availability": "Low",
        "irrigation_system_efficiency": 85.0,
        "water_quality": "Good",
        "slope": 5.0
    })
}

#[tokio::test]
async fn test_weather_success_normalized() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_json(delhi_weather()),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(mock_server.uri(), dir.path());
    let service = WeatherService::new(&config);

    let snapshot = service
        .current_by_pincode(PinCode::from(110001))
        .await
        .unwrap()
        .expect("weather should be found");

    assert_eq!(snapshot.city, "New Delhi");
    assert_eq!(snapshot.temp_max, 35.0);
    assert_eq!(snapshot.temp_min, 22.0);
    assert_eq!(snapshot.pressure, 1.008);
    assert_eq!(snapshot.description, "haze");
}

#[tokio::test]
async fn test_weather_non_success_is_absent() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "999999",
        ResponseTemplate::new(404).set_body_json(json!({"cod": "404", "message": "city not found"})),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(mock_server.uri(), dir.path());
    let service = WeatherService::new(&config);

    let result = service.current_by_pincode(PinCode::from(999999)).await;
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn test_weather_unexpected_shape_is_validation_error() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_json(json!({"coord": {"lat": 28.6, "lon": 77.2}})),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(mock_server.uri(), dir.path());
    let service = WeatherService::new(&config);

    let result = service.current_by_pincode(PinCode::from(110001)).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_weather_unreachable_is_transport_error() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("http://127.0.0.1:1".to_string(), dir.path());
    let service = WeatherService::new(&config);

    let result = service.current_by_pincode(PinCode::from(110001)).await;
    assert!(matches!(result, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn test_field_data_for_110001() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_json(delhi_weather()),
    )
    .await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());

    let before = Utc::now().date_naive();
    let field = aggregator(&config)
        .gather("110001")
        .await
        .unwrap()
        .expect("field data should be found");
    let after = Utc::now().date_naive();

    assert_eq!(field.soil.soil_type, "Loamy");
    assert_eq!(field.weather.temp_max, 35.0);

    // The request and the expectation may straddle UTC midnight
    let delhi = Coordinate::new(28.6, 77.2).unwrap();
    let expected = [before, after]
        .map(|day| estimate_solar_radiation(delhi, day) * SOLAR_RADIATION_SCALE);
    assert!(
        expected.contains(&field.weather.solar_radiation),
        "solar radiation {} not in {:?}",
        field.weather.solar_radiation,
        expected
    );

    let attrs = field.attributes();
    assert_eq!(attrs["soil_type"], json!("Loamy"));
    assert_eq!(attrs["drainage"], json!("Well-drained"));
    assert_eq!(attrs["city"], json!("New Delhi"));
}

#[tokio::test]
async fn test_aggregator_requires_both_sources() {
    let mock_server = MockServer::start().await;
    // 110001: soil + weather; 110050: soil only; 400001: weather only; 999999: neither
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_json(delhi_weather()),
    )
    .await;
    mount_weather(&mock_server, "110050", ResponseTemplate::new(404)).await;
    mount_weather(
        &mock_server,
        "400001",
        ResponseTemplate::new(200).set_body_json(delhi_weather()),
    )
    .await;
    mount_weather(&mock_server, "999999", ResponseTemplate::new(404)).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let aggregator = aggregator(&config);

    assert!(aggregator.gather("110001").await.unwrap().is_some());
    assert!(aggregator.gather("110050").await.unwrap().is_none());
    assert!(aggregator.gather("400001").await.unwrap().is_none());
    assert!(aggregator.gather("999999").await.unwrap().is_none());
}

#[tokio::test]
async fn test_aggregator_weather_failures_are_absent() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_string("not json"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    assert!(aggregator(&config).gather("110001").await.unwrap().is_none());

    let unreachable = create_test_config("http://127.0.0.1:1".to_string(), dir.path());
    assert!(aggregator(&unreachable).gather("110001").await.unwrap().is_none());
}

#[tokio::test]
async fn test_aggregator_rejects_malformed_pincode() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());

    let result = aggregator(&config).gather("11OO01").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_aggregator_missing_soil_table_is_storage_error() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(mock_server.uri(), dir.path());

    let err = aggregator(&config).gather("110001").await.unwrap_err();
    assert_eq!(err.code(), "storage_error");
}

#[tokio::test]
async fn test_pincode_prediction_endpoint_logs_entry() {
    let mock_server = MockServer::start().await;
    mount_weather(
        &mock_server,
        "110001",
        ResponseTemplate::new(200).set_body_json(delhi_weather()),
    )
    .await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let app = app(&config);

    let (status, body) = send(
        &app,
        post_json("/api/v1/predictions/pincode", pincode_request("wheat", "110001")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    // 20 + 0.5 * 35 - 0.5 * 10 + 1.5
    assert_eq!(body["entry"]["water_required"], json!(34.0));
    assert_eq!(body["entry"]["input_mode"], json!("PIN"));
    assert_eq!(body["entry"]["features"]["soil_type"], json!("Loamy"));

    let log = std::fs::read_to_string(&config.prediction_log_path).unwrap();
    assert_eq!(log.lines().count(), 2);

    let (status, latest) = send(&app, get("/api/v1/predictions/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["crop"], json!("wheat"));
    assert_eq!(latest["pincode"], json!(110001));

    let (status, first) = send(&app, get("/api/v1/predictions/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, latest);
}

#[tokio::test]
async fn test_pincode_prediction_without_data_is_not_found() {
    let mock_server = MockServer::start().await;
    mount_weather(&mock_server, "999999", ResponseTemplate::new(404)).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let app = app(&config);

    let (status, body) = send(
        &app,
        post_json("/api/v1/predictions/pincode", pincode_request("wheat", "999999")),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
    assert!(!config.prediction_log_path.exists());
}

#[tokio::test]
async fn test_unknown_crop_distinct_from_missing_data() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let app = app(&config);

    let (status, body) = send(
        &app,
        post_json("/api/v1/predictions/pincode", pincode_request("barley", "110001")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("unknown_crop"));

    // Known crop without an artifact
    let (_, body) = send(
        &app,
        post_json("/api/v1/predictions/pincode", pincode_request("rice", "110001")),
    )
    .await;
    assert_eq!(body["code"], json!("unknown_crop"));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_manual_prediction_validates_input() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let app = app(&config);

    let mut request = json!({
        "crop": "wheat",
        "pincode": 560001,
        "upper_temperature": 30.0,
        "lower_temperature": 18.0,
        "humidity": 60.0,
        "rainfall": 0.0,
        "wind_speed": 3.0,
        "solar_radiation": 180.0,
        "soil_type": "Red",
        "soil_moisture_content": 15.0,
        "infiltration_rate": 3.5,
        "field_capacity": 25.0,
        "wilting_point": 10.0,
        "growth_stage": "Flowering",
        "root_depth": 60.0,
        "crop_coefficient": 1.1,
        "water_availability": "Medium",
        "irrigation_system_efficiency": 70.0,
        "water_quality": "Good",
        "slope": 2.0,
        "drainage_conditions": "Moderate"
    });

    let (status, body) = send(&app, post_json("/api/v1/predictions/manual", request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    // 20 + 0.5 * 30; no weight for "Red"
    assert_eq!(body["entry"]["water_required"], json!(35.0));
    assert_eq!(body["entry"]["input_mode"], json!("PRO"));

    request["humidity"] = json!(140.0);
    let (status, body) = send(&app, post_json("/api/v1/predictions/manual", request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("validation_error"));
}

#[tokio::test]
async fn test_read_back_on_empty_log() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let config = create_test_config(mock_server.uri(), dir.path());
    let app = app(&config);

    let (status, _) = send(&app, get("/api/v1/predictions/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/api/v1/crops")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["crops"], json!(["wheat"]));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
}
