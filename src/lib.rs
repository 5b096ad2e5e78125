//! Irrigation Advisor API Library
//!
//! This library provides the core functionality for the Irrigation Advisor
//! API: postal-code field data acquisition (soil reference table, weather
//! provider, solar radiation estimate), per-crop irrigation models, the
//! prediction log, and HTTP handlers.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `enrichment`: Field data aggregation for a postal code.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `log_storage`: Append-only prediction log.
//! - `models`: Core data models.
//! - `predictor`: Crop models and registry.
//! - `services`: Weather provider client.
//! - `soil`: Soil reference table and range lookup.
//! - `soil_store`: Checksum-cached soil table loader.
//! - `solar`: Solar radiation estimator.

pub mod config;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod log_storage;
pub mod models;
pub mod predictor;
pub mod services;
pub mod soil;
pub mod soil_store;
pub mod solar;
