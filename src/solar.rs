//! Clear-sky solar radiation estimate at solar noon.
//!
//! The estimate is a closed-form function of latitude and day of year. The
//! division by `cos(elevation)` is left unguarded: when the sun is close to
//! the zenith (latitude equal to the solar declination) the result grows
//! without bound.

use crate::models::Coordinate;
use chrono::{Datelike, NaiveDate, Utc};

/// Solar constant in W/m².
pub const SOLAR_CONSTANT_W_M2: f64 = 1361.0;

/// Conversion applied to W/m² figures to express them in MJ/m².
pub const W_M2_TO_MJ_M2: f64 = 1e-3;

/// Axial tilt used for the declination, in degrees.
const AXIAL_TILT_DEG: f64 = 23.44;

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimated solar radiation in MJ/m² for `coordinate` on `date`, rounded to
/// two decimals. Longitude does not affect the result.
pub fn estimate_solar_radiation(coordinate: Coordinate, date: NaiveDate) -> f64 {
    let n = f64::from(date.ordinal());

    let latitude_rad = coordinate.latitude().to_radians();
    let declination_rad =
        (AXIAL_TILT_DEG * ((360.0 / 365.0) * (n - 81.0)).to_radians().sin()).to_radians();

    // Solar noon: hour angle is zero.
    let hour_angle_rad: f64 = 0.0;

    let sin_alpha = (declination_rad.sin() * latitude_rad.sin()
        + declination_rad.cos() * latitude_rad.cos() * hour_angle_rad.cos())
    .clamp(-1.0, 1.0);
    let alpha = sin_alpha.asin();

    let eccentricity = 1.0 + 0.034 * (2.0 * std::f64::consts::PI / 365.0 * n).cos();
    let radiation = SOLAR_CONSTANT_W_M2 * W_M2_TO_MJ_M2 * eccentricity / alpha.cos();

    round2(radiation)
}

/// Same as [`estimate_solar_radiation`] for the current UTC date.
pub fn estimate_solar_radiation_today(coordinate: Coordinate) -> f64 {
    estimate_solar_radiation(coordinate, Utc::now().date_naive())
}
