//! Lambert Conformal Conic projection onto the forecast provider's 5 km grid.
//!
//! The constants and the add-0.5-then-truncate rounding must stay exactly as
//! the provider publishes them; a one-cell drift means forecasts for the
//! wrong place.

use std::f64::consts::PI;

use crate::types::{GeodeticPoint, GridCell};

/// Earth radius in km
const EARTH_RADIUS_KM: f64 = 6371.00877;
/// Grid spacing in km
const GRID_KM: f64 = 5.0;
/// Standard parallels in degrees
const STANDARD_LAT_1: f64 = 30.0;
const STANDARD_LAT_2: f64 = 60.0;
/// Projection origin in degrees
const ORIGIN_LON: f64 = 126.0;
const ORIGIN_LAT: f64 = 38.0;
/// Grid offset of the origin
const ORIGIN_X: f64 = 43.0;
const ORIGIN_Y: f64 = 136.0;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Project geodetic degrees onto the forecast grid.
pub fn project(latitude: f64, longitude: f64) -> GridCell {
    let re = EARTH_RADIUS_KM / GRID_KM;
    let slat1 = STANDARD_LAT_1 * DEG_TO_RAD;
    let slat2 = STANDARD_LAT_2 * DEG_TO_RAD;
    let olon = ORIGIN_LON * DEG_TO_RAD;
    let olat = ORIGIN_LAT * DEG_TO_RAD;

    let sn = (slat1.cos() / slat2.cos()).ln()
        / ((PI * 0.25 + slat2 * 0.5).tan() / (PI * 0.25 + slat1 * 0.5).tan()).ln();
    let sf = (PI * 0.25 + slat1 * 0.5).tan().powf(sn) * slat1.cos() / sn;
    let ro = re * sf / (PI * 0.25 + olat * 0.5).tan().powf(sn);
    let ra = re * sf / (PI * 0.25 + latitude * DEG_TO_RAD * 0.5).tan().powf(sn);

    let mut theta = longitude * DEG_TO_RAD - olon;
    if theta > PI {
        theta -= 2.0 * PI;
    }
    if theta < -PI {
        theta += 2.0 * PI;
    }
    theta *= sn;

    // `as` truncates toward zero, matching the provider's integer cast
    let nx = (ra * theta.sin() + ORIGIN_X + 0.5) as i32;
    let ny = (ro - ra * theta.cos() + ORIGIN_Y + 0.5) as i32;

    GridCell { nx, ny }
}

/// Convenience wrapper over [`project`] for a position.
pub fn project_point(point: &GeodeticPoint) -> GridCell {
    project(point.latitude, point.longitude)
}
