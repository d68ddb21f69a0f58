//! Pick the display values for the current hour out of a forecast response.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::types::{ForecastCategory, ForecastObservation, ForecastResult};

/// Sky code the provider uses for a clear sky
const SKY_CLEAR_CODE: &str = "1";

pub const SKY_CLEAR: &str = "clear";
pub const SKY_CLOUDY_OR_RAIN: &str = "cloudy/rain";

/// Bucket matched by [`select`]: the current hour of `as_of`, as "HH00".
pub fn target_bucket(as_of: &DateTime<FixedOffset>) -> String {
    format!("{:02}00", as_of.hour())
}

/// Human-readable sky condition for a provider sky code.
pub fn sky_label(code: &str) -> &'static str {
    if code == SKY_CLEAR_CODE {
        SKY_CLEAR
    } else {
        SKY_CLOUDY_OR_RAIN
    }
}

/// Temperature and sky condition for the current hour bucket.
///
/// Later observations override earlier ones for the same category. Categories
/// with no match keep their placeholder.
pub fn select(
    observations: &[ForecastObservation],
    as_of: &DateTime<FixedOffset>,
) -> ForecastResult {
    let target = target_bucket(as_of);
    let mut result = ForecastResult::default();

    for observation in observations.iter().filter(|o| o.time_bucket == target) {
        match observation.category {
            ForecastCategory::Temperature => {
                result.temperature_c = format!("{}°C", observation.value);
            }
            ForecastCategory::SkyCondition => {
                result.sky_condition = sky_label(&observation.value).to_string();
            }
            _ => {}
        }
    }

    result
}
