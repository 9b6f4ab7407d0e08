//! Input warning domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A standing warning about incomplete inputs for one sensor and window start
///
/// Warnings persist across runs until the inputs become complete or an
/// operator clears them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputWarning {
    pub sensor_id: String,
    pub from_datetime: DateTime<Utc>,
    pub message: String,
    pub last_checked: DateTime<Utc>,
}

impl InputWarning {
    /// Returns true if this warning concerns the given sensor and window start
    pub fn concerns(&self, sensor_id: &str, from_datetime: &DateTime<Utc>) -> bool {
        self.sensor_id == sensor_id && &self.from_datetime == from_datetime
    }
}
