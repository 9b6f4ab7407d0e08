//! Sensor data context types
//!
//! A [`SensorDataContext`] describes one sensor at one location for one time
//! window. It is produced by the metadata provider and is never mutated
//! afterwards: one context is one schedulable unit of work.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A measurement location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,
    #[serde(default)]
    pub details: String,
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters above sea level
    pub alt: f64,
}

/// A half-open time window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The window covering one full UTC day
    pub fn day(date: NaiveDate) -> Self {
        Self::date_range(date, date)
    }

    /// The window covering every day from `first` to `last`, both inclusive
    pub fn date_range(first: NaiveDate, last: NaiveDate) -> Self {
        let from = first.and_time(NaiveTime::MIN).and_utc();
        let to = (last.and_time(NaiveTime::MIN) + Duration::days(1)).and_utc();
        Self { from, to }
    }

    /// Returns true if the window contains no instant at all
    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Intersects two windows, returning `None` if they do not overlap
    pub fn intersect(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let window = TimeWindow {
            from: self.from.max(other.from),
            to: self.to.min(other.to),
        };
        (!window.is_empty()).then_some(window)
    }

    /// Lists every UTC date that has at least one instant inside the window
    pub fn dates(&self) -> Vec<NaiveDate> {
        if self.is_empty() {
            return Vec::new();
        }

        let first = self.from.date_naive();
        let last = (self.to - Duration::seconds(1)).date_naive();
        first.iter_days().take_while(|d| *d <= last).collect()
    }
}

/// Pressure calibration applied to the ground pressure of a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFactors {
    #[serde(default = "default_pressure_factor")]
    pub pressure_factor: f64,
    #[serde(default)]
    pub pressure_offset: f64,
}

fn default_pressure_factor() -> f64 {
    1.0
}

impl Default for CalibrationFactors {
    fn default() -> Self {
        Self {
            pressure_factor: default_pressure_factor(),
            pressure_offset: 0.0,
        }
    }
}

impl CalibrationFactors {
    pub fn apply(&self, pressure: f64) -> f64 {
        pressure * self.pressure_factor + self.pressure_offset
    }
}

/// One sensor at one location during one time window
///
/// Usually spans a full UTC day, but covers only part of a day when the
/// sensor was relocated during that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDataContext {
    pub sensor_id: String,
    pub serial_number: u32,
    pub from_datetime: DateTime<Utc>,
    pub to_datetime: DateTime<Utc>,
    pub location: Location,
    pub pressure_data_source: String,
    #[serde(default)]
    pub utc_offset: f64,
    #[serde(default)]
    pub calibration: Option<CalibrationFactors>,
}

impl SensorDataContext {
    /// The UTC date this context belongs to
    pub fn date(&self) -> NaiveDate {
        self.from_datetime.date_naive()
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.from_datetime, self.to_datetime)
    }

    /// Returns true if the context starts at midnight and lasts until the
    /// final second of the same day
    pub fn covers_full_day(&self) -> bool {
        let midnight = self.date().and_time(NaiveTime::MIN).and_utc();
        let last_second = midnight + Duration::days(1) - Duration::seconds(1);
        self.from_datetime == midnight && self.to_datetime >= last_second
    }

    /// Filesystem-safe name of this context's output directory
    ///
    /// `YYYYMMDD` for full days, `YYYYMMDD_HHMMSS_HHMMSS` for partial days,
    /// followed by `_<suffix>` when the job configures an output suffix.
    pub fn slug(&self, output_suffix: Option<&str>) -> String {
        let mut slug = self.from_datetime.format("%Y%m%d").to_string();
        if !self.covers_full_day() {
            slug.push_str(&self.from_datetime.format("_%H%M%S").to_string());
            slug.push_str(&self.last_instant().format("_%H%M%S").to_string());
        }
        if let Some(suffix) = output_suffix {
            slug.push('_');
            slug.push_str(suffix);
        }
        slug
    }

    /// Slug of the rounded location coordinates, e.g. `48N011E`
    pub fn coordinates_slug(&self) -> String {
        coordinates_slug(self.location.lat, self.location.lon)
    }

    /// The end of the window, rendered as `23:59:59` rather than the next
    /// day's midnight
    fn last_instant(&self) -> DateTime<Utc> {
        let next_midnight = (self.date().and_time(NaiveTime::MIN) + Duration::days(1)).and_utc();
        if self.to_datetime >= next_midnight {
            next_midnight - Duration::seconds(1)
        } else {
            self.to_datetime
        }
    }
}

/// Builds a coordinates slug such as `48N011E` or `34S058W`
pub fn coordinates_slug(lat: f64, lon: f64) -> String {
    let lat = lat.round_ties_even() as i64;
    let lon = lon.round_ties_even() as i64;
    format!(
        "{:02}{}{:03}{}",
        lat.abs(),
        if lat < 0 { "S" } else { "N" },
        lon.abs(),
        if lon < 0 { "W" } else { "E" }
    )
}
