//! In-memory metadata store
//!
//! Built from two JSON documents:
//! - `sensors.json`: every sensor with its serial number and the time
//!   windows ("setups") during which it stood at a given location
//! - `locations.json`: coordinates of every location

use chrono::{DateTime, Utc};
use retrieval_core::domain::context::{
    CalibrationFactors, Location, SensorDataContext, TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::MetadataProvider;
use crate::error::{MetadataError, Result};

pub const SENSORS_FILE: &str = "sensors.json";
pub const LOCATIONS_FILE: &str = "locations.json";

/// A sensor and its deployment history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorRecord {
    pub sensor_id: String,
    pub serial_number: u32,
    #[serde(default)]
    pub setups: Vec<SetupRecord>,
    #[serde(default)]
    pub calibration: Option<CalibrationFactors>,
}

/// One deployment of a sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRecord {
    pub from_datetime: DateTime<Utc>,
    pub to_datetime: DateTime<Utc>,
    pub value: SetupValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupValue {
    pub location_id: String,
    /// Ground pressure source, defaults to the sensor id
    #[serde(default)]
    pub pressure_data_source: Option<String>,
    #[serde(default)]
    pub utc_offset: f64,
}

/// Metadata held in memory, queried by the queue generator
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    sensors: BTreeMap<String, SensorRecord>,
    locations: HashMap<String, Location>,
}

impl MetadataStore {
    pub fn new(sensors: Vec<SensorRecord>, locations: Vec<Location>) -> Self {
        Self {
            sensors: sensors
                .into_iter()
                .map(|s| (s.sensor_id.clone(), s))
                .collect(),
            locations: locations
                .into_iter()
                .map(|l| (l.location_id.clone(), l))
                .collect(),
        }
    }

    /// Parses the two metadata documents
    pub fn from_json(sensors_json: &str, locations_json: &str) -> Result<Self> {
        let sensors: Vec<SensorRecord> =
            serde_json::from_str(sensors_json).map_err(|source| MetadataError::ParseError {
                file: SENSORS_FILE.to_string(),
                source,
            })?;
        let locations: Vec<Location> =
            serde_json::from_str(locations_json).map_err(|source| MetadataError::ParseError {
                file: LOCATIONS_FILE.to_string(),
                source,
            })?;
        debug!(
            "Parsed metadata with {} sensor(s) and {} location(s)",
            sensors.len(),
            locations.len()
        );
        Ok(Self::new(sensors, locations))
    }

    /// Loads metadata from a local directory
    ///
    /// Returns `Ok(None)` if the directory does not contain both files.
    pub fn load_local(dir: &Path) -> Result<Option<Self>> {
        let sensors_path = dir.join(SENSORS_FILE);
        let locations_path = dir.join(LOCATIONS_FILE);
        if !sensors_path.is_file() || !locations_path.is_file() {
            return Ok(None);
        }

        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                MetadataError::Unavailable(format!("failed to read {}: {}", path.display(), e))
            })
        };
        Self::from_json(&read(&sensors_path)?, &read(&locations_path)?).map(Some)
    }

    fn sensor(&self, sensor_id: &str) -> Result<&SensorRecord> {
        self.sensors
            .get(sensor_id)
            .ok_or_else(|| MetadataError::UnknownSensor(sensor_id.to_string()))
    }

    fn location(&self, sensor_id: &str, location_id: &str) -> Result<&Location> {
        self.locations
            .get(location_id)
            .ok_or_else(|| MetadataError::MalformedRecord {
                sensor_id: sensor_id.to_string(),
                reason: format!("unknown location '{}'", location_id),
            })
    }

    /// Validates one sensor's setups and returns them sorted by start
    fn checked_setups<'a>(&'a self, sensor: &'a SensorRecord) -> Result<Vec<&'a SetupRecord>> {
        let mut setups: Vec<&SetupRecord> = sensor.setups.iter().collect();
        for setup in &setups {
            if setup.from_datetime >= setup.to_datetime {
                return Err(MetadataError::MalformedRecord {
                    sensor_id: sensor.sensor_id.clone(),
                    reason: format!(
                        "setup starting {} does not end after it starts",
                        setup.from_datetime
                    ),
                });
            }
            self.location(&sensor.sensor_id, &setup.value.location_id)?;
        }
        setups.sort_by_key(|s| s.from_datetime);
        Ok(setups)
    }
}

impl MetadataProvider for MetadataStore {
    fn sensor_ids(&self) -> Vec<String> {
        self.sensors.keys().cloned().collect()
    }

    fn location_windows(&self, sensor_id: &str) -> Result<Vec<TimeWindow>> {
        let sensor = self.sensor(sensor_id)?;
        Ok(self
            .checked_setups(sensor)?
            .into_iter()
            .map(|s| TimeWindow::new(s.from_datetime, s.to_datetime))
            .collect())
    }

    fn get_contexts(
        &self,
        sensor_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorDataContext>> {
        let sensor = self.sensor(sensor_id)?;
        let requested = TimeWindow::new(from, to);

        let mut contexts = Vec::new();
        for setup in self.checked_setups(sensor)? {
            let setup_window = TimeWindow::new(setup.from_datetime, setup.to_datetime);
            let Some(overlap) = setup_window.intersect(&requested) else {
                continue;
            };
            let location = self.location(sensor_id, &setup.value.location_id)?;
            contexts.push(SensorDataContext {
                sensor_id: sensor.sensor_id.clone(),
                serial_number: sensor.serial_number,
                from_datetime: overlap.from,
                to_datetime: overlap.to,
                location: location.clone(),
                pressure_data_source: setup
                    .value
                    .pressure_data_source
                    .clone()
                    .unwrap_or_else(|| sensor.sensor_id.clone()),
                utc_offset: setup.value.utc_offset,
                calibration: sensor.calibration.clone(),
            });
        }
        Ok(contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const SENSORS: &str = r#"[
        {
            "sensor_id": "mc",
            "serial_number": 115,
            "setups": [
                {
                    "from_datetime": "2022-06-01T00:00:00Z",
                    "to_datetime": "2022-06-02T12:00:00Z",
                    "value": { "location_id": "TUM_I" }
                },
                {
                    "from_datetime": "2022-06-02T12:00:00Z",
                    "to_datetime": "2022-06-30T00:00:00Z",
                    "value": { "location_id": "FEL", "pressure_data_source": "fel-station" }
                }
            ]
        },
        {
            "sensor_id": "broken",
            "serial_number": 1,
            "setups": [
                {
                    "from_datetime": "2022-06-01T00:00:00Z",
                    "to_datetime": "2022-06-02T00:00:00Z",
                    "value": { "location_id": "NOWHERE" }
                }
            ]
        }
    ]"#;

    const LOCATIONS: &str = r#"[
        { "location_id": "TUM_I", "lat": 48.151, "lon": 11.569, "alt": 539 },
        { "location_id": "FEL", "details": "Feldkirchen", "lat": 48.148, "lon": 11.73, "alt": 536 }
    ]"#;

    fn store() -> MetadataStore {
        MetadataStore::from_json(SENSORS, LOCATIONS).unwrap()
    }

    #[test]
    fn test_relocation_splits_a_day_into_two_contexts() {
        let day = TimeWindow::day(NaiveDate::from_ymd_opt(2022, 6, 2).unwrap());
        let contexts = store().get_contexts("mc", day.from, day.to).unwrap();

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].location.location_id, "TUM_I");
        assert_eq!(contexts[0].pressure_data_source, "mc");
        assert_eq!(
            contexts[0].to_datetime,
            Utc.with_ymd_and_hms(2022, 6, 2, 12, 0, 0).unwrap()
        );
        assert_eq!(contexts[1].location.location_id, "FEL");
        assert_eq!(contexts[1].pressure_data_source, "fel-station");
        assert!(!contexts[1].covers_full_day());
    }

    #[test]
    fn test_full_day_context() {
        let day = TimeWindow::day(NaiveDate::from_ymd_opt(2022, 6, 10).unwrap());
        let contexts = store().get_contexts("mc", day.from, day.to).unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].covers_full_day());
    }

    #[test]
    fn test_record_errors() {
        let store = store();
        let err = store.location_windows("broken").unwrap_err();
        assert!(matches!(err, MetadataError::MalformedRecord { .. }));
        assert!(err.is_record_error());

        let err = store.location_windows("zz").unwrap_err();
        assert!(matches!(err, MetadataError::UnknownSensor(_)));
    }

    #[test]
    fn test_load_local() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MetadataStore::load_local(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(SENSORS_FILE), SENSORS).unwrap();
        std::fs::write(dir.path().join(LOCATIONS_FILE), LOCATIONS).unwrap();
        let store = MetadataStore::load_local(dir.path()).unwrap().unwrap();
        assert_eq!(store.sensor_ids(), vec!["broken".to_string(), "mc".to_string()]);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let err = MetadataStore::from_json("[", LOCATIONS).unwrap_err();
        assert!(matches!(err, MetadataError::ParseError { .. }));
        assert!(!err.is_record_error());
    }
}
