//! Retrieval job domain types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::context::{CalibrationFactors, SensorDataContext};

/// The external retrieval program a job runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RetrievalAlgorithm {
    #[serde(rename = "proffast-1.0")]
    Proffast10,
    #[serde(rename = "proffast-2.2")]
    Proffast22,
    #[serde(rename = "proffast-2.3")]
    Proffast23,
    #[serde(rename = "proffast-2.4")]
    Proffast24,
    #[serde(rename = "proffast-2.4.1")]
    Proffast241,
}

impl RetrievalAlgorithm {
    pub const ALL: [RetrievalAlgorithm; 5] = [
        Self::Proffast10,
        Self::Proffast22,
        Self::Proffast23,
        Self::Proffast24,
        Self::Proffast241,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proffast10 => "proffast-1.0",
            Self::Proffast22 => "proffast-2.2",
            Self::Proffast23 => "proffast-2.3",
            Self::Proffast24 => "proffast-2.4",
            Self::Proffast241 => "proffast-2.4.1",
        }
    }

    /// Whether containers for this algorithm carry a rendered config file
    pub fn uses_pylot_config(&self) -> bool {
        !matches!(self, Self::Proffast10)
    }

    /// Where the program's source archive is published
    pub fn archive_url(&self) -> &'static str {
        match self {
            Self::Proffast10 => {
                "https://www.imk-asf.kit.edu/downloads/Coccon-SW/2021-03-08_prf96-EM27-fast.zip"
            }
            Self::Proffast22 => "https://www.imk-asf.kit.edu/downloads/Coccon-SW/PROFFASTv2.2.zip",
            Self::Proffast23 => "https://www.imk-asf.kit.edu/downloads/Coccon-SW/PROFFASTv2.3.zip",
            Self::Proffast24 => "https://www.imk-asf.kit.edu/downloads/Coccon-SW/PROFFASTv2.4.zip",
            Self::Proffast241 => {
                "https://www.imk-asf.kit.edu/downloads/Coccon-SW/PROFFASTv2.4.1.zip"
            }
        }
    }
}

impl std::fmt::Display for RetrievalAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RetrievalAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown retrieval algorithm '{}'", s))
    }
}

/// Atmospheric profile model determining which `.map` files a day needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtmosphericProfileModel {
    /// One profile per day
    GGG2014,
    /// One profile every three hours
    GGG2020,
}

/// One profile file: its name in the profiles archive and its name once
/// staged into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    pub source_name: String,
    pub staged_name: String,
}

impl AtmosphericProfileModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GGG2014 => "GGG2014",
            Self::GGG2020 => "GGG2020",
        }
    }

    /// Lists the profile files a sensor needs for one date
    pub fn required_files(
        &self,
        sensor_id: &str,
        date: NaiveDate,
        coordinates_slug: &str,
    ) -> Vec<ProfileFile> {
        let date_string = date.format("%Y%m%d").to_string();
        match self {
            Self::GGG2014 => vec![ProfileFile {
                source_name: format!("{}_{}.map", date_string, coordinates_slug),
                staged_name: format!("{}{}.map", sensor_id, date_string),
            }],
            Self::GGG2020 => {
                let (lat_part, lon_part) = coordinates_slug.split_at(3.min(coordinates_slug.len()));
                (0..24)
                    .step_by(3)
                    .map(|hour| ProfileFile {
                        source_name: format!("{}{:02}_{}.map", date_string, hour, coordinates_slug),
                        staged_name: format!(
                            "{}_{}_{}_{}{:02}Z.map",
                            sensor_id, lat_part, lon_part, date_string, hour
                        ),
                    })
                    .collect()
            }
        }
    }
}

impl std::fmt::Display for AtmosphericProfileModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instrument line shape correction of one sensor, per channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IlsCorrection {
    pub channel1_me: f64,
    pub channel1_pe: f64,
    pub channel2_me: f64,
    pub channel2_pe: f64,
}

/// Per-job settings carried through to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSettings {
    /// Appended to the output slug so that several configurations of the
    /// same algorithm can coexist in one results tree
    #[serde(default)]
    pub output_suffix: Option<String>,
    /// Publish the program's calibrated binary spectra as well
    #[serde(default)]
    pub store_binary_spectra: bool,
    #[serde(default = "default_dc_min_threshold")]
    pub dc_min_threshold: f64,
    #[serde(default = "default_dc_var_threshold")]
    pub dc_var_threshold: f64,
    /// Pass the mean ground pressure around solar noon to the program
    /// instead of letting it read pressure from the profiles
    #[serde(default)]
    pub use_local_pressure_in_pcxs: bool,
    /// ILS corrections by sensor id
    #[serde(default)]
    pub custom_ils: BTreeMap<String, IlsCorrection>,
    /// Pressure calibration factors by sensor id
    #[serde(default)]
    pub pressure_calibration_factors: BTreeMap<String, f64>,
    /// Pressure calibration offsets by sensor id
    #[serde(default)]
    pub pressure_calibration_offsets: BTreeMap<String, f64>,
}

fn default_dc_min_threshold() -> f64 {
    0.05
}

fn default_dc_var_threshold() -> f64 {
    0.10
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            output_suffix: None,
            store_binary_spectra: false,
            dc_min_threshold: default_dc_min_threshold(),
            dc_var_threshold: default_dc_var_threshold(),
            use_local_pressure_in_pcxs: false,
            custom_ils: BTreeMap::new(),
            pressure_calibration_factors: BTreeMap::new(),
            pressure_calibration_offsets: BTreeMap::new(),
        }
    }
}

impl JobSettings {
    /// Calibration applied to a sensor's ground pressure
    ///
    /// Factors and offsets configured for the job take precedence over the
    /// calibration the metadata carries for the sensor.
    pub fn pressure_calibration(&self, ctx: &SensorDataContext) -> CalibrationFactors {
        let metadata = ctx.calibration.clone().unwrap_or_default();
        CalibrationFactors {
            pressure_factor: self
                .pressure_calibration_factors
                .get(&ctx.sensor_id)
                .copied()
                .unwrap_or(metadata.pressure_factor),
            pressure_offset: self
                .pressure_calibration_offsets
                .get(&ctx.sensor_id)
                .copied()
                .unwrap_or(metadata.pressure_offset),
        }
    }
}

/// One unit of work in the retrieval queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalJob {
    pub retrieval_algorithm: RetrievalAlgorithm,
    pub atmospheric_profile_model: AtmosphericProfileModel,
    #[serde(default)]
    pub settings: JobSettings,
    pub sensor_data_context: SensorDataContext,
}

impl RetrievalJob {
    pub fn slug(&self) -> String {
        self.sensor_data_context
            .slug(self.settings.output_suffix.as_deref())
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_data_context.sensor_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_round_trips_through_its_name() {
        for algorithm in RetrievalAlgorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<RetrievalAlgorithm>(), Ok(algorithm));
        }
        assert!("proffast-9".parse::<RetrievalAlgorithm>().is_err());
    }

    #[test]
    fn test_algorithm_serde_name() {
        let json = serde_json::to_string(&RetrievalAlgorithm::Proffast241).unwrap();
        assert_eq!(json, "\"proffast-2.4.1\"");
    }

    #[test]
    fn test_daily_model_needs_one_file() {
        let date = NaiveDate::from_ymd_opt(2022, 6, 2).unwrap();
        let files = AtmosphericProfileModel::GGG2014.required_files("mc", date, "48N012E");
        assert_eq!(
            files,
            vec![ProfileFile {
                source_name: "20220602_48N012E.map".to_string(),
                staged_name: "mc20220602.map".to_string(),
            }]
        );
    }

    #[test]
    fn test_subdaily_model_needs_eight_files() {
        let date = NaiveDate::from_ymd_opt(2022, 6, 2).unwrap();
        let files = AtmosphericProfileModel::GGG2020.required_files("mc", date, "48N012E");
        assert_eq!(files.len(), 8);
        assert_eq!(files[0].source_name, "2022060200_48N012E.map");
        assert_eq!(files[7].source_name, "2022060221_48N012E.map");
        assert_eq!(files[1].staged_name, "mc_48N_012E_2022060203Z.map");
    }

    #[test]
    fn test_job_calibration_overrides_metadata() {
        let mut ctx = crate::domain::context::tests::full_day("mc", 2022, 6, 2);
        let mut settings = JobSettings::default();
        assert_eq!(settings.pressure_calibration(&ctx), CalibrationFactors::default());

        ctx.calibration = Some(CalibrationFactors {
            pressure_factor: 1.002,
            pressure_offset: 0.3,
        });
        settings.pressure_calibration_offsets.insert("mc".to_string(), -0.1);
        settings.pressure_calibration_factors.insert("ma".to_string(), 0.9);
        assert_eq!(
            settings.pressure_calibration(&ctx),
            CalibrationFactors {
                pressure_factor: 1.002,
                pressure_offset: -0.1,
            }
        );
    }
}
