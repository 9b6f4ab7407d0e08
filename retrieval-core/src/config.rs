//! Run configuration
//!
//! One TOML file configures a whole run: where inputs live, where results
//! go, how many workers may run at once and which jobs to generate. The
//! orchestrator, every worker and the CLI read the same file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::job::{AtmosphericProfileModel, JobSettings, RetrievalAlgorithm};
use crate::layout::{PlaceholderValues, expand_placeholders};

/// Errors raised while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Roots of the input and output filesystem trees
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// `{interferograms}/{sensor_id}/{YYYYMMDD}/...`
    pub interferograms: PathBuf,
    /// `{ground_pressure}/{source}/...`
    pub ground_pressure: PathBuf,
    /// `{atmospheric_profiles}/{model}/...`
    pub atmospheric_profiles: PathBuf,
    /// `{results}/{algorithm}/{model}/{sensor_id}/{successful|failed}/{slug}`
    pub results: PathBuf,
}

/// Where sensor and location metadata is read from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    /// Directory containing `sensors.json` and `locations.json`
    #[serde(default = "default_metadata_dir")]
    pub local_dir: PathBuf,
    /// Base URL serving the same two files, used if the local files are absent
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            local_dir: default_metadata_dir(),
            remote_url: None,
            access_token: None,
        }
    }
}

/// How much detail the queue generator logs per filtering step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueVerbosity {
    #[default]
    Compact,
    Verbose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub general: RetrievalGeneralConfig,
    pub jobs: Vec<JobConfig>,
}

/// Settings of the scheduler and of every worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrievalGeneralConfig {
    /// Maximum number of worker processes alive at once
    pub max_process_count: usize,
    /// Seconds between two scheduler ticks
    pub poll_interval_secs: u64,
    pub containers_root: PathBuf,
    /// Holds one `{algorithm}/` directory per retrieval program
    pub algorithms_root: PathBuf,
    pub logs_root: PathBuf,
    /// Interpreter used to launch the program entrypoint, e.g. `python3`
    pub program_runtime: String,
    /// Entrypoint file name inside `{algorithms_root}/{algorithm}/`
    pub program_entrypoint: String,
    /// Worker binary, defaults to `retrieval-runner` next to the orchestrator
    pub worker_executable: Option<PathBuf>,
    pub ifg_file_regex: String,
    pub pressure_file_regex: String,
    /// Below this many data rows a pressure file is rejected
    pub pressure_min_rows: usize,
    /// Below this many data rows a pressure file is accepted with a warning
    pub pressure_expected_rows: usize,
    pub queue_verbosity: QueueVerbosity,
}

impl Default for RetrievalGeneralConfig {
    fn default() -> Self {
        Self {
            max_process_count: 9,
            poll_interval_secs: 15,
            containers_root: PathBuf::from("data/containers"),
            algorithms_root: PathBuf::from("algorithms"),
            logs_root: PathBuf::from("data/logs"),
            program_runtime: "python3".to_string(),
            program_entrypoint: "run_pylot_container.py".to_string(),
            worker_executable: None,
            ifg_file_regex: r"^$(SENSOR_ID)$(DATE).*\.\d+$".to_string(),
            pressure_file_regex: r"^pressure-$(SOURCE)-$(DATE)\.csv$".to_string(),
            pressure_min_rows: 10,
            pressure_expected_rows: 1440,
            queue_verbosity: QueueVerbosity::Compact,
        }
    }
}

/// One configured retrieval job, expanded into many queued jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub retrieval_algorithm: RetrievalAlgorithm,
    pub atmospheric_profile_model: AtmosphericProfileModel,
    pub sensor_ids: Vec<String>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default)]
    pub settings: JobSettings,
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("data/metadata")
}

impl Config {
    /// Reads and parses a configuration file without validating it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let general = &self.retrieval.general;

        if general.max_process_count == 0 {
            return Err(invalid("max_process_count must be greater than 0"));
        }

        if general.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be greater than 0"));
        }

        if general.pressure_min_rows > general.pressure_expected_rows {
            return Err(invalid(
                "pressure_min_rows must not exceed pressure_expected_rows",
            ));
        }

        if self.retrieval.jobs.is_empty() {
            return Err(invalid("at least one retrieval job must be configured"));
        }

        for (index, job) in self.retrieval.jobs.iter().enumerate() {
            if job.sensor_ids.is_empty() {
                return Err(invalid(&format!("job {}: sensor_ids cannot be empty", index + 1)));
            }
            if job.from_date > job.to_date {
                return Err(invalid(&format!(
                    "job {}: from_date {} is after to_date {}",
                    index + 1,
                    job.from_date,
                    job.to_date
                )));
            }
            let bad_suffix = job
                .settings
                .output_suffix
                .as_deref()
                .is_some_and(|s| s.is_empty() || s.contains('/'));
            if bad_suffix {
                return Err(invalid(&format!(
                    "job {}: output_suffix must be a non-empty name",
                    index + 1
                )));
            }
            for (name, value) in [
                ("dc_min_threshold", job.settings.dc_min_threshold),
                ("dc_var_threshold", job.settings.dc_var_threshold),
            ] {
                if !(0.001..=0.999).contains(&value) {
                    return Err(invalid(&format!(
                        "job {}: {} must be between 0.001 and 0.999",
                        index + 1,
                        name
                    )));
                }
            }
        }

        for (name, pattern) in [
            ("ifg_file_regex", &general.ifg_file_regex),
            ("pressure_file_regex", &general.pressure_file_regex),
        ] {
            let sample = expand_placeholders(pattern, &PlaceholderValues::sample());
            if let Err(e) = regex::Regex::new(&sample) {
                return Err(invalid(&format!("{} is not a valid regex: {}", name, e)));
            }
        }

        Ok(())
    }

    /// Interval between two scheduler ticks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.retrieval.general.poll_interval_secs)
    }

    /// Every distinct algorithm referenced by a configured job
    pub fn algorithms(&self) -> BTreeSet<RetrievalAlgorithm> {
        self.retrieval
            .jobs
            .iter()
            .map(|job| job.retrieval_algorithm)
            .collect()
    }

    /// The configuration as JSON with secrets replaced, for manifests
    pub fn redacted_json(&self) -> serde_json::Value {
        let mut copy = self.clone();
        if copy.general.metadata.access_token.is_some() {
            copy.general.metadata.access_token = Some("REDACTED".to_string());
        }
        serde_json::to_value(copy).unwrap_or(serde_json::Value::Null)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MINIMAL: &str = r#"
        [general.data]
        interferograms = "/data/ifgs"
        ground_pressure = "/data/pressure"
        atmospheric_profiles = "/data/profiles"
        results = "/data/results"

        [[retrieval.jobs]]
        retrieval_algorithm = "proffast-2.4"
        atmospheric_profile_model = "GGG2020"
        sensor_ids = ["ma", "mc"]
        from_date = "2022-06-01"
        to_date = "2022-06-30"
    "#;

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.retrieval.general.max_process_count, 9);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.retrieval.jobs[0].settings, JobSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::parse(MINIMAL).unwrap();

        config.retrieval.general.max_process_count = 0;
        assert!(config.validate().is_err());
        config.retrieval.general.max_process_count = 2;

        config.retrieval.jobs[0].from_date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(config.validate().is_err());
        config.retrieval.jobs[0].from_date = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();

        config.retrieval.general.ifg_file_regex = "^$(SENSOR_ID)(".to_string();
        assert!(config.validate().is_err());
        config.retrieval.general.ifg_file_regex = "^$(SENSOR_ID)".to_string();

        config.retrieval.jobs[0].settings.dc_var_threshold = 1.5;
        assert!(config.validate().is_err());
        config.retrieval.jobs[0].settings.dc_var_threshold = 0.2;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_settings() {
        let content = format!(
            "{}{}",
            MINIMAL,
            r#"
        [retrieval.jobs.settings]
        output_suffix = "ils"
        dc_min_threshold = 0.08
        store_binary_spectra = true

        [retrieval.jobs.settings.custom_ils.mc]
        channel1_me = 0.983
        channel1_pe = -0.002
        channel2_me = 0.981
        channel2_pe = 0.001
        "#
        );
        let config = Config::parse(&content).unwrap();
        let settings = &config.retrieval.jobs[0].settings;
        assert_eq!(settings.output_suffix.as_deref(), Some("ils"));
        assert_eq!(settings.dc_min_threshold, 0.08);
        assert_eq!(settings.dc_var_threshold, 0.10);
        assert!(settings.store_binary_spectra);
        assert_eq!(settings.custom_ils["mc"].channel2_me, 0.981);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let content = format!("{}\n[extra]\nkey = 1\n", MINIMAL);
        assert!(matches!(Config::parse(&content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_redacted_json_hides_token() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.general.metadata.access_token = Some("secret".to_string());
        let json = config.redacted_json();
        assert_eq!(json["general"]["metadata"]["access_token"], "REDACTED");
        assert_eq!(config.general.metadata.access_token.as_deref(), Some("secret"));
    }
}
