//! Input staging
//!
//! Copies or links everything the retrieval program reads into the
//! container's input directory:
//! - atmospheric profiles into `map/`
//! - one merged ground pressure file into `log/`
//! - interferograms, symlinked as `ifg/{YYMMDD}/{YYMMDD}SN.{n}`

use retrieval_core::config::Config;
use retrieval_core::domain::session::Session;
use retrieval_core::layout::{
    PlaceholderValues, compile_pattern, interferogram_dir, locate_profile, matching_files,
    pressure_dir,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A required input is missing or unusable
///
/// The message is what ends up in the input warnings list.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Inputs incomplete (atmospheric profiles): {0}")]
    Profiles(String),

    #[error("Inputs incomplete (datalogger files): {0}")]
    Pressure(String),

    #[error("Inputs incomplete (ifg files): {0}")]
    Interferograms(String),
}

/// What was staged for one session
#[derive(Debug)]
pub struct StagedInputs {
    pub profile_count: usize,
    pub pressure_rows: usize,
    /// Source files the staged interferogram links point to
    pub interferograms: Vec<PathBuf>,
}

pub struct InputStager<'a> {
    config: &'a Config,
    session: &'a Session,
}

impl<'a> InputStager<'a> {
    pub fn new(config: &'a Config, session: &'a Session) -> Self {
        Self { config, session }
    }

    /// Stages profiles, pressure data and interferograms, in that order
    pub fn stage_all(&self) -> Result<StagedInputs, StagingError> {
        let profile_count = self.stage_profiles()?;
        let pressure_rows = self.stage_pressure()?;
        let interferograms = self.stage_interferograms()?;
        Ok(StagedInputs {
            profile_count,
            pressure_rows,
            interferograms,
        })
    }

    fn input_dir(&self, name: &str) -> PathBuf {
        self.session.container.input_path().join(name)
    }

    pub fn stage_profiles(&self) -> Result<usize, StagingError> {
        let ctx = &self.session.job.sensor_data_context;
        let model = self.session.job.atmospheric_profile_model;
        let profiles_root = &self.config.general.data.atmospheric_profiles;

        let map_dir = self.input_dir("map");
        std::fs::create_dir_all(&map_dir).map_err(|e| {
            StagingError::Profiles(format!("failed to create {}: {}", map_dir.display(), e))
        })?;

        let files = model.required_files(&ctx.sensor_id, ctx.date(), &ctx.coordinates_slug());
        for file in &files {
            let source = locate_profile(profiles_root, model, &file.source_name).ok_or_else(|| {
                StagingError::Profiles(format!(
                    "{} not found in {}",
                    file.source_name,
                    profiles_root.join(model.as_str()).display()
                ))
            })?;
            std::fs::copy(&source, map_dir.join(&file.staged_name)).map_err(|e| {
                StagingError::Profiles(format!("failed to copy {}: {}", source.display(), e))
            })?;
            debug!("Staged {} as {}", source.display(), file.staged_name);
        }
        Ok(files.len())
    }

    /// Merges all matching pressure files of the day into one file
    ///
    /// The header is taken from the first file. Returns the number of data
    /// rows written.
    pub fn stage_pressure(&self) -> Result<usize, StagingError> {
        let ctx = &self.session.job.sensor_data_context;
        let general = &self.config.retrieval.general;
        let source = &ctx.pressure_data_source;
        let date = ctx.date();

        let pattern = compile_pattern(
            &general.pressure_file_regex,
            &PlaceholderValues::new(&ctx.sensor_id, source, date),
        )
        .map_err(|e| StagingError::Pressure(format!("invalid file pattern: {}", e)))?;
        let dir = pressure_dir(&self.config.general.data.ground_pressure, source);
        let names = matching_files(&dir, &pattern).map_err(|e| {
            StagingError::Pressure(format!("failed to list {}: {}", dir.display(), e))
        })?;
        if names.is_empty() {
            return Err(StagingError::Pressure(format!(
                "no files matching \"{}\" in {}",
                pattern,
                dir.display()
            )));
        }

        let mut header: Option<String> = None;
        let mut rows = Vec::new();
        for name in &names {
            let path = dir.join(name);
            let content = std::fs::read_to_string(&path).map_err(|e| {
                StagingError::Pressure(format!("failed to read {}: {}", path.display(), e))
            })?;
            let mut lines = content.lines().filter(|l| !l.trim().is_empty());
            let Some(first) = lines.next() else {
                continue;
            };
            header.get_or_insert_with(|| first.to_string());
            rows.extend(lines.map(str::to_string));
        }

        if rows.len() < general.pressure_min_rows {
            return Err(StagingError::Pressure(format!(
                "{} contains only {} data row(s), at least {} are required",
                dir.display(),
                rows.len(),
                general.pressure_min_rows
            )));
        }
        if rows.len() < general.pressure_expected_rows {
            warn!(
                "Pressure data of {} on {} has only {} of {} expected rows",
                source,
                date,
                rows.len(),
                general.pressure_expected_rows
            );
        }

        let log_dir = self.input_dir("log");
        let target = log_dir.join(format!(
            "ground-pressure-{}-{}.csv",
            source,
            date.format("%Y%m%d")
        ));
        let mut content = header.unwrap_or_default();
        content.push('\n');
        for row in &rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::create_dir_all(&log_dir)
            .and_then(|_| std::fs::write(&target, content))
            .map_err(|e| {
                StagingError::Pressure(format!("failed to write {}: {}", target.display(), e))
            })?;
        debug!("Merged {} pressure file(s) into {}", names.len(), target.display());
        Ok(rows.len())
    }

    /// Links the day's interferograms into the container
    ///
    /// Returns the absolute paths of the linked source files.
    pub fn stage_interferograms(&self) -> Result<Vec<PathBuf>, StagingError> {
        let ctx = &self.session.job.sensor_data_context;
        let general = &self.config.retrieval.general;
        let date = ctx.date();

        let pattern = compile_pattern(
            &general.ifg_file_regex,
            &PlaceholderValues::new(&ctx.sensor_id, &ctx.pressure_data_source, date),
        )
        .map_err(|e| StagingError::Interferograms(format!("invalid file pattern: {}", e)))?;
        let dir = interferogram_dir(&self.config.general.data.interferograms, &ctx.sensor_id, date);
        let names = matching_files(&dir, &pattern).map_err(|e| {
            StagingError::Interferograms(format!("failed to list {}: {}", dir.display(), e))
        })?;
        if names.is_empty() {
            return Err(StagingError::Interferograms(format!(
                "no ifg input files in {}",
                dir.display()
            )));
        }

        let dir = std::path::absolute(&dir).map_err(|e| {
            StagingError::Interferograms(format!("failed to resolve {}: {}", dir.display(), e))
        })?;
        let short_date = date.format("%y%m%d").to_string();
        let target_dir = self.input_dir("ifg").join(&short_date);
        std::fs::create_dir_all(&target_dir).map_err(|e| {
            StagingError::Interferograms(format!("failed to create {}: {}", target_dir.display(), e))
        })?;

        let mut sources = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let source = dir.join(name);
            let link = target_dir.join(format!("{}SN.{}", short_date, index + 1));
            symlink(&source, &link).map_err(|e| {
                StagingError::Interferograms(format!("failed to link {}: {}", source.display(), e))
            })?;
            sources.push(source);
        }
        Ok(sources)
    }
}

fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(link) {
        Ok(_) => std::fs::remove_file(link)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(source, link)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use retrieval_core::domain::container::{Container, INPUT_SUBDIRS};
    use retrieval_core::domain::context::{Location, SensorDataContext};
    use retrieval_core::domain::job::{
        AtmosphericProfileModel, JobSettings, RetrievalAlgorithm, RetrievalJob,
    };

    pub(crate) fn config(root: &Path) -> Config {
        let content = format!(
            r#"
            [general.data]
            interferograms = "{root}/ifgs"
            ground_pressure = "{root}/pressure"
            atmospheric_profiles = "{root}/profiles"
            results = "{root}/results"

            [retrieval.general]
            containers_root = "{root}/containers"
            algorithms_root = "{root}/algorithms"
            logs_root = "{root}/logs"
            program_runtime = "sh"
            program_entrypoint = "run.sh"
            pressure_min_rows = 2
            pressure_expected_rows = 4

            [[retrieval.jobs]]
            retrieval_algorithm = "proffast-2.4"
            atmospheric_profile_model = "GGG2014"
            sensor_ids = ["mc"]
            from_date = "2022-06-01"
            to_date = "2022-06-30"
            "#,
            root = root.display()
        );
        Config::parse(&content).unwrap()
    }

    /// A full-day session of sensor `mc` on 2022-06-02 with its container
    /// directories created
    pub(crate) fn session(root: &Path) -> Session {
        let job = RetrievalJob {
            retrieval_algorithm: RetrievalAlgorithm::Proffast24,
            atmospheric_profile_model: AtmosphericProfileModel::GGG2014,
            settings: JobSettings::default(),
            sensor_data_context: SensorDataContext {
                sensor_id: "mc".to_string(),
                serial_number: 115,
                from_datetime: Utc.with_ymd_and_hms(2022, 6, 2, 0, 0, 0).unwrap(),
                to_datetime: Utc.with_ymd_and_hms(2022, 6, 2, 23, 59, 59).unwrap(),
                location: Location {
                    location_id: "TUM_I".to_string(),
                    details: String::new(),
                    lat: 48.151,
                    lon: 11.569,
                    alt: 539.0,
                },
                pressure_data_source: "mc".to_string(),
                utc_offset: 0.0,
                calibration: None,
            },
        };
        let container = Container::new(
            job.retrieval_algorithm,
            "ab12-cd34".to_string(),
            &root.join("containers"),
        );
        for dir in container.directories() {
            std::fs::create_dir_all(dir).unwrap();
        }
        for sub in INPUT_SUBDIRS {
            std::fs::create_dir_all(container.input_path().join(sub)).unwrap();
        }
        Session { job, container }
    }

    /// Writes every input of `mc` on 2022-06-02
    pub(crate) fn provide_inputs(root: &Path) {
        let ifg_dir = root.join("ifgs/mc/20220602");
        std::fs::create_dir_all(&ifg_dir).unwrap();
        for name in ["mc20220602.ifg.002", "mc20220602.ifg.001", "mc20220602.txt"] {
            std::fs::write(ifg_dir.join(name), name).unwrap();
        }

        let pressure_dir = root.join("pressure/mc");
        std::fs::create_dir_all(&pressure_dir).unwrap();
        std::fs::write(
            pressure_dir.join("pressure-mc-20220602.csv"),
            "utc,pressure\n00:00,950.1\n00:01,950.2\n00:02,950.2\n00:03,950.3\n",
        )
        .unwrap();

        let profile_dir = root.join("profiles/GGG2014");
        std::fs::create_dir_all(&profile_dir).unwrap();
        std::fs::write(profile_dir.join("20220602_48N012E.map"), "map").unwrap();
    }

    #[test]
    fn test_stage_all() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        provide_inputs(dir.path());

        let staged = InputStager::new(&config, &session).stage_all().unwrap();
        assert_eq!(staged.profile_count, 1);
        assert_eq!(staged.pressure_rows, 4);
        assert_eq!(staged.interferograms.len(), 2);

        let inputs = session.container.input_path();
        assert!(inputs.join("map/mc20220602.map").is_file());
        assert!(inputs.join("log/ground-pressure-mc-20220602.csv").is_file());

        let first = std::fs::read_link(inputs.join("ifg/220602/220602SN.1")).unwrap();
        assert!(first.ends_with("mc20220602.ifg.001"));
        assert!(first.is_absolute());
        let second = std::fs::read_link(inputs.join("ifg/220602/220602SN.2")).unwrap();
        assert!(second.ends_with("mc20220602.ifg.002"));
        assert!(!inputs.join("ifg/220602/220602SN.3").exists());
    }

    #[test]
    fn test_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        provide_inputs(dir.path());
        std::fs::remove_file(dir.path().join("profiles/GGG2014/20220602_48N012E.map")).unwrap();

        let err = InputStager::new(&config, &session).stage_all().unwrap_err();
        assert!(matches!(err, StagingError::Profiles(_)));
        assert!(err.to_string().starts_with("Inputs incomplete (atmospheric profiles)"));
    }

    #[test]
    fn test_pressure_files_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.retrieval.general.pressure_file_regex =
            r"^pressure-$(SOURCE)-$(DATE)(-\d+)?\.csv$".to_string();
        let session = session(dir.path());
        provide_inputs(dir.path());
        std::fs::write(
            dir.path().join("pressure/mc/pressure-mc-20220602-2.csv"),
            "utc,pressure\n12:00,949.0\n",
        )
        .unwrap();

        let rows = InputStager::new(&config, &session).stage_pressure().unwrap();
        assert_eq!(rows, 5);

        let merged = std::fs::read_to_string(
            session
                .container
                .input_path()
                .join("log/ground-pressure-mc-20220602.csv"),
        )
        .unwrap();
        assert_eq!(merged.lines().next(), Some("utc,pressure"));
        assert_eq!(merged.lines().filter(|l| *l == "utc,pressure").count(), 1);
        assert_eq!(merged.lines().count(), 6);
    }

    #[test]
    fn test_pressure_below_minimum_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        provide_inputs(dir.path());
        std::fs::write(
            dir.path().join("pressure/mc/pressure-mc-20220602.csv"),
            "utc,pressure\n00:00,950.1\n",
        )
        .unwrap();

        let err = InputStager::new(&config, &session).stage_pressure().unwrap_err();
        assert!(matches!(err, StagingError::Pressure(_)));
    }

    #[test]
    fn test_pressure_below_expected_rows_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        provide_inputs(dir.path());
        std::fs::write(
            dir.path().join("pressure/mc/pressure-mc-20220602.csv"),
            "utc,pressure\n00:00,950.1\n00:01,950.1\n",
        )
        .unwrap();

        assert_eq!(InputStager::new(&config, &session).stage_pressure().unwrap(), 2);
    }

    #[test]
    fn test_no_interferograms() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        provide_inputs(dir.path());
        for name in ["mc20220602.ifg.001", "mc20220602.ifg.002"] {
            std::fs::remove_file(dir.path().join("ifgs/mc/20220602").join(name)).unwrap();
        }

        let err = InputStager::new(&config, &session)
            .stage_interferograms()
            .unwrap_err();
        assert!(matches!(err, StagingError::Interferograms(_)));
        assert!(err.to_string().contains("no ifg input files"));
    }
}
