//! Job queue generation
//!
//! For every configured job and every sensor on its allow-list, the generator
//! narrows the configured date range down to the contexts that can actually
//! be processed:
//!
//! 1. dates on which the sensor has location metadata
//! 2. dates with an interferogram directory that is not locked
//! 3. one or more contexts per date (a sensor may move during a day)
//! 4. contexts without a published result
//! 5. contexts with a ground pressure file
//! 6. contexts with every required atmospheric profile
//!
//! Generation only reads the filesystem.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use retrieval_core::config::{Config, JobConfig, QueueVerbosity};
use retrieval_core::domain::context::{SensorDataContext, TimeWindow};
use retrieval_core::domain::job::RetrievalJob;
use retrieval_core::layout::{
    LOCK_MARKER, OutputLocation, PlaceholderValues, compile_pattern, interferogram_dir,
    locate_profile, matching_files, pressure_dir,
};
use retrieval_metadata::{MetadataError, MetadataProvider};
use std::cmp::Reverse;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

use crate::context::RunContext;

/// Ordered jobs waiting to be dispatched
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<RetrievalJob>,
}

impl JobQueue {
    pub fn new(jobs: Vec<RetrievalJob>) -> Self {
        Self { jobs: jobs.into() }
    }

    /// Generates the queue of every configured job
    ///
    /// Jobs of one configuration entry are sorted newest date first, then by
    /// sensor id. Entries follow each other in configuration order.
    pub fn generate(ctx: &RunContext) -> Result<Self> {
        let mut jobs = Vec::new();
        for (index, job_config) in ctx.config.retrieval.jobs.iter().enumerate() {
            info!(
                "Generating retrieval queue for job {} ({}, {})",
                index + 1,
                job_config.retrieval_algorithm,
                job_config.atmospheric_profile_model
            );
            let generated = generate_for_job(&ctx.config, ctx.metadata.as_ref(), job_config)
                .with_context(|| format!("Failed to generate retrieval queue for job {}", index + 1))?;
            info!("Found {} item(s) for job {}", generated.len(), index + 1);
            jobs.extend(generated);
        }
        info!("Generated retrieval queue with {} item(s)", jobs.len());
        Ok(Self::new(jobs))
    }

    pub fn pop(&mut self) -> Option<RetrievalJob> {
        self.jobs.pop_front()
    }

    pub fn peek(&self) -> Option<&RetrievalJob> {
        self.jobs.front()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievalJob> {
        self.jobs.iter()
    }
}

/// Computes the sorted jobs of one configuration entry
pub fn generate_for_job(
    config: &Config,
    metadata: &dyn MetadataProvider,
    job_config: &JobConfig,
) -> Result<Vec<RetrievalJob>, MetadataError> {
    let verbosity = config.retrieval.general.queue_verbosity;
    let mut jobs = Vec::new();

    let mut sensor_ids: Vec<&String> = job_config.sensor_ids.iter().collect();
    sensor_ids.sort();
    sensor_ids.dedup();

    for sensor_id in sensor_ids {
        match sensor_jobs(config, metadata, job_config, sensor_id, verbosity) {
            Ok(sensor_jobs) => jobs.extend(sensor_jobs),
            Err(e) if e.is_record_error() => {
                warn!("Skipping sensor {}: {}", sensor_id, e);
            }
            Err(e) => return Err(e),
        }
    }

    jobs.sort_by_key(|job: &RetrievalJob| Reverse(job.sensor_data_context.from_datetime));
    Ok(jobs)
}

fn sensor_jobs(
    config: &Config,
    metadata: &dyn MetadataProvider,
    job_config: &JobConfig,
    sensor_id: &str,
    verbosity: QueueVerbosity,
) -> Result<Vec<RetrievalJob>, MetadataError> {
    let data = &config.general.data;
    let general = &config.retrieval.general;
    let requested = TimeWindow::date_range(job_config.from_date, job_config.to_date);

    let mut dates = BTreeSet::new();
    for window in metadata.location_windows(sensor_id)? {
        if let Some(overlap) = window.intersect(&requested) {
            dates.extend(overlap.dates());
        }
    }
    report(verbosity, sensor_id, "dates with location metadata", dates.iter());

    let dates: Vec<NaiveDate> = dates
        .into_iter()
        .filter(|date| {
            let dir = interferogram_dir(&data.interferograms, sensor_id, *date);
            dir.is_dir() && !dir.join(LOCK_MARKER).exists()
        })
        .collect();
    report(verbosity, sensor_id, "dates with unlocked interferograms", dates.iter());

    let mut contexts: Vec<SensorDataContext> = Vec::new();
    for date in &dates {
        let day = TimeWindow::day(*date);
        contexts.extend(metadata.get_contexts(sensor_id, day.from, day.to)?);
    }

    let mut jobs: Vec<RetrievalJob> = contexts
        .into_iter()
        .map(|ctx| RetrievalJob {
            retrieval_algorithm: job_config.retrieval_algorithm,
            atmospheric_profile_model: job_config.atmospheric_profile_model,
            settings: job_config.settings.clone(),
            sensor_data_context: ctx,
        })
        .collect();
    report(verbosity, sensor_id, "contexts", jobs.iter().map(|j| j.slug()));

    jobs.retain(|job| !OutputLocation::for_job(&data.results, job).is_published());
    report(verbosity, sensor_id, "unprocessed contexts", jobs.iter().map(|j| j.slug()));

    jobs.retain(|job| {
        let ctx = &job.sensor_data_context;
        let values = PlaceholderValues::new(sensor_id, &ctx.pressure_data_source, ctx.date());
        let pattern = match compile_pattern(&general.pressure_file_regex, &values) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("Invalid pressure file pattern for {}: {}", sensor_id, e);
                return false;
            }
        };
        let dir = pressure_dir(&data.ground_pressure, &ctx.pressure_data_source);
        match matching_files(&dir, &pattern) {
            Ok(files) => !files.is_empty(),
            Err(e) => {
                warn!("Failed to list {}: {}", dir.display(), e);
                false
            }
        }
    });
    report(verbosity, sensor_id, "contexts with ground pressure", jobs.iter().map(|j| j.slug()));

    jobs.retain(|job| {
        let ctx = &job.sensor_data_context;
        job.atmospheric_profile_model
            .required_files(sensor_id, ctx.date(), &ctx.coordinates_slug())
            .iter()
            .all(|file| {
                locate_profile(
                    &data.atmospheric_profiles,
                    job.atmospheric_profile_model,
                    &file.source_name,
                )
                .is_some()
            })
    });
    report(verbosity, sensor_id, "contexts with atmospheric profiles", jobs.iter().map(|j| j.slug()));

    info!("Sensor {}: {} job(s) to process", sensor_id, jobs.len());
    Ok(jobs)
}

/// Logs the survivors of one filtering step
fn report<T: ToString>(
    verbosity: QueueVerbosity,
    sensor_id: &str,
    step: &str,
    items: impl Iterator<Item = T>,
) {
    let items: Vec<String> = items.map(|item| item.to_string()).collect();
    match verbosity {
        QueueVerbosity::Compact => {
            debug!("Sensor {}: {} {}", sensor_id, items.len(), step);
        }
        QueueVerbosity::Verbose => {
            info!("Sensor {}: {} {}: {}", sensor_id, items.len(), step, items.join(", "));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use retrieval_core::domain::context::Location;
    use retrieval_core::domain::job::{AtmosphericProfileModel, JobSettings, RetrievalAlgorithm};
    use retrieval_core::domain::manifest::Outcome;
    use retrieval_metadata::{MetadataStore, SensorRecord, SetupRecord, SetupValue};
    use std::path::Path;
    use std::sync::Arc;

    pub(crate) fn location() -> Location {
        Location {
            location_id: "TUM_I".to_string(),
            details: String::new(),
            lat: 48.151,
            lon: 11.569,
            alt: 539.0,
        }
    }

    pub(crate) fn job(sensor_id: &str, y: i32, m: u32, d: u32) -> RetrievalJob {
        let day = TimeWindow::day(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        RetrievalJob {
            retrieval_algorithm: RetrievalAlgorithm::Proffast24,
            atmospheric_profile_model: AtmosphericProfileModel::GGG2014,
            settings: JobSettings::default(),
            sensor_data_context: SensorDataContext {
                sensor_id: sensor_id.to_string(),
                serial_number: 115,
                from_datetime: day.from,
                to_datetime: day.to,
                location: location(),
                pressure_data_source: sensor_id.to_string(),
                utc_offset: 0.0,
                calibration: None,
            },
        }
    }

    fn setup(from: DateTime<Utc>, to: DateTime<Utc>) -> SetupRecord {
        SetupRecord {
            from_datetime: from,
            to_datetime: to,
            value: SetupValue {
                location_id: "TUM_I".to_string(),
                pressure_data_source: None,
                utc_offset: 0.0,
            },
        }
    }

    /// Sensors `ma` and `mc` deployed through June 2022, `mc` split at noon
    /// of June 3
    pub(crate) fn metadata() -> MetadataStore {
        let june = |d, h| Utc.with_ymd_and_hms(2022, 6, d, h, 0, 0).unwrap();
        let july = Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap();
        MetadataStore::new(
            vec![
                SensorRecord {
                    sensor_id: "ma".to_string(),
                    serial_number: 61,
                    setups: vec![setup(june(1, 0), july)],
                    calibration: None,
                },
                SensorRecord {
                    sensor_id: "mc".to_string(),
                    serial_number: 115,
                    setups: vec![setup(june(1, 0), june(3, 12)), setup(june(3, 12), july)],
                    calibration: None,
                },
            ],
            vec![location()],
        )
    }

    /// Writes a complete configuration rooted in `root`
    pub(crate) fn config(root: &Path) -> Config {
        let mut config = Config::parse(&format!(
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

            [[retrieval.jobs]]
            retrieval_algorithm = "proffast-2.4"
            atmospheric_profile_model = "GGG2014"
            sensor_ids = ["mc", "ma"]
            from_date = "2022-06-01"
            to_date = "2022-06-30"
            "#,
            root = root.display()
        ))
        .unwrap();
        config.retrieval.general.max_process_count = 2;
        config
    }

    /// Creates every input of one sensor day
    pub(crate) fn provide_inputs(root: &Path, sensor_id: &str, date: &str) {
        let ifg_dir = root.join("ifgs").join(sensor_id).join(date);
        std::fs::create_dir_all(&ifg_dir).unwrap();
        std::fs::write(ifg_dir.join(format!("{}{}.ifg.001", sensor_id, date)), "ifg").unwrap();

        let pressure_dir = root.join("pressure").join(sensor_id);
        std::fs::create_dir_all(&pressure_dir).unwrap();
        std::fs::write(
            pressure_dir.join(format!("pressure-{}-{}.csv", sensor_id, date)),
            "utc,pressure\n",
        )
        .unwrap();

        let profile_dir = root.join("profiles/GGG2014");
        std::fs::create_dir_all(&profile_dir).unwrap();
        std::fs::write(profile_dir.join(format!("{}_48N012E.map", date)), "map").unwrap();
    }

    pub(crate) fn run_context(root: &Path) -> RunContext {
        RunContext::new(config(root), &root.join("config.toml"), Arc::new(metadata()))
    }

    fn slugs(queue: &JobQueue) -> Vec<String> {
        queue
            .iter()
            .map(|j| format!("{}/{}", j.sensor_id(), j.slug()))
            .collect()
    }

    #[test]
    fn test_queue_order_is_newest_first_then_sensor() {
        let dir = tempfile::tempdir().unwrap();
        for (sensor, date) in [("ma", "20220601"), ("mc", "20220601"), ("ma", "20220605"), ("mc", "20220610")] {
            provide_inputs(dir.path(), sensor, date);
        }

        let queue = JobQueue::generate(&run_context(dir.path())).unwrap();
        assert_eq!(
            slugs(&queue),
            vec!["mc/20220610", "ma/20220605", "ma/20220601", "mc/20220601"]
        );
    }

    #[test]
    fn test_missing_interferograms_are_never_queued() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "mc", "20220602");
        std::fs::remove_dir_all(dir.path().join("ifgs/mc/20220602")).unwrap();

        let queue = JobQueue::generate(&run_context(dir.path())).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_locked_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "mc", "20220602");
        std::fs::write(dir.path().join("ifgs/mc/20220602").join(LOCK_MARKER), "").unwrap();

        let queue = JobQueue::generate(&run_context(dir.path())).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_published_results_are_not_queued_again() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "mc", "20220602");
        provide_inputs(dir.path(), "mc", "20220604");
        let ctx = run_context(dir.path());

        let published = OutputLocation::for_job(&ctx.config.general.data.results, &job("mc", 2022, 6, 2));
        std::fs::create_dir_all(published.target(Outcome::Failed)).unwrap();

        let queue = JobQueue::generate(&ctx).unwrap();
        assert_eq!(slugs(&queue), vec!["mc/20220604"]);
    }

    #[test]
    fn test_missing_pressure_or_profile_drops_context() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "mc", "20220602");
        provide_inputs(dir.path(), "mc", "20220604");
        provide_inputs(dir.path(), "ma", "20220605");
        std::fs::remove_file(dir.path().join("pressure/mc/pressure-mc-20220602.csv")).unwrap();
        std::fs::remove_file(dir.path().join("profiles/GGG2014/20220605_48N012E.map")).unwrap();

        let queue = JobQueue::generate(&run_context(dir.path())).unwrap();
        assert_eq!(slugs(&queue), vec!["mc/20220604"]);
    }

    #[test]
    fn test_relocation_day_yields_two_jobs() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "mc", "20220603");

        let queue = JobQueue::generate(&run_context(dir.path())).unwrap();
        assert_eq!(
            slugs(&queue),
            vec!["mc/20220603_120000_235959", "mc/20220603_000000_120000"]
        );
    }

    #[test]
    fn test_unknown_sensor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        provide_inputs(dir.path(), "ma", "20220605");
        let mut config = config(dir.path());
        config.retrieval.jobs[0].sensor_ids.push("zz".to_string());
        let ctx = RunContext::new(config, &dir.path().join("config.toml"), Arc::new(metadata()));

        let queue = JobQueue::generate(&ctx).unwrap();
        assert_eq!(slugs(&queue), vec!["ma/20220605"]);
    }

    #[test]
    fn test_queue_pops_in_order() {
        let mut queue = JobQueue::new(vec![job("mc", 2022, 6, 2), job("ma", 2022, 6, 1)]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().map(|j| j.sensor_id()), Some("mc"));
        assert_eq!(queue.pop().map(|j| j.sensor_id().to_string()), Some("mc".to_string()));
        assert_eq!(queue.pop().map(|j| j.sensor_id().to_string()), Some("ma".to_string()));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
