//! Filesystem layout of inputs and results
//!
//! Inputs:
//! - `{interferograms}/{sensor_id}/{YYYYMMDD}/...` (files matching a regex)
//! - `{ground_pressure}/{source}/...` (files matching a regex)
//! - `{atmospheric_profiles}/{model}/[{YYYY}/{MM}/]{file}.map`
//!
//! Results:
//! - `{results}/{algorithm}/{model}/{sensor_id}/{successful|failed}/{slug}/`
//!
//! Both the queue generator and the worker resolve paths through this module
//! so that "an input exists" means the same thing to both.

use chrono::NaiveDate;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::job::{AtmosphericProfileModel, RetrievalJob};
use crate::domain::manifest::Outcome;

/// Marker file that excludes an interferogram directory from processing
pub const LOCK_MARKER: &str = ".do-not-touch";

/// Values substituted into configured file name patterns
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderValues<'a> {
    pub sensor_id: &'a str,
    pub source: &'a str,
    pub date: NaiveDate,
}

impl<'a> PlaceholderValues<'a> {
    pub fn new(sensor_id: &'a str, source: &'a str, date: NaiveDate) -> Self {
        Self {
            sensor_id,
            source,
            date,
        }
    }

    /// Arbitrary values used to check that a pattern compiles
    pub(crate) fn sample() -> PlaceholderValues<'static> {
        PlaceholderValues {
            sensor_id: "xx",
            source: "xx",
            date: NaiveDate::default(),
        }
    }
}

/// Replaces `$(SENSOR_ID)`, `$(SOURCE)`, `$(DATE)`, `$(YYYY)`, `$(YY)`,
/// `$(MM)` and `$(DD)` in a file name pattern
pub fn expand_placeholders(pattern: &str, values: &PlaceholderValues<'_>) -> String {
    let date = values.date.format("%Y%m%d").to_string();
    pattern
        .replace("$(SENSOR_ID)", &regex::escape(values.sensor_id))
        .replace("$(SOURCE)", &regex::escape(values.source))
        .replace("$(DATE)", &date)
        .replace("$(YYYY)", &date[..4])
        .replace("$(YY)", &date[2..4])
        .replace("$(MM)", &date[4..6])
        .replace("$(DD)", &date[6..])
}

/// Expands and compiles a file name pattern
pub fn compile_pattern(pattern: &str, values: &PlaceholderValues<'_>) -> Result<Regex, regex::Error> {
    Regex::new(&expand_placeholders(pattern, values))
}

/// Lists the file names in `dir` matching `pattern`, sorted
///
/// A missing directory yields an empty list.
pub fn matching_files(dir: &Path, pattern: &Regex) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) if pattern.is_match(name) => names.push(name.to_string()),
            _ => {}
        }
    }
    names.sort();
    Ok(names)
}

/// Directory holding one sensor's interferograms of one day
pub fn interferogram_dir(root: &Path, sensor_id: &str, date: NaiveDate) -> PathBuf {
    root.join(sensor_id)
        .join(date.format("%Y%m%d").to_string())
}

/// Directory holding the ground pressure files of one source
pub fn pressure_dir(root: &Path, source: &str) -> PathBuf {
    root.join(source)
}

/// Locations a profile file may be stored at, in lookup order
pub fn profile_candidates(
    root: &Path,
    model: AtmosphericProfileModel,
    source_name: &str,
) -> [PathBuf; 2] {
    let model_dir = root.join(model.as_str());
    let year = source_name.get(..4).unwrap_or_default();
    let month = source_name.get(4..6).unwrap_or_default();
    [
        model_dir.join(source_name),
        model_dir.join(year).join(month).join(source_name),
    ]
}

/// Finds a profile file in either supported location
pub fn locate_profile(
    root: &Path,
    model: AtmosphericProfileModel,
    source_name: &str,
) -> Option<PathBuf> {
    profile_candidates(root, model, source_name)
        .into_iter()
        .find(|p| p.is_file())
}

/// Where one job's output is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    sensor_dir: PathBuf,
    slug: String,
}

impl OutputLocation {
    pub fn for_job(results_root: &Path, job: &RetrievalJob) -> Self {
        Self {
            sensor_dir: results_root
                .join(job.retrieval_algorithm.as_str())
                .join(job.atmospheric_profile_model.as_str())
                .join(job.sensor_id()),
            slug: job.slug(),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Final directory for an outcome
    pub fn target(&self, outcome: Outcome) -> PathBuf {
        self.sensor_dir.join(outcome.dir_name()).join(&self.slug)
    }

    /// Sibling directory an output is assembled in before publication
    pub fn staging(&self, outcome: Outcome) -> PathBuf {
        self.sensor_dir
            .join(outcome.dir_name())
            .join(format!("{}.tmp", self.slug))
    }

    /// Both possible final directories
    pub fn targets(&self) -> [PathBuf; 2] {
        [self.target(Outcome::Successful), self.target(Outcome::Failed)]
    }

    /// Both possible staging directories
    pub fn stagings(&self) -> [PathBuf; 2] {
        [self.staging(Outcome::Successful), self.staging(Outcome::Failed)]
    }

    /// Returns true if a result for this job has already been published
    pub fn is_published(&self) -> bool {
        self.targets().iter().any(|p| p.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::tests::full_day;
    use crate::domain::job::{JobSettings, RetrievalAlgorithm};

    fn job() -> RetrievalJob {
        RetrievalJob {
            retrieval_algorithm: RetrievalAlgorithm::Proffast24,
            atmospheric_profile_model: AtmosphericProfileModel::GGG2020,
            settings: JobSettings::default(),
            sensor_data_context: full_day("mc", 2022, 6, 2),
        }
    }

    #[test]
    fn test_expand_placeholders() {
        let date = NaiveDate::from_ymd_opt(2022, 6, 2).unwrap();
        let values = PlaceholderValues::new("mc", "mc-pressure", date);
        assert_eq!(
            expand_placeholders("^$(SENSOR_ID)$(DATE).*$", &values),
            "^mc20220602.*$"
        );
        assert_eq!(
            expand_placeholders("$(SOURCE)_$(YYYY)-$(MM)-$(DD)_$(YY)", &values),
            "mc\\-pressure_2022-06-02_22"
        );
    }

    #[test]
    fn test_matching_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["mc20220602.ifg.0002", "mc20220602.ifg.0001", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let date = NaiveDate::from_ymd_opt(2022, 6, 2).unwrap();
        let pattern = compile_pattern(
            r"^$(SENSOR_ID)$(DATE).*\.\d+$",
            &PlaceholderValues::new("mc", "mc", date),
        )
        .unwrap();

        let names = matching_files(dir.path(), &pattern).unwrap();
        assert_eq!(names, vec!["mc20220602.ifg.0001", "mc20220602.ifg.0002"]);

        let missing = matching_files(&dir.path().join("missing"), &pattern).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_output_location() {
        let location = OutputLocation::for_job(Path::new("/results"), &job());
        assert_eq!(
            location.target(Outcome::Failed),
            PathBuf::from("/results/proffast-2.4/GGG2020/mc/failed/20220602")
        );
        assert_eq!(
            location.staging(Outcome::Successful),
            PathBuf::from("/results/proffast-2.4/GGG2020/mc/successful/20220602.tmp")
        );
    }

    #[test]
    fn test_profile_lookup_falls_back_to_year_month() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("GGG2014/2022/06");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("20220602_48N012E.map"), b"x").unwrap();

        let found = locate_profile(
            dir.path(),
            AtmosphericProfileModel::GGG2014,
            "20220602_48N012E.map",
        );
        assert_eq!(found, Some(nested.join("20220602_48N012E.map")));
        assert!(
            locate_profile(dir.path(), AtmosphericProfileModel::GGG2014, "20220603_48N012E.map")
                .is_none()
        );
    }
}
