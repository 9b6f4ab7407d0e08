//! Retrieval status domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{AtmosphericProfileModel, RetrievalAlgorithm, RetrievalJob};

/// Progress of one queued job of the current run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStatus {
    pub retrieval_algorithm: RetrievalAlgorithm,
    pub atmospheric_profile_model: AtmosphericProfileModel,
    pub sensor_id: String,
    pub from_datetime: DateTime<Utc>,
    pub to_datetime: DateTime<Utc>,
    pub location_id: String,
    #[serde(default)]
    pub output_suffix: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub ifg_count: Option<usize>,
    #[serde(default)]
    pub process_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub process_end_time: Option<DateTime<Utc>>,
}

/// Where a job stands, derived from its recorded times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

impl RetrievalStatus {
    /// A fresh entry for a job that has not been dispatched yet
    pub fn for_job(job: &RetrievalJob) -> Self {
        let ctx = &job.sensor_data_context;
        Self {
            retrieval_algorithm: job.retrieval_algorithm,
            atmospheric_profile_model: job.atmospheric_profile_model,
            sensor_id: ctx.sensor_id.clone(),
            from_datetime: ctx.from_datetime,
            to_datetime: ctx.to_datetime,
            location_id: ctx.location.location_id.clone(),
            output_suffix: job.settings.output_suffix.clone(),
            container_id: None,
            ifg_count: None,
            process_start_time: None,
            process_end_time: None,
        }
    }

    /// Returns true if this entry tracks the given job
    pub fn concerns(&self, job: &RetrievalJob) -> bool {
        self.retrieval_algorithm == job.retrieval_algorithm
            && self.atmospheric_profile_model == job.atmospheric_profile_model
            && self.sensor_id == job.sensor_data_context.sensor_id
            && self.from_datetime == job.sensor_data_context.from_datetime
            && self.output_suffix == job.settings.output_suffix
    }

    pub fn state(&self) -> JobState {
        match (self.process_start_time, self.process_end_time) {
            (_, Some(_)) => JobState::Done,
            (Some(_), None) => JobState::Running,
            (None, None) => JobState::Pending,
        }
    }
}
