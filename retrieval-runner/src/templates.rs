//! Program input templates
//!
//! Proffast 2.x containers carry `.inp` templates under
//! `prfpylot/templates/` with `%KEY%` placeholders for the job's detector
//! thresholds, the ground pressure handed to PCXS and optional ILS
//! corrections. They are filled in once the inputs are staged.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use retrieval_core::domain::session::Session;
use retrieval_core::template::render;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Tells PCXS to take the pressure from the atmospheric profiles
pub const PROFILE_PRESSURE: f64 = 9999.9;

/// Half width of the pressure averaging window around solar noon
const NOON_WINDOW_MINUTES: i64 = 120;

/// Fewest pressure rows the averaging window must contain
const MIN_NOON_ROWS: usize = 11;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{0}")]
    Pressure(String),

    #[error("failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct ProgramTemplates<'a> {
    session: &'a Session,
}

impl<'a> ProgramTemplates<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn templates_dir(&self) -> PathBuf {
        self.session
            .container
            .container_path()
            .join("prfpylot")
            .join("templates")
    }

    /// Values written into the templates
    pub fn replacements(&self) -> Result<Vec<(&'static str, String)>, TemplateError> {
        let settings = &self.session.job.settings;
        let ctx = &self.session.job.sensor_data_context;

        let pcxs_pressure = if settings.use_local_pressure_in_pcxs {
            let noon = solar_noon(ctx.location.lon, ctx.date());
            debug!("Solar noon at {} UTC", noon.time());
            let calibration = settings.pressure_calibration(ctx);
            calibration.apply(mean_pressure_around(&self.staged_pressure_path(), noon)?)
        } else {
            PROFILE_PRESSURE
        };

        let mut replacements = vec![
            ("DC_MIN_THRESHOLD", format!("{:?}", settings.dc_min_threshold)),
            ("DC_VAR_THRESHOLD", format!("{:?}", settings.dc_var_threshold)),
            ("MEAN_PRESSURE_AT_NOON", format!("{:?}", pcxs_pressure)),
        ];
        if let Some(ils) = settings.custom_ils.get(&ctx.sensor_id) {
            info!("Using custom ILS values");
            replacements.push((
                "ILS_Channel1",
                format!("{:?} {:?}", ils.channel1_me, ils.channel1_pe),
            ));
            replacements.push((
                "ILS_Channel2",
                format!("{:?} {:?}", ils.channel2_me, ils.channel2_pe),
            ));
        }
        Ok(replacements)
    }

    /// Renders every `.inp` template in place
    ///
    /// Returns the number of rendered files. A container without templates
    /// is left untouched.
    pub fn apply(&self) -> Result<usize, TemplateError> {
        let dir = self.templates_dir();
        if !dir.is_dir() {
            debug!("No program templates at {}", dir.display());
            return Ok(0);
        }

        let replacements = self.replacements()?;
        info!("Writing values to templates: {:?}", replacements);

        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TemplateError::Io { path, source }
        };
        let mut rendered = 0;
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "inp") {
                continue;
            }
            let template = std::fs::read_to_string(&path).map_err(io_error(&path))?;
            std::fs::write(&path, render(&template, &replacements)).map_err(io_error(&path))?;
            rendered += 1;
        }
        Ok(rendered)
    }

    fn staged_pressure_path(&self) -> PathBuf {
        let ctx = &self.session.job.sensor_data_context;
        self.session.container.input_path().join("log").join(format!(
            "ground-pressure-{}-{}.csv",
            ctx.pressure_data_source,
            ctx.date().format("%Y%m%d")
        ))
    }
}

/// Time of the sun's meridian transit at a longitude, in UTC
///
/// Uses the NOAA equation of time approximation, which is accurate to well
/// under a minute.
pub fn solar_noon(lon: f64, date: NaiveDate) -> DateTime<Utc> {
    let day_of_year = date.ordinal0() as f64;
    let gamma = 2.0 * PI / 365.0 * day_of_year;
    let equation_of_time = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let minutes = 720.0 - 4.0 * lon - equation_of_time;
    date.and_time(NaiveTime::MIN).and_utc() + Duration::seconds((minutes * 60.0).round() as i64)
}

/// Mean of the staged pressure rows within two hours of `noon`, rounded to
/// three decimals
pub fn mean_pressure_around(path: &Path, noon: DateTime<Utc>) -> Result<f64, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TemplateError::Pressure(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .map(|h| h.split(',').map(str::trim).collect())
        .unwrap_or_default();
    let column = |names: &[&str]| header.iter().position(|h| names.contains(h));
    let (Some(time_column), Some(pressure_column)) =
        (column(&["utc-time", "utc"]), column(&["pressure"]))
    else {
        return Err(TemplateError::Pressure(format!(
            "{} has no utc-time and pressure columns",
            path.display()
        )));
    };

    let window = Duration::minutes(NOON_WINDOW_MINUTES);
    let from = (noon - window).time();
    let to = (noon + window).time();
    let values: Vec<f64> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let time = fields.get(time_column).and_then(|t| parse_time(t))?;
            let pressure = fields.get(pressure_column)?.parse::<f64>().ok()?;
            (from <= time && time <= to).then_some(pressure)
        })
        .collect();

    debug!("Found {} pressure rows around solar noon", values.len());
    if values.len() < MIN_NOON_ROWS {
        return Err(TemplateError::Pressure(format!(
            "only {} pressure row(s) within two hours of solar noon ({} UTC)",
            values.len(),
            noon.time()
        )));
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Ok((mean * 1000.0).round() / 1000.0)
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}
