//! Session builder
//!
//! Binds one job to one freshly created container and writes everything the
//! worker process needs into the container's input directory: the serialized
//! session and, for Proffast 2.x, the rendered program configuration.

use anyhow::{Context, Result};
use retrieval_core::domain::container::Container;
use retrieval_core::domain::job::RetrievalJob;
use retrieval_core::domain::session::Session;
use retrieval_core::template::render;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::containers::ContainerFactory;

const CONFIG_TEMPLATE: &str = "pylot_config_template.yml";
const LOG_FORMAT_TEMPLATE: &str = "pylot_log_format_template.yml";

/// Builds sessions from queued jobs
pub struct SessionBuilder {
    algorithms_root: PathBuf,
}

impl SessionBuilder {
    pub fn new(algorithms_root: &Path) -> Self {
        Self {
            algorithms_root: algorithms_root.to_path_buf(),
        }
    }

    /// Creates a container for the job and prepares it for the worker
    ///
    /// If preparing the container fails, it is removed again.
    pub fn build(&self, factory: &ContainerFactory, job: RetrievalJob) -> Result<Session> {
        let container = factory
            .create_container(job.retrieval_algorithm)
            .context("Failed to create container")?;

        let session = Session { job, container };
        if let Err(e) = self.write_session_files(&session) {
            if let Err(cleanup) = factory.remove_container(session.container.label()) {
                warn!("Failed to remove container after error: {}", cleanup);
            }
            return Err(e);
        }
        Ok(session)
    }

    fn write_session_files(&self, session: &Session) -> Result<()> {
        let container = &session.container;
        let template_dir = self
            .algorithms_root
            .join(session.job.retrieval_algorithm.as_str())
            .join("config");

        if let Some(config_path) = container.config_path() {
            let template = std::fs::read_to_string(template_dir.join(CONFIG_TEMPLATE))
                .with_context(|| format!("Failed to read {} template", CONFIG_TEMPLATE))?;
            std::fs::write(&config_path, render(&template, &config_replacements(session)))
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            debug!("Rendered {}", config_path.display());
        }

        if let Some(log_format_path) = container.log_format_path() {
            let template_path = template_dir.join(LOG_FORMAT_TEMPLATE);
            if template_path.is_file() {
                let template = std::fs::read_to_string(&template_path)
                    .with_context(|| format!("Failed to read {}", template_path.display()))?;
                std::fs::write(&log_format_path, render(&template, &log_format_replacements(session)))
                    .with_context(|| format!("Failed to write {}", log_format_path.display()))?;
            }
        }

        let session_path = container.session_path();
        let json = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        std::fs::write(&session_path, json)
            .with_context(|| format!("Failed to write {}", session_path.display()))?;
        Ok(())
    }
}

fn config_replacements(session: &Session) -> Vec<(&'static str, String)> {
    let ctx = &session.job.sensor_data_context;
    let container: &Container = &session.container;
    let path = |p: PathBuf| p.to_string_lossy().into_owned();

    vec![
        ("SERIAL_NUMBER", format!("{:03}", ctx.serial_number)),
        ("SENSOR_ID", ctx.sensor_id.clone()),
        ("COORDINATES_LAT", format_decimal(ctx.location.lat, 6)),
        ("COORDINATES_LON", format_decimal(ctx.location.lon, 6)),
        ("COORDINATES_ALT", format_decimal(ctx.location.alt / 1000.0, 6)),
        ("UTC_OFFSET", format_decimal(ctx.utc_offset, 9)),
        ("CONTAINER_ID", container.label().to_string()),
        ("CONTAINER_PATH", path(container.container_path())),
        ("DATA_INPUT_PATH", path(container.input_path())),
        ("DATA_OUTPUT_PATH", path(container.output_path())),
        (
            "PYLOT_LOG_FORMAT_PATH",
            container.log_format_path().map(path).unwrap_or_default(),
        ),
    ]
}

fn log_format_replacements(session: &Session) -> Vec<(&'static str, String)> {
    let ctx = &session.job.sensor_data_context;
    vec![
        ("SENSOR_ID", ctx.sensor_id.clone()),
        ("UTC_OFFSET", "0.0".to_string()),
        ("PRESSURE_DATA_SOURCE", ctx.pressure_data_source.clone()),
    ]
}

/// Rounds to `digits` decimals without trailing zeros, e.g. `0.539`
fn format_decimal(value: f64, digits: usize) -> String {
    let text = format!("{:.*}", digits, value);
    let trimmed = text.trim_end_matches('0');
    match trimmed.strip_suffix('.') {
        Some(integer) => format!("{}.0", integer),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::tests::factory;
    use crate::queue::tests::job;

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(0.539, 6), "0.539");
        assert_eq!(format_decimal(48.1511119, 6), "48.151112");
        assert_eq!(format_decimal(2.0, 9), "2.0");
        assert_eq!(format_decimal(-11.5, 6), "-11.5");
    }

    #[test]
    fn test_build_renders_config_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let config_dir = dir.path().join("algorithms/proffast-2.4/config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(CONFIG_TEMPLATE),
            "serial: %SERIAL_NUMBER%\nsite: %SENSOR_ID%\nalt: %COORDINATES_ALT%\nin: %DATA_INPUT_PATH%\n",
        )
        .unwrap();

        let builder = SessionBuilder::new(&dir.path().join("algorithms"));
        let session = builder.build(&factory, job("mc", 2022, 6, 2)).unwrap();

        let config_path = session.container.config_path().unwrap();
        let rendered = std::fs::read_to_string(config_path).unwrap();
        assert!(rendered.contains("serial: 115\n"));
        assert!(rendered.contains("site: mc\n"));
        assert!(rendered.contains("alt: 0.539\n"));
        assert!(rendered.contains(&session.container.input_path().to_string_lossy().into_owned()));

        let stored: Session =
            serde_json::from_str(&std::fs::read_to_string(session.container.session_path()).unwrap())
                .unwrap();
        assert_eq!(stored, session);
    }

    #[test]
    fn test_missing_template_removes_container() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let builder = SessionBuilder::new(&dir.path().join("algorithms"));

        assert!(builder.build(&factory, job("mc", 2022, 6, 2)).is_err());
        assert!(factory.live_labels().is_empty());
    }
}
