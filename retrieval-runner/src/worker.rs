//! One retrieval session, start to finish

use anyhow::{Context, Result};
use retrieval_core::config::Config;
use retrieval_core::domain::manifest::{Outcome, ProgramExit};
use retrieval_core::domain::session::Session;
use retrieval_core::status::{RetrievalStatusList, StatusUpdate};
use retrieval_core::warnings::InputWarningsList;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::execution::ProgramInvocation;
use crate::outputs::{classify, publish};
use crate::permissions::PermissionSnapshot;
use crate::signals::Teardown;
use crate::staging::{InputStager, StagingError};
use crate::templates::{ProgramTemplates, TemplateError};

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Inputs were missing, nothing was published
    InputsIncomplete,
    Published { outcome: Outcome, path: PathBuf },
}

pub struct Worker {
    config: Config,
    session: Session,
    teardown: Teardown,
    warnings: InputWarningsList,
    status: RetrievalStatusList,
}

impl Worker {
    pub fn new(config: Config, session: Session, teardown: Teardown) -> Self {
        let logs_root = &config.retrieval.general.logs_root;
        let warnings = InputWarningsList::in_logs_root(logs_root);
        let status = RetrievalStatusList::in_logs_root(logs_root);
        Self {
            config,
            session,
            teardown,
            warnings,
            status,
        }
    }

    /// Stages inputs, runs the program and publishes whatever it produced
    pub async fn run(&self) -> Result<WorkerOutcome> {
        let staged = {
            let _critical = self.teardown.critical().await;
            let staged = InputStager::new(&self.config, &self.session)
                .stage_all()
                .and_then(|staged| self.render_templates().map(|()| staged));
            match staged {
                Ok(staged) => {
                    info!(
                        "Staged {} profile(s), {} pressure row(s) and {} interferogram(s)",
                        staged.profile_count,
                        staged.pressure_rows,
                        staged.interferograms.len()
                    );
                    self.resolve_input_warning();
                    self.record_ifg_count(staged.interferograms.len());
                    staged
                }
                Err(e) => {
                    warn!("{}", e);
                    self.record_input_warning(&e);
                    return Ok(WorkerOutcome::InputsIncomplete);
                }
            }
        };

        let permissions = PermissionSnapshot::capture(&staged.interferograms);
        if !permissions.is_empty() {
            debug!("Recorded permissions of {} source file(s)", permissions.len());
        }
        let program_exit =
            match ProgramInvocation::for_session(&self.config.retrieval.general, &self.session) {
                Ok(invocation) => invocation.run(&self.teardown).await,
                Err(e) => {
                    error!("Failed to resolve program paths: {}", e);
                    ProgramExit::SpawnFailed {
                        message: e.to_string(),
                    }
                }
            };
        permissions.restore();

        let _critical = self.teardown.critical().await;
        let classification = classify(&self.session);
        info!("Retrieval classified as {}", classification.outcome.dir_name());
        let path = publish(&self.config, &self.session, &classification, program_exit)
            .context("Failed to publish outputs")?;

        Ok(WorkerOutcome::Published {
            outcome: classification.outcome,
            path,
        })
    }

    /// Fills in the program templates
    ///
    /// Only a missing noon pressure counts as incomplete inputs, failing to
    /// write a template is left for the program to trip over.
    fn render_templates(&self) -> Result<(), StagingError> {
        match ProgramTemplates::new(&self.session).apply() {
            Ok(count) => {
                debug!("Rendered {} program template(s)", count);
                Ok(())
            }
            Err(TemplateError::Pressure(message)) => Err(StagingError::Pressure(message)),
            Err(e) => {
                error!("{}", e);
                Ok(())
            }
        }
    }

    fn record_ifg_count(&self, count: usize) {
        if let Err(e) = self.status.update(&self.session.job, StatusUpdate::staged(count)) {
            error!("Failed to update retrieval status: {}", e);
        }
    }

    fn record_input_warning(&self, error: &StagingError) {
        let ctx = &self.session.job.sensor_data_context;
        if let Err(e) = self
            .warnings
            .add(&ctx.sensor_id, ctx.from_datetime, &error.to_string())
        {
            error!("Failed to record input warning: {}", e);
        }
    }

    fn resolve_input_warning(&self) {
        let ctx = &self.session.job.sensor_data_context;
        if let Err(e) = self.warnings.remove(&ctx.sensor_id, ctx.from_datetime) {
            error!("Failed to clear input warning: {}", e);
        }
    }
}
