//! Result classification and publication
//!
//! A job succeeded iff the program left a result table with at least one
//! data row. Either way the output is assembled in a `.tmp` sibling of its
//! final directory and renamed into place, so readers of the results tree
//! only ever see complete outputs.

use chrono::Utc;
use retrieval_core::config::Config;
use retrieval_core::domain::container::Container;
use retrieval_core::domain::manifest::{MANIFEST_FILE, Manifest, Outcome, ProgramExit};
use retrieval_core::domain::session::Session;
use retrieval_core::fsutil::{copy_tree, remove_tree};
use retrieval_core::layout::OutputLocation;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Error signatures the program writes to its log files, keyed by log file
pub const KNOWN_ERRORS: [(&str, &str); 4] = [
    ("preprocess_output.log", "charfilter not found!"),
    ("preprocess_output.log", "Zero IFG block size!"),
    ("inv_output.log", "CO channel: no natural grid!"),
    ("inv_output.log", "Cannot access tabellated x-sections!"),
];

/// Where the program leaves its outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub dir: PathBuf,
    pub table: PathBuf,
}

impl ExpectedOutput {
    pub fn for_session(session: &Session) -> Self {
        let ctx = &session.job.sensor_data_context;
        let short_date = ctx.date().format("%y%m%d").to_string();

        match &session.container {
            Container::Proffast1(_) => {
                let dir = session.container.container_path().join("prf").join("out_fast");
                let table = dir.join(format!(
                    "{}{}-combined-invparms.csv",
                    ctx.sensor_id, short_date
                ));
                Self { dir, table }
            }
            Container::Proffast2(_) => {
                let name = format!(
                    "{}_SN{:03}_{}-{}",
                    ctx.sensor_id, ctx.serial_number, short_date, short_date
                );
                let dir = session.container.output_path().join(&name);
                let table = dir.join(format!("comb_invparms_{}.csv", name));
                Self { dir, table }
            }
        }
    }
}

/// Verdict on one program run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// The program's output directory, if it created one
    pub output_dir: Option<PathBuf>,
    pub diagnostics: Vec<String>,
}

/// Inspects the container's output directory
pub fn classify(session: &Session) -> Classification {
    let expected = ExpectedOutput::for_session(session);

    let outcome = match std::fs::read_to_string(&expected.table) {
        Ok(content) if content.lines().count() > 1 => Outcome::Successful,
        Ok(_) => {
            info!("Result table {} has no data rows", expected.table.display());
            Outcome::Failed
        }
        Err(e) => {
            info!("No result table at {}: {}", expected.table.display(), e);
            Outcome::Failed
        }
    };

    let output_dir = expected.dir.is_dir().then_some(expected.dir);
    let diagnostics = match (&outcome, &output_dir) {
        (Outcome::Failed, Some(dir)) => detect_known_errors(dir),
        _ => Vec::new(),
    };
    for diagnostic in &diagnostics {
        info!("Known error found: {}", diagnostic);
    }

    Classification {
        outcome,
        output_dir,
        diagnostics,
    }
}

/// Scans `{output_dir}/logfiles/` for known error signatures
pub fn detect_known_errors(output_dir: &Path) -> Vec<String> {
    let logs = output_dir.join("logfiles");
    KNOWN_ERRORS
        .iter()
        .filter(|(file, signature)| {
            std::fs::read_to_string(logs.join(file))
                .is_ok_and(|content| content.contains(signature))
        })
        .map(|(file, signature)| format!("{}: {}", file, signature))
        .collect()
}

/// Publishes one session's output and returns its final directory
///
/// Contents: the program's output directory (if any), the binary spectra
/// if the job asks for them, the worker log as `logfiles/container.log`,
/// the rendered log format description (if any) and the manifest. The
/// staging directory never outlives a failed publication.
pub fn publish(
    config: &Config,
    session: &Session,
    classification: &Classification,
    program_exit: ProgramExit,
) -> std::io::Result<PathBuf> {
    let location = OutputLocation::for_job(&config.general.data.results, &session.job);
    for stale in location.stagings() {
        remove_tree(&stale)?;
    }

    let staging = location.staging(classification.outcome);
    let target = location.target(classification.outcome);
    let published = assemble(config, session, classification, program_exit, &staging)
        .and_then(|()| {
            for existing in location.targets() {
                if existing.exists() {
                    debug!("Removing stale output {}", existing.display());
                    remove_tree(&existing)?;
                }
            }
            std::fs::rename(&staging, &target)
        });

    if let Err(e) = published {
        if let Err(cleanup) = remove_tree(&staging) {
            warn!("Failed to remove {}: {}", staging.display(), cleanup);
        }
        return Err(e);
    }
    info!("Published output to {}", target.display());
    Ok(target)
}

fn assemble(
    config: &Config,
    session: &Session,
    classification: &Classification,
    program_exit: ProgramExit,
    staging: &Path,
) -> std::io::Result<()> {
    match &classification.output_dir {
        Some(dir) => copy_tree(dir, staging)?,
        None => std::fs::create_dir_all(staging)?,
    }

    if session.job.settings.store_binary_spectra {
        match binary_spectra_dir(session) {
            Some(spectra) if spectra.is_dir() => {
                copy_tree(&spectra, &staging.join("binary_spectra"))?;
            }
            Some(spectra) => warn!("No binary spectra at {}", spectra.display()),
            None => debug!("Program does not write binary spectra"),
        }
    }

    let logfiles = staging.join("logfiles");
    std::fs::create_dir_all(&logfiles)?;
    let log_path = session.container.log_path();
    if log_path.is_file() {
        std::fs::copy(&log_path, logfiles.join("container.log"))?;
    } else {
        warn!("No worker log at {}", log_path.display());
    }

    if let Some(format) = session.container.log_format_path() {
        if format.is_file() {
            std::fs::copy(&format, staging.join("pylot_log_format.yml"))?;
        }
    }

    let manifest = Manifest {
        automation_version: env!("CARGO_PKG_VERSION").to_string(),
        generation_time: Utc::now(),
        outcome: classification.outcome,
        program_exit,
        diagnostics: classification.diagnostics.clone(),
        config: config.redacted_json(),
        session: session.clone(),
    };
    let manifest = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
    std::fs::write(staging.join(MANIFEST_FILE), manifest)
}

/// Calibrated spectra the program leaves in its analysis directory
fn binary_spectra_dir(session: &Session) -> Option<PathBuf> {
    let ctx = &session.job.sensor_data_context;
    match &session.container {
        Container::Proffast1(_) => None,
        Container::Proffast2(_) => Some(
            session
                .container
                .output_path()
                .join("analysis")
                .join(format!("{}_SN{:03}", ctx.sensor_id, ctx.serial_number))
                .join(ctx.date().format("%y%m%d").to_string())
                .join("cal"),
        ),
    }
}
