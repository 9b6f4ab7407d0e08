//! One-time preparation of the retrieval programs
//!
//! Every algorithm keeps a master copy of its program under
//! `{algorithms_root}/{algorithm}/main`. Containers are copies of this tree.
//! The program sources themselves are not distributed with the algorithm
//! directory: they are downloaded once into `main/prf`.

use retrieval_core::domain::job::RetrievalAlgorithm;
use retrieval_core::fsutil::remove_tree;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ContainerError;

const ARCHIVE_FILE: &str = "archive.zip";
const EXTRACT_DIR: &str = "extracted";

/// Directory of the master copy of an algorithm
pub fn master_dir(algorithms_root: &Path, algorithm: RetrievalAlgorithm) -> PathBuf {
    algorithms_root.join(algorithm.as_str()).join("main")
}

/// Installer script run inside every fresh container, if present
pub fn installer_script(algorithms_root: &Path, algorithm: RetrievalAlgorithm) -> PathBuf {
    algorithms_root.join(algorithm.as_str()).join("install.sh")
}

/// Makes sure the master copy of an algorithm contains the program sources
pub async fn ensure_master(
    algorithms_root: &Path,
    algorithm: RetrievalAlgorithm,
) -> Result<(), ContainerError> {
    let main_dir = master_dir(algorithms_root, algorithm);
    let program_dir = main_dir.join("prf");

    if program_dir.is_dir() {
        info!("{} has already been downloaded", algorithm);
        return Ok(());
    }

    tokio::fs::create_dir_all(&main_dir)
        .await
        .map_err(|e| ContainerError::io(&main_dir, e))?;

    info!("Downloading {} from {}", algorithm, algorithm.archive_url());
    let archive = download(algorithm).await?;
    let archive_path = main_dir.join(ARCHIVE_FILE);
    tokio::fs::write(&archive_path, &archive)
        .await
        .map_err(|e| ContainerError::io(&archive_path, e))?;

    let extract_dir = main_dir.join(EXTRACT_DIR);
    remove_tree(&extract_dir).map_err(|e| ContainerError::io(&extract_dir, e))?;
    unzip(algorithm, &archive_path, &extract_dir).await?;

    let unpacked = unpacked_program_dir(algorithm, &extract_dir)?;
    tokio::fs::rename(&unpacked, &program_dir)
        .await
        .map_err(|e| ContainerError::io(&program_dir, e))?;

    remove_tree(&extract_dir).map_err(|e| ContainerError::io(&extract_dir, e))?;
    tokio::fs::remove_file(&archive_path)
        .await
        .map_err(|e| ContainerError::io(&archive_path, e))?;

    info!("{} is ready at {}", algorithm, program_dir.display());
    Ok(())
}

async fn download(algorithm: RetrievalAlgorithm) -> Result<Vec<u8>, ContainerError> {
    let failed = |e: reqwest::Error| ContainerError::setup(algorithm, format!("download failed: {}", e));

    let response = reqwest::get(algorithm.archive_url()).await.map_err(failed)?;
    let response = response.error_for_status().map_err(failed)?;
    let bytes = response.bytes().await.map_err(failed)?;
    debug!("Downloaded {} bytes for {}", bytes.len(), algorithm);
    Ok(bytes.to_vec())
}

async fn unzip(
    algorithm: RetrievalAlgorithm,
    archive_path: &Path,
    extract_dir: &Path,
) -> Result<(), ContainerError> {
    let output = Command::new("unzip")
        .arg("-q")
        .arg("-o")
        .arg(archive_path)
        .arg("-d")
        .arg(extract_dir)
        .output()
        .await
        .map_err(|e| ContainerError::setup(algorithm, format!("failed to execute unzip: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        debug!("unzip stderr: {}", stderr.trim());
    }

    if !output.status.success() {
        return Err(ContainerError::setup(
            algorithm,
            format!(
                "unzip exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }
    Ok(())
}

/// Finds the program directory inside an unpacked archive
///
/// Archives either contain `prf/` directly or a single versioned top-level
/// directory that becomes `prf/`.
fn unpacked_program_dir(
    algorithm: RetrievalAlgorithm,
    extract_dir: &Path,
) -> Result<PathBuf, ContainerError> {
    let nested = extract_dir.join("prf");
    if nested.is_dir() {
        return Ok(nested);
    }

    let entries = std::fs::read_dir(extract_dir).map_err(|e| ContainerError::io(extract_dir, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ContainerError::io(extract_dir, e))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(ContainerError::setup(
            algorithm,
            format!(
                "archive contains {} top-level directories, expected one",
                dirs.len()
            ),
        )),
    }
}
