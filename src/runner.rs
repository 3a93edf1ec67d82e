use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ArchiveError;

pub trait WorkflowRunner: Send + Sync {
    fn launch(&self, workdir: &Path, profile: &str) -> Result<(), ArchiveError>;
}

/// Launches the upload workflow through the `snakemake` binary on PATH. The
/// workflow itself (job scheduling, bulk file transfer) is external; only
/// the invocation lives here.
#[derive(Clone)]
pub struct SnakemakeRunner {
    snakemake: Option<PathBuf>,
}

impl SnakemakeRunner {
    pub fn new() -> Self {
        Self {
            snakemake: find_in_path("snakemake"),
        }
    }

    pub fn with_binary(path: PathBuf) -> Self {
        Self {
            snakemake: Some(path),
        }
    }
}

impl Default for SnakemakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRunner for SnakemakeRunner {
    fn launch(&self, workdir: &Path, profile: &str) -> Result<(), ArchiveError> {
        let snakemake = self
            .snakemake
            .as_ref()
            .ok_or_else(|| ArchiveError::MissingTool("snakemake".to_string()))?;

        let output = Command::new(snakemake)
            .arg("--profile")
            .arg(profile)
            .current_dir(workdir)
            .output()
            .map_err(|err| ArchiveError::Runner(err.to_string()))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("snakemake exited with {}", output.status)
        } else {
            stderr
        };
        Err(ArchiveError::Runner(message))
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
