//! External clustering tool invocation, idempotent against prior results.

use crate::config::ToolConfig;
use crate::error::{PanforgeError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// The two artifacts produced by one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterFiles {
    pub centroids: PathBuf,
    pub assignments: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ClusterTool {
    binary: PathBuf,
    threads: usize,
}

pub fn centroids_name(percent: u8) -> String {
    format!("centroids.{percent}.ffn")
}

pub fn assignments_name(percent: u8) -> String {
    format!("uclust.{percent}.txt")
}

impl ClusterTool {
    pub fn new(config: &ToolConfig) -> Self {
        let threads = if config.threads == 0 {
            num_cpus::get()
        } else {
            config.threads
        };
        Self {
            binary: config.binary.clone(),
            threads,
        }
    }

    /// Cluster `genes` at `percent` identity into
    /// `centroids.<percent>.ffn` and `uclust.<percent>.txt` under `workdir`.
    ///
    /// If both artifacts already exist from a prior run, the invocation is
    /// skipped and they are reused. On tool failure, partial artifacts are
    /// renamed out of the way first; a truncated file left in place would
    /// pass the resume check on the next run.
    pub fn cluster(&self, percent: u8, genes: &Path, workdir: &Path) -> Result<ClusterFiles> {
        let centroids = workdir.join(centroids_name(percent));
        let assignments = workdir.join(assignments_name(percent));

        if centroids.exists() && assignments.exists() {
            info!(percent, "found clustering results from prior run");
            return Ok(ClusterFiles {
                centroids,
                assignments,
            });
        }

        let output = Command::new(&self.binary)
            .arg("--quiet")
            .arg("--cluster_fast")
            .arg(genes)
            .arg("--id")
            .arg(format!("{}", f64::from(percent) / 100.0))
            .arg("--threads")
            .arg(self.threads.to_string())
            .arg("--centroids")
            .arg(&centroids)
            .arg("--uc")
            .arg(&assignments)
            .output()
            .map_err(|err| {
                PanforgeError::Tool(format!(
                    "failed to invoke {}: {err}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            quarantine(&centroids);
            quarantine(&assignments);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PanforgeError::Tool(format!(
                "{} failed with {} at {percent}% identity: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(ClusterFiles {
            centroids,
            assignments,
        })
    }
}

/// Rename a partial artifact to `<name>.bogus`. Rename failures only warn;
/// the original tool error is the one worth surfacing.
fn quarantine(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut bogus = path.as_os_str().to_os_string();
    bogus.push(".bogus");
    if let Err(err) = std::fs::rename(path, &bogus) {
        warn!("failed to quarantine {}: {err}", path.display());
    }
}
