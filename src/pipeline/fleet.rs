//! Fleet scheduler: the top-level control loop over species builds.
//!
//! Existence checks are cheap remote reads and fan out widely; actual builds
//! are CPU- and bandwidth-heavy and run under a separate, much smaller
//! concurrency bound. Each build is an isolated task with its own working
//! directory, so one species' failure or crash never touches its siblings.

use crate::catalog::{self, Catalog, SpeciesSelection};
use crate::config::BuildConfig;
use crate::error::{PanforgeError, Result};
use crate::pipeline::species::SpeciesBuild;
use crate::store::BlobStore;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FleetOptions {
    pub selection: SpeciesSelection,
    /// Rebuild species whose terminal artifact already exists.
    pub force: bool,
    /// Preserve per-species working directories for inspection.
    pub debug: bool,
    /// Parent directory of the per-species working directories.
    pub run_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeciesOutcome {
    Built,
    Skipped,
    Failed(String),
}

#[derive(Debug, Default, Serialize)]
pub struct FleetSummary {
    pub built: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl FleetSummary {
    pub fn total(&self) -> usize {
        self.built.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct FleetScheduler {
    catalog: Arc<Catalog>,
    store: Arc<dyn BlobStore>,
    config: Arc<BuildConfig>,
}

impl FleetScheduler {
    pub fn new(catalog: Arc<Catalog>, store: Arc<dyn BlobStore>, config: Arc<BuildConfig>) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    pub async fn run(&self, options: &FleetOptions) -> Result<FleetSummary> {
        let species_ids = options.selection.resolve(&self.catalog)?;
        info!("fleet run over {} species", species_ids.len());

        let build_permits = Arc::new(Semaphore::new(self.config.build_fanout));
        let progress = ProgressBar::new(species_ids.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        progress.set_message("building pangenomes");

        let outcomes = stream::iter(species_ids.into_iter().map(|species_id| {
            let permits = Arc::clone(&build_permits);
            let progress = progress.clone();
            async move {
                let outcome = self.species_work(&species_id, permits, options).await;
                progress.inc(1);
                (species_id, outcome)
            }
        }))
        .buffer_unordered(self.config.check_fanout)
        .collect::<Vec<_>>()
        .await;
        progress.finish_with_message("fleet run complete");

        let mut summary = FleetSummary::default();
        for (species_id, outcome) in outcomes {
            match outcome {
                SpeciesOutcome::Built => summary.built.push(species_id),
                SpeciesOutcome::Skipped => summary.skipped.push(species_id),
                SpeciesOutcome::Failed(reason) => summary.failed.push((species_id, reason)),
            }
        }
        if !summary.is_success() {
            warn!(
                "{} of {} species builds failed",
                summary.failed.len(),
                summary.total()
            );
        }
        Ok(summary)
    }

    /// Check-then-build for one species. The existence check runs in the
    /// wide fan-out; the build itself waits for one of the scarcer build
    /// permits.
    async fn species_work(
        &self,
        species_id: &str,
        build_permits: Arc<Semaphore>,
        options: &FleetOptions,
    ) -> SpeciesOutcome {
        let terminal = catalog::pangenome_key(species_id, catalog::TERMINAL_ARTIFACT);
        let mut rebuilding = false;
        match self.store.exists(&terminal).await {
            Ok(true) if !options.force => {
                info!(
                    species = %species_id,
                    "destination {terminal} already exists; specify --force to overwrite"
                );
                return SpeciesOutcome::Skipped;
            }
            Ok(true) => rebuilding = true,
            Ok(false) => {}
            Err(err) => return SpeciesOutcome::Failed(err.to_string()),
        }

        let species = match self.catalog.get(species_id) {
            Some(species) => species.clone(),
            None => {
                return SpeciesOutcome::Failed(format!("species {species_id} is not in the catalog"))
            }
        };

        let _permit = build_permits.acquire_owned().await.unwrap();
        info!(
            species = %species_id,
            genomes = species.genomes.len(),
            rebuilding,
            "starting species build"
        );

        let workdir = options.run_root.join(species_id);
        if !options.debug {
            let _ = std::fs::remove_dir_all(&workdir);
        }
        if let Err(err) = std::fs::create_dir_all(&workdir) {
            return SpeciesOutcome::Failed(format!(
                "cannot create working directory {}: {err}",
                workdir.display()
            ));
        }

        let build = SpeciesBuild::new(
            species,
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            workdir.clone(),
        );
        // The build runs as its own task: a panic inside it is contained as
        // this species' failure, and nothing is shared back in memory.
        let handle = tokio::spawn(async move { build.run().await });
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => Err(PanforgeError::Other(format!(
                "species build task crashed: {err}"
            ))),
        };

        // The log goes up even for failed builds; an upload failure here must
        // not mask the build result.
        let log_path = workdir.join("build.log");
        if log_path.exists() {
            if let Err(err) = self
                .store
                .put(&log_path, &catalog::pangenome_key(species_id, "build.log"))
                .await
            {
                warn!(species = %species_id, "failed to upload build log: {err}");
            }
        }
        if !options.debug {
            let _ = std::fs::remove_dir_all(&workdir);
        }

        match result {
            Ok(()) => SpeciesOutcome::Built,
            Err(err) => {
                warn!(species = %species_id, "species build failed: {err}");
                SpeciesOutcome::Failed(err.to_string())
            }
        }
    }
}
