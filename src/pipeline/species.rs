//! Species build coordinator: drives normalization, clustering,
//! consolidation, and publishing for one species inside its own working
//! directory.
//!
//! Results leave the build only through the filesystem and the blob store;
//! the terminal artifact is uploaded strictly last so its remote presence
//! marks the whole build as complete.

use crate::catalog::{self, Species};
use crate::cluster::runner::{assignments_name, centroids_name, ClusterFiles, ClusterTool};
use crate::cluster::{consolidate, uclust};
use crate::config::BuildConfig;
use crate::error::{PanforgeError, Result};
use crate::normalize::{self, GenePool};
use crate::store::BlobStore;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{info, warn};

/// Append-only per-species build log, uploaded alongside the artifacts.
/// Writing it is advisory and must never fail the build.
pub struct BuildLog {
    path: PathBuf,
}

impl BuildLog {
    pub fn new(workdir: &Path) -> Self {
        Self {
            path: workdir.join("build.log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, message: &str) {
        let line = format!(
            "[{}] {message}\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f")
        );
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = written {
            warn!("failed to append to {}: {err}", self.path.display());
        }
    }
}

pub struct SpeciesBuild {
    species: Species,
    store: Arc<dyn BlobStore>,
    config: Arc<BuildConfig>,
    tool: ClusterTool,
    workdir: PathBuf,
    log: BuildLog,
}

impl SpeciesBuild {
    pub fn new(
        species: Species,
        store: Arc<dyn BlobStore>,
        config: Arc<BuildConfig>,
        workdir: PathBuf,
    ) -> Self {
        let tool = ClusterTool::new(&config.tool);
        let log = BuildLog::new(&workdir);
        Self {
            species,
            store,
            config,
            tool,
            workdir,
            log,
        }
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    pub async fn run(&self) -> Result<()> {
        let outcome = self.try_run().await;
        match &outcome {
            Ok(()) => self.log.record("build complete"),
            Err(err) => self.log.record(&format!("build failed: {err}")),
        }
        outcome
    }

    async fn try_run(&self) -> Result<()> {
        let pool = self.normalize().await?;
        let cluster_files = self.run_clustering(&pool).await?;
        let table = self.consolidate(&cluster_files)?;
        self.publish(&pool, &cluster_files, &table).await?;
        Ok(())
    }

    /// Fetch every genome's annotation blob, then clean them all on the
    /// rayon pool and concatenate the per-genome outputs into one pool.
    async fn normalize(&self) -> Result<GenePool> {
        let species_id = self.species.id.clone();
        self.log.record(&format!(
            "normalizing {} genomes",
            self.species.genomes.len()
        ));

        let fetches = self.species.genomes.keys().map(|genome_id| {
            let key = catalog::annotation_key(&species_id, genome_id);
            let dest = self.workdir.join(format!("{genome_id}.ffn"));
            let store = Arc::clone(&self.store);
            let genome_id = genome_id.clone();
            async move {
                store.get(&key, &dest).await?;
                Ok::<_, PanforgeError>((genome_id, dest))
            }
        });
        let annotations: Vec<(String, PathBuf)> = stream::iter(fetches)
            .buffer_unordered(self.config.transfer_fanout)
            .try_collect()
            .await?;

        let workdir = self.workdir.clone();
        let cleaned =
            task::spawn_blocking(move || normalize::normalize_species(&annotations, &workdir))
                .await
                .map_err(worker_crash)??;
        let pool = normalize::concat_gene_pool(&cleaned, &self.workdir)?;

        info!(
            species = %species_id,
            kept = pool.kept,
            skipped = pool.skipped,
            "normalized gene pool"
        );
        self.log.record(&format!(
            "gene pool ready: {} genes kept, {} records skipped",
            pool.kept, pool.skipped
        ));
        Ok(pool)
    }

    /// Seed clustering over the full pool, then concurrent reclustering of
    /// the seed centroid set at every finer-membership threshold.
    async fn run_clustering(&self, pool: &GenePool) -> Result<BTreeMap<u8, ClusterFiles>> {
        let seed = self.config.seed_threshold();
        self.log
            .record(&format!("clustering gene pool at {seed}% identity"));

        let tool = self.tool.clone();
        let genes = pool.genes.clone();
        let workdir = self.workdir.clone();
        let seed_files = task::spawn_blocking(move || tool.cluster(seed, &genes, &workdir))
            .await
            .map_err(worker_crash)??;

        let lower = self.config.lower_thresholds();
        if !lower.is_empty() {
            self.log.record(&format!(
                "reclustering seed centroids at {lower:?}% identity"
            ));
        }
        let handles: Vec<_> = lower
            .iter()
            .map(|&percent| {
                let tool = self.tool.clone();
                let centroids = seed_files.centroids.clone();
                let workdir = self.workdir.clone();
                task::spawn_blocking(move || {
                    tool.cluster(percent, &centroids, &workdir)
                        .map(|files| (percent, files))
                })
            })
            .collect();

        let mut cluster_files = BTreeMap::new();
        for handle in handles {
            let (percent, files) = handle.await.map_err(worker_crash)??;
            cluster_files.insert(percent, files);
        }
        cluster_files.insert(seed, seed_files);
        Ok(cluster_files)
    }

    fn consolidate(&self, cluster_files: &BTreeMap<u8, ClusterFiles>) -> Result<PathBuf> {
        let mut assignments = HashMap::new();
        for (&percent, files) in cluster_files {
            assignments.insert(percent, uclust::parse_assignments(&files.assignments)?);
        }
        let table = consolidate::consolidate(&self.config.thresholds, &assignments)?;

        let path = self.workdir.join(catalog::TERMINAL_ARTIFACT);
        table.write_tsv(&path)?;
        self.log.record(&format!(
            "consolidated {} genes across {} thresholds",
            table.rows().len(),
            self.config.thresholds.len()
        ));
        Ok(path)
    }

    /// Clear the species' remote prefix, upload every working artifact with
    /// bounded concurrency, then upload the terminal artifact strictly last.
    async fn publish(
        &self,
        pool: &GenePool,
        cluster_files: &BTreeMap<u8, ClusterFiles>,
        table: &Path,
    ) -> Result<()> {
        let species_id = &self.species.id;
        let prefix = catalog::pangenome_prefix(species_id);

        // Stale artifacts from an earlier attempt must not mix with fresh ones.
        self.store.remove_prefix(&prefix).await?;

        let seed = self.config.seed_threshold();
        let mut uploads: Vec<(PathBuf, String)> = vec![
            (
                pool.genes.clone(),
                catalog::pangenome_key(species_id, "genes.ffn"),
            ),
            (
                pool.lengths.clone(),
                catalog::pangenome_key(species_id, "genes.len"),
            ),
            (
                cluster_files[&seed].centroids.clone(),
                catalog::pangenome_key(species_id, "centroids.ffn"),
            ),
        ];
        for (&percent, files) in cluster_files {
            uploads.push((
                files.centroids.clone(),
                catalog::pangenome_key(species_id, &format!("temp/{}", centroids_name(percent))),
            ));
            uploads.push((
                files.assignments.clone(),
                catalog::pangenome_key(species_id, &format!("temp/{}", assignments_name(percent))),
            ));
        }

        let semaphore = Semaphore::new(self.config.transfer_fanout);
        let upload_futures = uploads.iter().map(|(src, key)| {
            let sem = &semaphore;
            let store = &self.store;
            async move {
                let _permit = sem.acquire().await.unwrap();
                store.put(src, key).await
            }
        });
        stream::iter(upload_futures)
            .buffer_unordered(self.config.transfer_fanout)
            .try_collect::<Vec<()>>()
            .await?;

        // The terminal artifact's presence is the completion signal consumed
        // by future existence checks.
        self.store
            .put(
                table,
                &catalog::pangenome_key(species_id, catalog::TERMINAL_ARTIFACT),
            )
            .await?;
        self.log.record("published all artifacts");
        info!(species = %species_id, "species pangenome published");
        Ok(())
    }
}

fn worker_crash(err: task::JoinError) -> PanforgeError {
    PanforgeError::Other(format!("worker task failed: {err}"))
}
