use crate::catalog::{self, Catalog, SpeciesSelection};
use crate::config::BuildConfig;
use crate::pipeline::fleet::{FleetOptions, FleetScheduler};
use crate::store::{BlobStore, LocalStore, RetryPolicy, RetryingStore, S3Store};
use anyhow::Context;
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Species to build: comma-separated ids and/or idx:modulus slices
    /// (e.g. 1:30, meaning species whose ids are 1 mod 30), or 'all'
    #[arg(short, long, default_value = "all")]
    pub species: String,

    /// Artifact store: s3://bucket[/prefix] or a local directory
    #[arg(long)]
    pub store: String,

    /// Local table-of-contents TSV (fetched from the store when omitted)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Root directory for per-species working directories
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Pipeline configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Clustering tool binary (overrides the configuration file)
    #[arg(long)]
    pub tool: Option<PathBuf>,

    /// Rebuild species whose terminal artifact already exists
    #[arg(long)]
    pub force: bool,

    /// Preserve per-species working directories instead of cleaning them up
    #[arg(long)]
    pub debug: bool,
}

pub fn run(args: BuildArgs, threads: usize) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::from_file(path)?,
        None => BuildConfig::default(),
    };
    if let Some(tool) = &args.tool {
        config.tool.binary = tool.clone();
    }
    if config.tool.threads == 0 {
        config.tool.threads = threads;
    }
    config.validate()?;

    // Resolve the selection grammar before any work begins.
    let selection: SpeciesSelection = args.species.parse()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let store = open_store(&args.store, config.retry.policy()).await?;

        std::fs::create_dir_all(&args.workdir)?;
        let catalog_path = match &args.catalog {
            Some(path) => path.clone(),
            None => {
                let local = args.workdir.join(catalog::CATALOG_KEY);
                store
                    .get(catalog::CATALOG_KEY, &local)
                    .await
                    .context("failed to fetch the species catalog")?;
                local
            }
        };
        let catalog = Catalog::from_tsv(&catalog_path)?;
        info!("catalog lists {} species", catalog.len());

        let scheduler = FleetScheduler::new(Arc::new(catalog), store, Arc::new(config));
        let options = FleetOptions {
            selection,
            force: args.force,
            debug: args.debug,
            run_root: args.workdir.clone(),
        };
        let summary = scheduler.run(&options).await?;

        let summary_path = args.workdir.join("panforge_summary.json");
        std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

        println!(
            "{} {} built, {} skipped, {} failed (summary: {})",
            "Fleet run:".bold(),
            summary.built.len(),
            summary.skipped.len(),
            summary.failed.len(),
            summary_path.display()
        );
        if !summary.is_success() {
            for (species_id, reason) in &summary.failed {
                eprintln!("{} species {species_id}: {reason}", "failed".red().bold());
            }
            anyhow::bail!(
                "{} of {} species builds failed",
                summary.failed.len(),
                summary.total()
            );
        }
        Ok(())
    })
}

async fn open_store(uri: &str, policy: RetryPolicy) -> anyhow::Result<Arc<dyn BlobStore>> {
    let inner: Arc<dyn BlobStore> = if uri.starts_with("s3://") {
        Arc::new(S3Store::from_uri(uri).await?)
    } else {
        Arc::new(LocalStore::new(uri))
    };
    Ok(Arc::new(RetryingStore::new(inner, policy)))
}
