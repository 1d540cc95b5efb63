//! Gene normalization: turn raw per-genome annotation records into cleaned
//! gene sequence and length-index files, then pool them per species.

use crate::error::Result;
use crate::fasta;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cleaned per-genome output files with aggregate record counts.
#[derive(Debug, Clone)]
pub struct GenomeGeneFiles {
    pub genes: PathBuf,
    pub lengths: PathBuf,
    pub kept: usize,
    pub skipped: usize,
}

/// Concatenated per-species gene pool.
#[derive(Debug, Clone)]
pub struct GenePool {
    pub genes: PathBuf,
    pub lengths: PathBuf,
    pub kept: usize,
    pub skipped: usize,
}

/// Clean one genome's annotation records into `<genome>.genes.ffn` and
/// `<genome>.genes.len`.
///
/// Records with an empty or `|` identifier or a zero-length sequence are
/// skipped without individual logging; only the aggregate count is kept.
/// Output files are truncated on entry, so a re-run replaces any prior
/// partial output.
pub fn clean_genome_genes(
    annotation: &Path,
    genome_id: &str,
    workdir: &Path,
) -> Result<GenomeGeneFiles> {
    let records = fasta::read_fasta(annotation)?;

    let genes_path = workdir.join(format!("{genome_id}.genes.ffn"));
    let lengths_path = workdir.join(format!("{genome_id}.genes.len"));
    let mut genes = BufWriter::new(File::create(&genes_path)?);
    let mut lengths = BufWriter::new(File::create(&lengths_path)?);

    let mut kept = 0;
    let mut skipped = 0;
    for record in records {
        if record.id.is_empty() || record.id == "|" || record.is_empty() {
            skipped += 1;
            continue;
        }
        genes.write_all(b">")?;
        genes.write_all(record.id.as_bytes())?;
        genes.write_all(b"\n")?;
        genes.write_all(&record.sequence)?;
        genes.write_all(b"\n")?;
        writeln!(lengths, "{}\t{}\t{}", record.id, genome_id, record.len())?;
        kept += 1;
    }
    genes.flush()?;
    lengths.flush()?;

    debug!(genome = %genome_id, kept, skipped, "cleaned annotation records");
    Ok(GenomeGeneFiles {
        genes: genes_path,
        lengths: lengths_path,
        kept,
        skipped,
    })
}

/// Clean every genome of a species in parallel. Parsing is CPU-bound, so the
/// fan-out runs on the rayon pool.
pub fn normalize_species(
    annotations: &[(String, PathBuf)],
    workdir: &Path,
) -> Result<Vec<GenomeGeneFiles>> {
    annotations
        .par_iter()
        .map(|(genome_id, annotation)| clean_genome_genes(annotation, genome_id, workdir))
        .collect()
}

/// Concatenate per-genome outputs into one `genes.ffn` / `genes.len` pool.
pub fn concat_gene_pool(cleaned: &[GenomeGeneFiles], workdir: &Path) -> Result<GenePool> {
    let genes_path = workdir.join("genes.ffn");
    let lengths_path = workdir.join("genes.len");
    let mut genes = BufWriter::new(File::create(&genes_path)?);
    let mut lengths = BufWriter::new(File::create(&lengths_path)?);

    let mut kept = 0;
    let mut skipped = 0;
    for files in cleaned {
        io::copy(&mut File::open(&files.genes)?, &mut genes)?;
        io::copy(&mut File::open(&files.lengths)?, &mut lengths)?;
        kept += files.kept;
        skipped += files.skipped;
    }
    genes.flush()?;
    lengths.flush()?;

    Ok(GenePool {
        genes: genes_path,
        lengths: lengths_path,
        kept,
        skipped,
    })
}
