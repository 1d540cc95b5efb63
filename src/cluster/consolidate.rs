//! Consolidation of per-threshold cluster assignments into one
//! gene-to-centroid table.
//!
//! Only the seed (highest-identity) threshold ever sees the full gene pool;
//! every other threshold clusters the seed centroids. Coarser assignments for
//! the remaining genes are inferred by transitivity: the clusters containing
//! a gene's seed centroid also contain the gene.

use crate::cluster::uclust::AssignmentRecord;
use crate::error::{PanforgeError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Mapping gene id -> representative at each threshold, in the fixed
/// descending threshold order. Covers every gene observed at the seed
/// threshold, fully populated for all thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentroidTable {
    thresholds: Vec<u8>,
    rows: BTreeMap<String, Vec<String>>,
}

impl CentroidTable {
    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    pub fn rows(&self) -> &BTreeMap<String, Vec<String>> {
        &self.rows
    }

    pub fn representative(&self, gene: &str, percent: u8) -> Option<&str> {
        let column = self.thresholds.iter().position(|&t| t == percent)?;
        self.rows.get(gene).map(|row| row[column].as_str())
    }

    /// Write the table as TSV, one row per gene sorted by gene id.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        write!(out, "gene_id")?;
        for percent in &self.thresholds {
            write!(out, "\tcentroid_{percent}")?;
        }
        writeln!(out)?;
        for (gene, row) in &self.rows {
            write!(out, "{gene}")?;
            for representative in row {
                write!(out, "\t{representative}")?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Merge per-threshold assignment lists into a [`CentroidTable`].
///
/// `thresholds` is the fixed descending set; `assignments` must hold one
/// record list per threshold. The result is identical regardless of the
/// order the per-threshold lists were produced in.
pub fn consolidate(
    thresholds: &[u8],
    assignments: &HashMap<u8, Vec<AssignmentRecord>>,
) -> Result<CentroidTable> {
    let mut lookups: HashMap<u8, HashMap<&str, &str>> = HashMap::new();
    for &percent in thresholds {
        let records = assignments.get(&percent).ok_or_else(|| {
            PanforgeError::Integrity(format!("no cluster assignments at {percent}% identity"))
        })?;
        let mut lookup = HashMap::with_capacity(records.len());
        for record in records {
            match record {
                AssignmentRecord::Seed { gene } => lookup.insert(gene.as_str(), gene.as_str()),
                AssignmentRecord::Hit { gene, centroid } => {
                    lookup.insert(gene.as_str(), centroid.as_str())
                }
            };
        }
        lookups.insert(percent, lookup);
    }

    let seed = thresholds[0];
    let seed_lookup = &lookups[&seed];

    // A cluster's representative must be its own representative. A violation
    // means gene identifiers collide across genomes and the assignments are
    // ambiguous.
    for (gene, representative) in seed_lookup {
        let rep_of_rep = seed_lookup.get(representative).ok_or_else(|| {
            PanforgeError::Integrity(format!(
                "gene {gene} points at {representative}, which has no {seed}% assignment of its own"
            ))
        })?;
        if rep_of_rep != representative {
            return Err(PanforgeError::Integrity(format!(
                "the {seed}% centroid relation is not idempotent: representative of {gene} is \
                 {representative}, but representative of {representative} is {rep_of_rep}"
            )));
        }
    }

    let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (gene, representative) in seed_lookup {
        let mut row = Vec::with_capacity(thresholds.len());
        for &percent in thresholds {
            let coarser = lookups[&percent].get(representative).ok_or_else(|| {
                PanforgeError::Integrity(format!(
                    "seed centroid {representative} has no assignment at {percent}% identity"
                ))
            })?;
            row.push((*coarser).to_string());
        }
        rows.insert((*gene).to_string(), row);
    }

    debug!(genes = rows.len(), thresholds = thresholds.len(), "consolidated cluster assignments");
    Ok(CentroidTable {
        thresholds: thresholds.to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seed(gene: &str) -> AssignmentRecord {
        AssignmentRecord::Seed {
            gene: gene.to_string(),
        }
    }

    fn hit(gene: &str, centroid: &str) -> AssignmentRecord {
        AssignmentRecord::Hit {
            gene: gene.to_string(),
            centroid: centroid.to_string(),
        }
    }

    /// Genomes G1 (genes a, b) and G2 (gene c): the seed threshold groups
    /// {a, b} under a and leaves c alone; reclustering {a, c} at the lower
    /// threshold merges them under a.
    #[test]
    fn test_transitive_consolidation() {
        let thresholds = [99, 95];
        let mut assignments = HashMap::new();
        assignments.insert(99, vec![seed("a"), hit("b", "a"), seed("c")]);
        assignments.insert(95, vec![seed("a"), hit("c", "a")]);

        let table = consolidate(&thresholds, &assignments).unwrap();
        assert_eq!(table.representative("a", 99), Some("a"));
        assert_eq!(table.representative("a", 95), Some("a"));
        assert_eq!(table.representative("b", 99), Some("a"));
        assert_eq!(table.representative("b", 95), Some("a"));
        assert_eq!(table.representative("c", 99), Some("c"));
        assert_eq!(table.representative("c", 95), Some("a"));
    }

    #[test]
    fn test_every_seed_gene_has_every_column() {
        let thresholds = [99, 95, 90];
        let mut assignments = HashMap::new();
        assignments.insert(
            99,
            vec![seed("a"), hit("b", "a"), seed("c"), hit("d", "c"), seed("e")],
        );
        assignments.insert(95, vec![seed("a"), hit("c", "a"), seed("e")]);
        assignments.insert(90, vec![seed("a"), hit("e", "a")]);

        let table = consolidate(&thresholds, &assignments).unwrap();
        assert_eq!(table.rows().len(), 5);
        for row in table.rows().values() {
            assert_eq!(row.len(), thresholds.len());
        }
        // d follows its seed centroid c through the coarser merges.
        assert_eq!(table.representative("d", 95), Some("a"));
        assert_eq!(table.representative("d", 90), Some("a"));
        // e stands alone until 90%.
        assert_eq!(table.representative("e", 95), Some("e"));
        assert_eq!(table.representative("e", 90), Some("a"));
    }

    #[test]
    fn test_broken_idempotency_is_fatal() {
        let thresholds = [99];
        let mut assignments = HashMap::new();
        // a and b claim each other: a colliding-identifier defect upstream.
        assignments.insert(99, vec![hit("a", "b"), hit("b", "a")]);
        assert!(matches!(
            consolidate(&thresholds, &assignments),
            Err(PanforgeError::Integrity(_))
        ));
    }

    #[test]
    fn test_dangling_centroid_is_fatal() {
        let thresholds = [99];
        let mut assignments = HashMap::new();
        assignments.insert(99, vec![hit("b", "a")]);
        assert!(matches!(
            consolidate(&thresholds, &assignments),
            Err(PanforgeError::Integrity(_))
        ));
    }

    #[test]
    fn test_missing_recluster_assignment_is_fatal() {
        let thresholds = [99, 95];
        let mut assignments = HashMap::new();
        assignments.insert(99, vec![seed("a"), seed("c")]);
        // c never made it into the 95% run.
        assignments.insert(95, vec![seed("a")]);
        assert!(matches!(
            consolidate(&thresholds, &assignments),
            Err(PanforgeError::Integrity(_))
        ));
    }

    #[test]
    fn test_output_is_deterministic_across_arrival_orders() {
        let thresholds = [99, 95, 90];
        let records_99 = vec![seed("a"), hit("b", "a"), seed("c")];
        let records_95 = vec![seed("a"), hit("c", "a")];
        let records_90 = vec![hit("a", "a"), seed("a"), hit("c", "a")];

        let mut forward = HashMap::new();
        forward.insert(99, records_99.clone());
        forward.insert(95, records_95.clone());
        forward.insert(90, records_90.clone());

        // Simulate reclustering finishing in the opposite order.
        let mut reversed = HashMap::new();
        reversed.insert(90, records_90);
        reversed.insert(95, records_95);
        reversed.insert(99, records_99);

        let dir = tempfile::tempdir().unwrap();
        let forward_path = dir.path().join("forward.tsv");
        let reversed_path = dir.path().join("reversed.tsv");
        consolidate(&thresholds, &forward)
            .unwrap()
            .write_tsv(&forward_path)
            .unwrap();
        consolidate(&thresholds, &reversed)
            .unwrap()
            .write_tsv(&reversed_path)
            .unwrap();

        let forward_bytes = std::fs::read(&forward_path).unwrap();
        let reversed_bytes = std::fs::read(&reversed_path).unwrap();
        assert_eq!(forward_bytes, reversed_bytes);
        assert!(!forward_bytes.is_empty());
    }

    #[test]
    fn test_tsv_layout() {
        let thresholds = [99, 95];
        let mut assignments = HashMap::new();
        assignments.insert(99, vec![seed("a"), hit("b", "a")]);
        assignments.insert(95, vec![seed("a")]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gene_info.txt");
        consolidate(&thresholds, &assignments)
            .unwrap()
            .write_tsv(&path)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "gene_id\tcentroid_99\tcentroid_95\na\ta\ta\nb\ta\ta\n"
        );
    }
}
