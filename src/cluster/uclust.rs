//! Parser for the clustering tool's tab-separated assignment output.
//!
//! The file has no header; the schema is fixed by convention with the tool:
//! record type, cluster id, cluster size, percent identity, strand, three
//! ignorable fields, gene id, representative id.

use crate::error::{PanforgeError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const COLUMNS: usize = 10;
const GENE_COLUMN: usize = 8;
const CENTROID_COLUMN: usize = 9;

/// One cluster assignment at a single threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentRecord {
    /// The gene is itself the representative of its cluster.
    Seed { gene: String },
    /// The gene is a member pointing at another gene's id.
    Hit { gene: String, centroid: String },
}

impl AssignmentRecord {
    pub fn gene(&self) -> &str {
        match self {
            AssignmentRecord::Seed { gene } => gene,
            AssignmentRecord::Hit { gene, .. } => gene,
        }
    }
}

/// Parse an assignment file, keeping seed and hit records and ignoring all
/// other record types.
pub fn parse_assignments(path: &Path) -> Result<Vec<AssignmentRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < COLUMNS {
            return Err(PanforgeError::Parse(format!(
                "{}:{}: expected {COLUMNS} columns, found {}",
                path.display(),
                line_number + 1,
                fields.len()
            )));
        }
        match fields[0] {
            "S" => records.push(AssignmentRecord::Seed {
                gene: fields[GENE_COLUMN].to_string(),
            }),
            "H" => records.push(AssignmentRecord::Hit {
                gene: fields[GENE_COLUMN].to_string(),
                centroid: fields[CENTROID_COLUMN].to_string(),
            }),
            _ => {}
        }
    }

    Ok(records)
}
