//! Species catalog: a read-only snapshot of species -> genome -> annotation
//! blob, loaded once per fleet run, plus the species-selection grammar and the
//! remote key layout.

use crate::error::{PanforgeError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Key of the table-of-contents blob in the artifact store.
pub const CATALOG_KEY: &str = "genomes.tsv";

/// The terminal artifact; its presence at the destination marks a species
/// build as complete.
pub const TERMINAL_ARTIFACT: &str = "gene_info.txt";

pub fn annotation_key(species_id: &str, genome_id: &str) -> String {
    format!("genomes/{species_id}/{genome_id}/{genome_id}.ffn")
}

pub fn pangenome_prefix(species_id: &str) -> String {
    format!("pangenomes/{species_id}")
}

pub fn pangenome_key(species_id: &str, artifact: &str) -> String {
    format!("pangenomes/{species_id}/{artifact}")
}

#[derive(Debug, Clone)]
pub struct Genome {
    pub id: String,
    pub species_id: String,
}

#[derive(Debug, Clone)]
pub struct Species {
    pub id: String,
    pub genomes: BTreeMap<String, Genome>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    species: BTreeMap<String, Species>,
}

impl Catalog {
    /// Parse the table of contents: a headered TSV with `genome_id` and
    /// `species_id` columns.
    pub fn from_tsv(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| PanforgeError::Catalog(format!("cannot open {}: {err}", path.display())))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .ok_or_else(|| PanforgeError::Catalog(format!("{} is empty", path.display())))??;
        let columns: Vec<&str> = header.trim_end().split('\t').collect();
        let genome_col = column_index(&columns, "genome_id", path)?;
        let species_col = column_index(&columns, "species_id", path)?;

        let mut catalog = Catalog::default();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.trim_end().split('\t').collect();
            let genome_id = fields.get(genome_col).copied().unwrap_or("");
            let species_id = fields.get(species_col).copied().unwrap_or("");
            if genome_id.is_empty() || species_id.is_empty() {
                return Err(PanforgeError::Catalog(format!(
                    "malformed table of contents row: {line:?}"
                )));
            }
            catalog.insert(species_id, genome_id);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, species_id: &str, genome_id: &str) {
        let species = self
            .species
            .entry(species_id.to_string())
            .or_insert_with(|| Species {
                id: species_id.to_string(),
                genomes: BTreeMap::new(),
            });
        species.genomes.insert(
            genome_id.to_string(),
            Genome {
                id: genome_id.to_string(),
                species_id: species_id.to_string(),
            },
        );
    }

    pub fn get(&self, species_id: &str) -> Option<&Species> {
        self.species.get(species_id)
    }

    pub fn contains(&self, species_id: &str) -> bool {
        self.species.contains_key(species_id)
    }

    pub fn species_ids(&self) -> impl Iterator<Item = &str> {
        self.species.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

fn column_index(columns: &[&str], name: &str, path: &Path) -> Result<usize> {
    columns.iter().position(|&c| c == name).ok_or_else(|| {
        PanforgeError::Catalog(format!("{} has no `{name}` column", path.display()))
    })
}

/// One term of the `--species` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionTerm {
    Id(String),
    /// Species whose numeric id is `remainder` mod `modulus`, for sharding a
    /// fleet run across invocations.
    Slice { remainder: u64, modulus: u64 },
}

/// The species-selection grammar, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeciesSelection {
    All,
    Terms(Vec<SelectionTerm>),
}

impl FromStr for SpeciesSelection {
    type Err = PanforgeError;

    fn from_str(arg: &str) -> Result<Self> {
        if arg.trim().eq_ignore_ascii_case("all") {
            return Ok(SpeciesSelection::All);
        }
        let mut terms = Vec::new();
        for part in arg.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(PanforgeError::Selection(format!(
                    "empty term in species argument: {arg:?}"
                )));
            }
            if let Some((remainder, modulus)) = part.split_once(':') {
                let remainder: u64 = remainder.parse().map_err(|_| {
                    PanforgeError::Selection(format!("slice remainder is not an integer: {part}"))
                })?;
                let modulus: u64 = modulus.parse().map_err(|_| {
                    PanforgeError::Selection(format!("slice modulus is not an integer: {part}"))
                })?;
                if modulus == 0 || remainder >= modulus {
                    return Err(PanforgeError::Selection(format!(
                        "slice remainder and modulus make no sense: {remainder}:{modulus}"
                    )));
                }
                terms.push(SelectionTerm::Slice { remainder, modulus });
            } else {
                part.parse::<u64>().map_err(|_| {
                    PanforgeError::Selection(format!("species id is not an integer: {part}"))
                })?;
                terms.push(SelectionTerm::Id(part.to_string()));
            }
        }
        Ok(SpeciesSelection::Terms(terms))
    }
}

impl SpeciesSelection {
    /// Resolve to a sorted, deduplicated list of catalog species ids.
    /// Explicitly-listed ids missing from the catalog are fatal.
    pub fn resolve(&self, catalog: &Catalog) -> Result<Vec<String>> {
        let mut selected: BTreeSet<String> = BTreeSet::new();
        match self {
            SpeciesSelection::All => {
                selected.extend(catalog.species_ids().map(String::from));
            }
            SpeciesSelection::Terms(terms) => {
                for term in terms {
                    match term {
                        SelectionTerm::Id(id) => {
                            if !catalog.contains(id) {
                                return Err(PanforgeError::Selection(format!(
                                    "species {id} is not in the catalog"
                                )));
                            }
                            selected.insert(id.clone());
                        }
                        SelectionTerm::Slice { remainder, modulus } => {
                            for id in catalog.species_ids() {
                                if let Ok(numeric) = id.parse::<u64>() {
                                    if numeric % modulus == *remainder {
                                        selected.insert(id.to_string());
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        let mut ids: Vec<String> = selected.into_iter().collect();
        ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::default();
        for id in ["100001", "100002", "100011", "100030"] {
            catalog.insert(id, &format!("G{id}"));
        }
        catalog
    }

    #[test]
    fn test_parse_all_keyword() {
        assert_eq!("all".parse::<SpeciesSelection>().unwrap(), SpeciesSelection::All);
        assert_eq!("ALL".parse::<SpeciesSelection>().unwrap(), SpeciesSelection::All);
    }

    #[test]
    fn test_parse_ids_and_slices() {
        let selection: SpeciesSelection = "100001,1:30".parse().unwrap();
        assert_eq!(
            selection,
            SpeciesSelection::Terms(vec![
                SelectionTerm::Id("100001".to_string()),
                SelectionTerm::Slice { remainder: 1, modulus: 30 },
            ])
        );
    }

    #[test]
    fn test_malformed_selection_is_fatal() {
        assert!("abc".parse::<SpeciesSelection>().is_err());
        assert!("1:0".parse::<SpeciesSelection>().is_err());
        assert!("30:30".parse::<SpeciesSelection>().is_err());
        assert!("5:x".parse::<SpeciesSelection>().is_err());
        assert!("1,,2".parse::<SpeciesSelection>().is_err());
    }

    #[test]
    fn test_resolve_all() {
        let catalog = sample_catalog();
        let ids = SpeciesSelection::All.resolve(&catalog).unwrap();
        assert_eq!(ids, vec!["100001", "100002", "100011", "100030"]);
    }

    #[test]
    fn test_resolve_slice() {
        let catalog = sample_catalog();
        // 100001 % 10 == 1, 100011 % 10 == 1
        let selection: SpeciesSelection = "1:10".parse().unwrap();
        let ids = selection.resolve(&catalog).unwrap();
        assert_eq!(ids, vec!["100001", "100011"]);
    }

    #[test]
    fn test_resolve_dedupes_overlapping_terms() {
        let catalog = sample_catalog();
        let selection: SpeciesSelection = "100001,1:10".parse().unwrap();
        let ids = selection.resolve(&catalog).unwrap();
        assert_eq!(ids, vec!["100001", "100011"]);
    }

    #[test]
    fn test_resolve_unknown_id_is_fatal() {
        let catalog = sample_catalog();
        let selection: SpeciesSelection = "999999".parse().unwrap();
        assert!(matches!(
            selection.resolve(&catalog),
            Err(PanforgeError::Selection(_))
        ));
    }

    #[test]
    fn test_catalog_from_tsv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "genome_id\tspecies_id").unwrap();
        writeln!(file, "G1\t100001").unwrap();
        writeln!(file, "G2\t100001").unwrap();
        writeln!(file, "G3\t100002").unwrap();
        let catalog = Catalog::from_tsv(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("100001").unwrap().genomes.len(), 2);
        assert!(catalog.get("100002").unwrap().genomes.contains_key("G3"));
    }

    #[test]
    fn test_catalog_missing_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "genome\tspecies_id").unwrap();
        writeln!(file, "G1\t100001").unwrap();
        assert!(matches!(
            Catalog::from_tsv(file.path()),
            Err(PanforgeError::Catalog(_))
        ));
    }

    #[test]
    fn test_layout_keys() {
        assert_eq!(
            annotation_key("100001", "G7"),
            "genomes/100001/G7/G7.ffn"
        );
        assert_eq!(
            pangenome_key("100001", TERMINAL_ARTIFACT),
            "pangenomes/100001/gene_info.txt"
        );
        assert_eq!(pangenome_prefix("100001"), "pangenomes/100001");
    }
}
