pub mod fleet;
pub mod species;

pub use fleet::{FleetOptions, FleetScheduler, FleetSummary, SpeciesOutcome};
pub use species::SpeciesBuild;
