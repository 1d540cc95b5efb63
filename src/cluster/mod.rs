pub mod consolidate;
pub mod runner;
pub mod uclust;

pub use consolidate::{consolidate, CentroidTable};
pub use runner::{ClusterFiles, ClusterTool};
pub use uclust::AssignmentRecord;
