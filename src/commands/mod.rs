pub mod ingest;
pub mod journals;
pub mod relink;
pub mod stats;

pub use ingest::run_ingest;
pub use journals::run_journals;
pub use relink::{relink_papers, run_relink};
pub use stats::run_stats;
