//! HLA-compatible bone-marrow donor matching: a compact donor index built
//! once from genotype imputations, and a three-level matcher that ranks
//! candidate donors per patient by joint match probability.

pub mod config;
pub mod discovery;
pub mod donor_db;
pub mod donor_graph;
pub mod encoding;
pub mod error;
pub mod graph;
pub mod output;
pub mod patient_graph;
pub mod scorer;
pub mod similarity;
pub mod types;

pub use error::{MatchError, Result};
