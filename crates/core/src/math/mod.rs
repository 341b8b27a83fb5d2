pub mod blossom;
pub mod paths;

pub use blossom::{max_weight_matching, scale_weight};
pub use paths::{bounded_simple_cycles, bounded_simple_paths, SearchBudget};
