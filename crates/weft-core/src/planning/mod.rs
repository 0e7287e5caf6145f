//! Static planning over workflow definitions.

pub mod dag;

pub use dag::{DagError, DependencyGraph};
