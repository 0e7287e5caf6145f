//! Command implementations for the Weft CLI.

pub mod files;
pub mod orchestrate;
pub mod plan;
pub mod run;
pub mod validate;
