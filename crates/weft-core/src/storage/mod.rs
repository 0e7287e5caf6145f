//! Storage layer for Weft Core.
//!
//! This module provides record persistence with the Repository pattern.
//! The in-memory repository is the default backing store; other backends
//! implement the same trait.

pub mod error;
pub mod repositories;

pub use error::{StorageError, StorageResult};
pub use repositories::{Entity, InMemoryRepository, Repository};
