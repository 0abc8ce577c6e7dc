//! kgrid-state — the persisted grids document.
//!
//! Every grid kgrid has created, and the clusters provisioned into it, live in
//! one YAML document. Readers get a consistent snapshot; writers go through
//! the composite operations on [`GridStore`], each of which holds the store's
//! lock for its whole read-modify-write span.
//!
//! Two backends:
//!
//! - [`FileStore`] — YAML at a configurable path, created empty on first load
//! - [`MemoryStore`] — in-process document for tests and dry runs

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{FileStore, GridStore, MemoryStore};
pub use types::*;
