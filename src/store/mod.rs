//! Time-series store contract
//!
//! The query core never touches storage directly. Everything it needs from
//! the backing time-series engine goes through [`TimeSeriesStore`]: range
//! scans, counts, temporary views, calendar and range aggregation, and the
//! time-aligned union used for cross-stream correlation.
//!
//! Temporary views are created by the store and named with collision-free
//! random tokens. Whoever receives a [`ViewHandle`] owns it and must pass it
//! to [`TimeSeriesStore::drop_view`] exactly once.
//!
//! [`MemoryStore`] is the in-process reference implementation. It evaluates
//! predicates with [`crate::predicate`], and records every view it creates
//! and every drop it receives so cleanup can be verified.
//!
//! Stream definitions, rules and macros live in a [`MetadataCatalog`];
//! [`MemoryCatalog`] keeps them in process and validates writes.

mod catalog;
mod contract;
mod errors;
mod memory;

pub use catalog::{MemoryCatalog, MetadataCatalog};
pub use contract::{ScanSpec, TimeSeriesStore, ViewHandle, ViewRef};
pub use errors::{CatalogError, CatalogResult, StoreError, StoreOp, StoreResult};
pub use memory::MemoryStore;
