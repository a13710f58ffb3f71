//! # stratum: versioned schema-migration engine
//!
//! Discovers versioned migration units from a directory, orders them by their
//! numeric version identifier, executes their operations against a relational
//! connection, and tracks applied versions in a single-column ledger table.
//!
//! The engine is strictly sequential: units run one at a time, operations run
//! in list order, and the first failure aborts the remainder of its unit and
//! (by default) the remainder of the batch. No transactions wrap a unit; the
//! safety net is that a failed unit is never recorded as applied, so the next
//! run resumes it. Running two migrators against the same ledger concurrently
//! is not supported.

pub mod connection;
pub mod definitions;
pub mod error;
pub mod factory;
pub mod migrator;
pub mod operation;
pub mod registry;
pub mod store;
pub mod unit;

// Re-export core traits and types
pub use connection::*;
pub use definitions::*;
pub use error::*;
pub use factory::*;
pub use migrator::*;
pub use operation::*;
pub use registry::*;
pub use store::*;
pub use unit::*;
