//! Error types for the migration engine
//!
//! Expected failure modes (failed operation, missing table, unknown version)
//! never surface here: they are signaled through return values so callers
//! check results instead of catching errors. This module only covers the
//! loud, construction-time class of problems.

use std::fmt;

/// Result type alias for engine construction and setup.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration engine setup
#[derive(Debug, Clone)]
pub enum MigrationError {
    /// Invalid engine configuration (unknown dialect, bad version string)
    Configuration(String),
    /// Could not establish the underlying database connection
    Connection(String),
    /// Migration catalog discovery failed outright
    Discovery(String),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            MigrationError::Connection(msg) => write!(f, "Connection error: {}", msg),
            MigrationError::Discovery(msg) => write!(f, "Discovery error: {}", msg),
        }
    }
}

impl std::error::Error for MigrationError {}
