//! Error types for behavior_planner
//!
//! The per-cycle planning path never fails; these errors only surface from
//! configuration loading and plot export.

use thiserror::Error;

/// Main error type for the planner
#[derive(Debug, Error)]
pub enum PlannerError {
    /// I/O error while reading configuration or writing plots
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML configuration
    #[error("configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configuration value is outside its valid domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Visualization backend failed
    #[error("visualization error: {0}")]
    Visualization(String),
}

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
