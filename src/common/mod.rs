//! Common types, traits, configuration and error definitions
//!
//! This module provides the foundational building blocks shared by the
//! estimator, the behavior state machine and the trajectory selector.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
