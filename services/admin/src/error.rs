//! services/admin/src/error.rs
//!
//! Defines the primary error type for the admin client.

use crate::app::collection::CollectionError;
use crate::app::session::{LoginError, SessionError};
use crate::config::ConfigError;
use coaching_admin_core::ports::PortError;

/// The primary error type for the `admin` client.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An error that propagated up from one of the core ports.
    #[error("Backend error: {0}")]
    Port(#[from] PortError),

    #[error("{0}")]
    Login(#[from] LoginError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Collection(#[from] CollectionError),

    /// Represents a standard Input/Output error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
