//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures caused by the request itself
/// (validation, lookups). Storage and index failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The request is malformed or semantically invalid for `entity_name`.
    ///
    /// `error_key` is a stable machine-readable code (e.g. `idexists`).
    #[error("{message}")]
    Validation {
        entity_name: String,
        error_key: String,
        message: String,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(
        entity_name: impl Into<String>,
        error_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            entity_name: entity_name.into(),
            error_key: error_key.into(),
            message: message.into(),
        }
    }

    /// A create request carried an identity.
    pub fn id_exists(entity_name: &str) -> Self {
        Self::validation(
            entity_name,
            "idexists",
            format!("A new {entity_name} cannot already have an ID"),
        )
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable error code, when the error carries one.
    pub fn error_key(&self) -> Option<&str> {
        match self {
            DomainError::Validation { error_key, .. } => Some(error_key),
            DomainError::InvalidId(_) => Some("badid"),
            DomainError::NotFound => None,
        }
    }
}
