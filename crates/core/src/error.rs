//! Domain error model.

use thiserror::Error;

/// Result type used across the simulation domain.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only (bad identifiers, illegal transitions).
/// None of these are fatal: callers log and drop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was empty or malformed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A value failed validation (negative declared value, bad config...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state machine was asked to move along an edge it does not have.
    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// An event referenced an entity this state container does not know.
    #[error("unknown {entity}: {id}")]
    UnknownEntity { entity: &'static str, id: String },
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn illegal(entity: &'static str, from: &'static str, to: &'static str) -> Self {
        Self::IllegalTransition { entity, from, to }
    }

    pub fn unknown(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::UnknownEntity {
            entity,
            id: id.to_string(),
        }
    }
}
