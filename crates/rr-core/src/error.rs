//! # AppError
//!
//! Centralized error handling for the forum.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rr-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, Comment, Profile)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., title too long, vote value outside {-1, 1})
    #[error("validation error: {0}")]
    ValidationError(String),

    /// No authenticated caster, or bad credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g., duplicate username, concurrent first vote)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The markdown collaborator rejected the input
    #[error("render error: {0}")]
    Render(String),

    /// Infrastructure failure (e.g., DB down, pool exhausted)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A specialized Result type for forum logic.
pub type Result<T> = std::result::Result<T, AppError>;
