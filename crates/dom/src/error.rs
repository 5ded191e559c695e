//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Every public operation either succeeds
//! completely or returns one of these with the graph left untouched.

use crate::types::ObjectId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(ObjectId),

    #[error("Object {0} has been disposed")]
    Disposed(ObjectId),

    #[error("Object {0} is frozen")]
    Frozen(ObjectId),

    #[error("Element {0} is locked")]
    Locked(ObjectId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Expected {expected} coordinates, got {actual}")]
    CoordinateCount { expected: usize, actual: usize },

    #[error("Invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomError {
    pub(crate) fn wrong_kind(expected: &str, actual: impl std::fmt::Debug) -> Self {
        DomError::InvalidNodeType {
            expected: expected.to_string(),
            actual: format!("{:?}", actual),
        }
    }
}
