// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for the data-access engine

use thiserror::Error;

/// Errors raised by connection managers, the query compiler, cursors and DAOs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DaoError {
    /// A backend plugin rejected its parameters, or none could be found
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An attribute is not mapped for the entity being queried
    #[error("Unrecognized attribute '{attribute}' for entity {entity}")]
    UnrecognizedAttribute { entity: String, attribute: String },

    #[error("Invalid query specification: {0}")]
    InvalidSpecification(String),

    /// Backend failure while iterating a cursor; the cursor is closed
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// The owning connection manager was terminated
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Operation attempted after shutdown or on a released manager
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend failure outside of cursor iteration (prepare, write)
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DaoError {
    pub fn unrecognized_attribute(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        DaoError::UnrecognizedAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }

    /// Whether this error is the expected outcome of an administrative termination
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DaoError::Interrupted(_))
    }

    /// Re-tag a backend failure raised during iteration as a cursor failure
    pub(crate) fn into_cursor_error(self) -> Self {
        match self {
            DaoError::Backend(msg) => DaoError::Cursor(msg),
            other => other,
        }
    }
}

impl From<std::io::Error> for DaoError {
    fn from(err: std::io::Error) -> Self {
        DaoError::Backend(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for DaoError {
    fn from(err: serde_json::Error) -> Self {
        DaoError::Backend(format!("Serialization error: {}", err))
    }
}

impl From<bincode::Error> for DaoError {
    fn from(err: bincode::Error) -> Self {
        DaoError::Backend(format!("Serialization error: {}", err))
    }
}

#[cfg(feature = "sled-backend")]
impl From<sled::Error> for DaoError {
    fn from(err: sled::Error) -> Self {
        DaoError::Backend(format!("Sled error: {}", err))
    }
}

pub type DaoResult<T> = Result<T, DaoError>;
