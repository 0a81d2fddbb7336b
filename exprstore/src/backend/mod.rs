// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Backend plugins
//!
//! A backend is the store a [`ConnectionManager`](crate::ConnectionManager)
//! talks to. Backends are supplied by [`BackendProvider`] factories discovered
//! at startup; each provider creates fresh backend instances that either
//! accept or reject the caller's [`BackendParameters`].
//!
//! Bundled plugins:
//! - `memory` / `test`: in-process tables, optionally shared by name
//! - `sled`: persistent tables in a sled database (feature `sled-backend`)

pub mod eval;
pub mod memory;
pub mod registry;
#[cfg(feature = "sled-backend")]
pub mod sled;

use crate::config::BackendParameters;
use crate::context::CancellationToken;
use crate::error::{DaoError, DaoResult};
use crate::query::{CompiledQuery, InsertStatement};
use crate::value::{Row, Value};

pub use eval::{evaluate, TableData, TableSource};
pub use memory::{drop_shared_database, shared_database, MemoryBackend, MemoryDatabase, MemoryProvider};
pub use registry::{builtin_providers, discovered_providers, resolve_providers, BACKENDS_ENV};
#[cfg(feature = "sled-backend")]
pub use self::sled::{SledBackend, SledProvider};

/// Factory for backend instances
pub trait BackendProvider: Send + Sync {
    /// Name matched against the `backend` parameter
    fn name(&self) -> &'static str;

    /// Create an unconfigured backend instance
    fn create(&self) -> Box<dyn Backend>;
}

/// One backend connection, owned by a single connection manager
pub trait Backend: Send {
    fn name(&self) -> &str;

    /// Validate and apply parameters. Called once right after creation and
    /// again whenever a live manager is re-acquired with a configuration.
    /// Rejection leaves the previous settings untouched.
    fn set_parameters(&mut self, parameters: &BackendParameters) -> DaoResult<()>;

    /// Prepare a read query. Result handles produced by the statement must
    /// observe `cancel` while they block.
    fn prepare_query(
        &mut self,
        query: &CompiledQuery,
        cancel: CancellationToken,
    ) -> DaoResult<Box<dyn BackendStatement>>;

    fn prepare_insert(&mut self, insert: &InsertStatement) -> DaoResult<Box<dyn BackendStatement>>;

    /// Graceful close: flush and release resources
    fn close(&mut self) -> DaoResult<()>;

    /// Abort in-flight work and drop resources without flushing
    fn kill(&mut self);
}

/// Prepared statement, executable any number of times with new bindings
pub trait BackendStatement: Send {
    fn sql(&self) -> &str;

    fn execute_query(&mut self, parameters: &[Value]) -> DaoResult<Box<dyn ResultHandle>>;

    fn execute_update(&mut self, parameters: &[Value]) -> DaoResult<u64>;
}

/// Open result set of one execution
pub trait ResultHandle: Send {
    /// Next row, or `None` once the result set is exhausted
    fn next_row(&mut self) -> DaoResult<Option<Row>>;

    fn close(&mut self);
}

/// Check that `parameters` are addressed to a backend named `name` whose
/// dotted keys live under `scope`.
///
/// Parameters naming a different backend, or carrying keys scoped to a
/// different backend, are rejected. Keys without a scope are ignored.
pub(crate) fn ensure_addressed_to(
    parameters: &BackendParameters,
    name: &str,
    scope: &str,
) -> DaoResult<()> {
    if let Some(requested) = parameters.backend() {
        if requested != name {
            return Err(DaoError::Configuration(format!(
                "backend '{}' requested, this is '{}'",
                requested, name
            )));
        }
    }
    for (key, _) in parameters.iter() {
        if let Some((prefix, _)) = key.split_once('.') {
            if prefix != scope {
                return Err(DaoError::Configuration(format!(
                    "parameter '{}' is not understood by the '{}' backend",
                    key, name
                )));
            }
        }
    }
    Ok(())
}

/// Reject keys under `scope` that are not in `known`
pub(crate) fn ensure_known_keys(
    parameters: &BackendParameters,
    scope: &str,
    known: &[&str],
) -> DaoResult<()> {
    let prefix = format!("{}.", scope);
    for (key, _) in parameters.scoped(&prefix) {
        if !known.contains(&key) {
            return Err(DaoError::Configuration(format!(
                "unknown parameter '{}{}'",
                prefix, key
            )));
        }
    }
    Ok(())
}
