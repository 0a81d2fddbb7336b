// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Per-context connection manager

use super::registry::RegistryInner;
use crate::backend::Backend;
use crate::config::BackendParameters;
use crate::context::{CancellationToken, ContextId};
use crate::error::{DaoError, DaoResult};
use crate::query::{CompiledQuery, InsertStatement};
use crate::statement::ParameterizedStatement;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

/// Owns the backend connection of one execution context.
///
/// A manager is created by [`ManagerRegistry::acquire`](super::ManagerRegistry::acquire)
/// and closed by [`release`](Self::release), [`terminate`](Self::terminate) or a
/// registry-wide shutdown. It is never reopened: once closed, every operation
/// other than `release`/`terminate` fails with [`DaoError::IllegalState`].
pub struct ConnectionManager {
    context: ContextId,
    backend_name: String,
    backend: Mutex<Option<Box<dyn Backend>>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    registry: Weak<RegistryInner>,
}

impl ConnectionManager {
    pub(crate) fn new(
        context: ContextId,
        backend: Box<dyn Backend>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            context,
            backend_name: backend.name().to_string(),
            backend: Mutex::new(Some(backend)),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            created_at: Utc::now(),
            registry,
        }
    }

    /// Numeric identity, usable with `terminate_by_identity`
    pub fn id(&self) -> u64 {
        self.context.as_u64()
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Closed but still registered, as seen between a termination and its unregistration
    #[cfg(test)]
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> DaoResult<()> {
        if self.is_closed() {
            return Err(DaoError::IllegalState(format!(
                "connection manager {} is closed",
                self.context
            )));
        }
        Ok(())
    }

    fn with_backend<R>(&self, f: impl FnOnce(&mut dyn Backend) -> DaoResult<R>) -> DaoResult<R> {
        self.ensure_open()?;
        let mut guard = self.backend.lock();
        match guard.as_mut() {
            Some(backend) => f(backend.as_mut()),
            None => Err(DaoError::IllegalState(format!(
                "connection manager {} has no backend",
                self.context
            ))),
        }
    }

    /// Re-apply parameters to the live backend
    pub(crate) fn apply_parameters(&self, parameters: &BackendParameters) -> DaoResult<()> {
        self.with_backend(|backend| backend.set_parameters(parameters))
            .map_err(|e| {
                log::warn!(
                    "Connection manager {} rejected new parameters: {}",
                    self.context,
                    e
                );
                e
            })
    }

    /// Prepare a compiled read query, pre-bound with its parameters
    pub fn prepare(&self, query: &CompiledQuery) -> DaoResult<ParameterizedStatement> {
        let cancel = self.cancel.clone();
        let statement = self.with_backend(|backend| backend.prepare_query(query, cancel.clone()))?;
        Ok(ParameterizedStatement::new(
            statement,
            query.parameters().to_vec(),
            cancel,
        ))
    }

    /// Prepare a write statement; every placeholder starts out NULL
    pub fn prepare_insert(&self, insert: &InsertStatement) -> DaoResult<ParameterizedStatement> {
        let statement = self.with_backend(|backend| backend.prepare_insert(insert))?;
        Ok(ParameterizedStatement::new(
            statement,
            vec![crate::value::Value::Null; insert.columns.len()],
            self.cancel.clone(),
        ))
    }

    /// Close the backend gracefully and unregister.
    ///
    /// Returns `true` only for the call that actually closed the manager.
    pub fn release(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.unregister();
        if let Some(mut backend) = self.backend.lock().take() {
            if let Err(e) = backend.close() {
                log::warn!(
                    "Error closing {} backend of {}: {}",
                    self.backend_name,
                    self.context,
                    e
                );
            }
        }
        log::info!("Released connection manager {}", self.context);
        true
    }

    /// Abort in-flight work and unregister without the graceful close path.
    ///
    /// Cursors blocked on this manager's backend wake up with
    /// [`DaoError::Interrupted`]. Safe to call from any thread.
    pub fn terminate(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        self.unregister();
        if let Some(mut backend) = self.backend.lock().take() {
            backend.kill();
        }
        log::info!("Terminated connection manager {}", self.context);
        true
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.get_mut().take() {
            if let Err(e) = backend.close() {
                log::debug!("Error closing dropped backend of {}: {}", self.context, e);
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("context", &self.context)
            .field("backend", &self.backend_name)
            .field("closed", &self.is_closed())
            .field("created_at", &self.created_at)
            .finish()
    }
}
