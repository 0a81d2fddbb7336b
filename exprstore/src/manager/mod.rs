// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Connection lifecycle
//!
//! The free functions in this module operate on the process-wide
//! [`ManagerRegistry`]. Embedders wanting isolation create their own registry
//! with [`ManagerRegistry::new`].

mod connection_manager;
mod registry;

pub use connection_manager::ConnectionManager;
pub use registry::ManagerRegistry;

use crate::config::BackendParameters;
use crate::error::DaoResult;
use std::sync::Arc;

/// Manager of the calling context in the process-wide registry
pub fn acquire(config: Option<&BackendParameters>) -> DaoResult<Option<Arc<ConnectionManager>>> {
    ManagerRegistry::global().acquire(config)
}

/// Live manager of the calling context, if one was acquired
pub fn current() -> Option<Arc<ConnectionManager>> {
    ManagerRegistry::global().current()
}

/// Seal the process-wide registry and release every manager
pub fn shutdown_all() -> usize {
    ManagerRegistry::global().shutdown_all()
}

pub fn terminate_by_identity(id: u64) -> bool {
    ManagerRegistry::global().terminate_by_identity(id)
}

pub fn registered_count() -> usize {
    ManagerRegistry::global().registered_count()
}

pub fn is_sealed() -> bool {
    ManagerRegistry::global().is_sealed()
}
