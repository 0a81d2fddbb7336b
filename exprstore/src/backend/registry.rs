// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Backend provider discovery
//!
//! Providers are compiled in. `EXPRSTORE_BACKENDS` (comma-separated names)
//! restricts and orders them; discovery runs once per process.

use super::memory::MemoryProvider;
use super::BackendProvider;
use crate::error::{DaoError, DaoResult};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Environment variable restricting the providers in use
pub const BACKENDS_ENV: &str = "EXPRSTORE_BACKENDS";

static DISCOVERED: Lazy<DaoResult<Vec<Arc<dyn BackendProvider>>>> = Lazy::new(|| {
    let filter = std::env::var(BACKENDS_ENV).ok();
    let result = resolve_providers(filter.as_deref());
    match &result {
        Ok(providers) => log::info!(
            "Discovered backend providers: {}",
            providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Err(e) => log::warn!("Backend discovery failed: {}", e),
    }
    result
});

/// Every compiled-in provider, in default order
pub fn builtin_providers() -> Vec<Arc<dyn BackendProvider>> {
    let mut providers: Vec<Arc<dyn BackendProvider>> = vec![
        Arc::new(MemoryProvider::new("memory")),
        Arc::new(MemoryProvider::new("test")),
    ];
    #[cfg(feature = "sled-backend")]
    providers.push(Arc::new(super::sled::SledProvider));
    providers
}

/// Select providers by a comma-separated list of names.
///
/// `None` or a blank filter selects every builtin provider. Naming an unknown
/// provider is a configuration error.
pub fn resolve_providers(filter: Option<&str>) -> DaoResult<Vec<Arc<dyn BackendProvider>>> {
    let builtin = builtin_providers();
    let names: Vec<&str> = filter
        .map(|f| f.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();
    if names.is_empty() {
        return Ok(builtin);
    }

    let mut selected: Vec<Arc<dyn BackendProvider>> = Vec::with_capacity(names.len());
    for name in names {
        let provider = builtin
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| {
                DaoError::Configuration(format!(
                    "unknown backend provider '{}' in {}",
                    name, BACKENDS_ENV
                ))
            })?;
        if !selected.iter().any(|p| p.name() == name) {
            selected.push(provider.clone());
        }
    }
    Ok(selected)
}

/// Providers discovered for this process
pub fn discovered_providers() -> DaoResult<Vec<Arc<dyn BackendProvider>>> {
    (*DISCOVERED).clone()
}
