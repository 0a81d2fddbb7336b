// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Connection manager registries
//!
//! A [`ManagerRegistry`] maps execution contexts to their live
//! [`ConnectionManager`]. Two flavours exist:
//!
//! - instance registries, created with an explicit provider list, for
//!   embedding several isolated engines in one process (and for tests);
//! - the process-wide registry behind [`ManagerRegistry::global`], whose
//!   providers come from discovery, used by the free functions of
//!   [`crate::manager`].
//!
//! Once [`shutdown_all`](ManagerRegistry::shutdown_all) has run, a registry is
//! sealed and refuses every further acquisition.

use super::connection_manager::ConnectionManager;
use crate::backend::{builtin_providers, discovered_providers, Backend, BackendProvider};
use crate::config::BackendParameters;
use crate::context::ContextId;
use crate::error::{DaoError, DaoResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<ManagerRegistry> = Lazy::new(ManagerRegistry::discovered);

enum ProviderSource {
    Fixed(Vec<Arc<dyn BackendProvider>>),
    Discovered,
}

pub(crate) struct RegistryInner {
    managers: RwLock<HashMap<ContextId, Arc<ConnectionManager>>>,
    sealed: AtomicBool,
    providers: ProviderSource,
}

impl RegistryInner {
    fn providers(&self) -> DaoResult<Vec<Arc<dyn BackendProvider>>> {
        match &self.providers {
            ProviderSource::Fixed(providers) => Ok(providers.clone()),
            ProviderSource::Discovered => discovered_providers(),
        }
    }

    /// Remove `manager`'s entry, unless the slot already holds another manager
    pub(crate) fn remove(&self, manager: &ConnectionManager) {
        let mut managers = self.managers.write();
        let registered = managers
            .get(&manager.context())
            .map_or(false, |entry| std::ptr::eq(entry.as_ref(), manager));
        if registered {
            managers.remove(&manager.context());
        }
    }
}

/// Registry of per-context connection managers
#[derive(Clone)]
pub struct ManagerRegistry {
    inner: Arc<RegistryInner>,
}

impl ManagerRegistry {
    /// Registry trying `providers` in order
    pub fn new(providers: Vec<Arc<dyn BackendProvider>>) -> Self {
        Self::with_source(ProviderSource::Fixed(providers))
    }

    /// Registry over every compiled-in provider, ignoring `EXPRSTORE_BACKENDS`
    pub fn with_builtin_providers() -> Self {
        Self::new(builtin_providers())
    }

    fn discovered() -> Self {
        Self::with_source(ProviderSource::Discovered)
    }

    fn with_source(providers: ProviderSource) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                managers: RwLock::new(HashMap::new()),
                sealed: AtomicBool::new(false),
                providers,
            }),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static ManagerRegistry {
        &GLOBAL_REGISTRY
    }

    /// Manager of the calling context, created on first use.
    ///
    /// With `Some(config)`, each provider in turn gets a fresh backend and the
    /// first one accepting `config` is adopted; an existing manager gets
    /// `config` re-applied instead. With `None`, the first provider is adopted
    /// as is. `Ok(None)` means no provider was available or none accepted.
    pub fn acquire(
        &self,
        config: Option<&BackendParameters>,
    ) -> DaoResult<Option<Arc<ConnectionManager>>> {
        self.ensure_not_sealed()?;
        let context = ContextId::current();

        // a manager terminated on another thread may not be unregistered yet
        let existing = self
            .inner
            .managers
            .read()
            .get(&context)
            .filter(|manager| !manager.is_closed())
            .cloned();
        if let Some(manager) = existing {
            if let Some(config) = config {
                manager.apply_parameters(config)?;
            }
            return Ok(Some(manager));
        }

        let providers = self.inner.providers()?;
        let backend = match Self::select_backend(&providers, config) {
            Some(backend) => backend,
            None => return Ok(None),
        };
        let manager = Arc::new(ConnectionManager::new(
            context,
            backend,
            Arc::downgrade(&self.inner),
        ));

        let mut managers = self.inner.managers.write();
        if self.is_sealed() {
            drop(managers);
            manager.release();
            return Err(Self::sealed_error());
        }
        managers.insert(context, manager.clone());
        drop(managers);

        log::info!(
            "Created connection manager {} on the {} backend",
            context,
            manager.backend_name()
        );
        Ok(Some(manager))
    }

    fn select_backend(
        providers: &[Arc<dyn BackendProvider>],
        config: Option<&BackendParameters>,
    ) -> Option<Box<dyn Backend>> {
        for provider in providers {
            let mut backend = provider.create();
            let config = match config {
                Some(config) => config,
                None => return Some(backend),
            };
            match backend.set_parameters(config) {
                Ok(()) => return Some(backend),
                Err(e) => {
                    log::debug!("Provider '{}' declined: {}", provider.name(), e);
                    if let Err(e) = backend.close() {
                        log::debug!("Error discarding '{}' backend: {}", provider.name(), e);
                    }
                }
            }
        }
        if providers.is_empty() {
            log::warn!("No backend providers are available");
        } else {
            log::warn!("No backend provider accepted the supplied parameters");
        }
        None
    }

    /// Live manager of the calling context, without creating one
    pub fn current(&self) -> Option<Arc<ConnectionManager>> {
        self.inner
            .managers
            .read()
            .get(&ContextId::current())
            .filter(|manager| !manager.is_closed())
            .cloned()
    }

    /// Seal the registry and release every registered manager.
    ///
    /// Returns the number of managers released; later calls return 0.
    pub fn shutdown_all(&self) -> usize {
        self.inner.sealed.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<ConnectionManager>> = self
            .inner
            .managers
            .write()
            .drain()
            .map(|(_, manager)| manager)
            .collect();
        let released = drained.iter().filter(|manager| manager.release()).count();
        if released > 0 {
            log::info!("Shut down {} connection managers", released);
        }
        released
    }

    /// Terminate the manager registered under `id`, from any thread
    pub fn terminate_by_identity(&self, id: u64) -> bool {
        let manager = self
            .inner
            .managers
            .read()
            .get(&ContextId::from_raw(id))
            .cloned();
        match manager {
            Some(manager) => {
                manager.terminate();
                true
            }
            None => {
                log::debug!("No connection manager registered under ctx-{}", id);
                false
            }
        }
    }

    pub fn registered_count(&self) -> usize {
        self.inner.managers.read().len()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::SeqCst)
    }

    fn ensure_not_sealed(&self) -> DaoResult<()> {
        if self.is_sealed() {
            return Err(Self::sealed_error());
        }
        Ok(())
    }

    fn sealed_error() -> DaoError {
        DaoError::IllegalState("connection managers have been shut down".to_string())
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("registered", &self.registered_count())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryProvider;
    use std::thread;

    fn registry() -> ManagerRegistry {
        ManagerRegistry::new(vec![
            Arc::new(MemoryProvider::new("memory")),
            Arc::new(MemoryProvider::new("test")),
        ])
    }

    #[test]
    fn test_one_manager_per_context() {
        let registry = registry();
        let first = registry.acquire(None).unwrap().unwrap();
        let second = registry.acquire(None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.registered_count(), 1);

        let other = registry.clone();
        let from_thread = thread::spawn(move || other.acquire(None).unwrap().unwrap().id())
            .join()
            .unwrap();
        assert_ne!(from_thread, first.id());
        assert_eq!(registry.registered_count(), 2);
    }

    #[test]
    fn test_first_accepting_provider_wins() {
        let registry = registry();
        let manager = registry
            .acquire(Some(&BackendParameters::for_backend("test")))
            .unwrap()
            .unwrap();
        assert_eq!(manager.backend_name(), "test");
    }

    #[test]
    fn test_no_acceptor_yields_none() {
        let registry = registry();
        let acquired = registry
            .acquire(Some(&BackendParameters::for_backend("oracle")))
            .unwrap();
        assert!(acquired.is_none());
        assert_eq!(registry.registered_count(), 0);

        let empty = ManagerRegistry::new(Vec::new());
        assert!(empty.acquire(None).unwrap().is_none());
    }

    #[test]
    fn test_reapplied_configuration_can_be_rejected() {
        let registry = registry();
        let manager = registry
            .acquire(Some(&BackendParameters::for_backend("memory")))
            .unwrap()
            .unwrap();
        let err = registry
            .acquire(Some(&BackendParameters::for_backend("test")))
            .unwrap_err();
        assert!(matches!(err, DaoError::Configuration(_)));
        assert!(!manager.is_closed());
    }

    #[test]
    fn test_release_unregisters_once() {
        let registry = registry();
        let manager = registry.acquire(None).unwrap().unwrap();
        assert!(manager.release());
        assert!(!manager.release());
        assert_eq!(registry.registered_count(), 0);

        let replacement = registry.acquire(None).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&manager, &replacement));
        // a stale manager must not evict its replacement
        assert!(!manager.terminate());
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_closed_manager_still_registered_is_replaced() {
        let registry = registry();
        let manager = registry.acquire(None).unwrap().unwrap();
        manager.mark_closed();
        assert_eq!(registry.registered_count(), 1);

        let replacement = registry.acquire(None).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&manager, &replacement));
        assert!(!replacement.is_closed());
        assert_eq!(registry.current().unwrap().id(), replacement.id());
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_shutdown_seals() {
        let registry = registry();
        let manager = registry.acquire(None).unwrap().unwrap();
        assert_eq!(registry.shutdown_all(), 1);
        assert!(manager.is_closed());
        assert!(registry.is_sealed());
        assert!(matches!(
            registry.acquire(None).unwrap_err(),
            DaoError::IllegalState(_)
        ));
        assert_eq!(registry.shutdown_all(), 0);
    }

    #[test]
    fn test_terminate_by_identity() {
        let registry = registry();
        let manager = registry.acquire(None).unwrap().unwrap();
        assert!(registry.terminate_by_identity(manager.id()));
        assert!(manager.is_closed());
        assert!(manager.cancellation_token().is_cancelled());
        assert!(!registry.terminate_by_identity(manager.id()));
    }
}
