//! Test fixture for ExprStore integration tests
//!
//! Every fixture owns its own `ManagerRegistry`, so tests never touch (or seal)
//! the process-wide registry, and its own shared memory database, so tests
//! running in parallel do not see each other's rows.

use exprstore::backend::{drop_shared_database, shared_database, MemoryDatabase};
use exprstore::{BackendParameters, ConnectionManager, ManagerRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_DATABASE: AtomicU64 = AtomicU64::new(1);

pub struct TestFixture {
    registry: ManagerRegistry,
    manager: Arc<ConnectionManager>,
    database_name: String,
}

impl TestFixture {
    /// Fixture over an empty database
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();

        let database_name = format!(
            "test_db_{}_{}",
            std::process::id(),
            NEXT_DATABASE.fetch_add(1, Ordering::Relaxed)
        );
        let registry = ManagerRegistry::with_builtin_providers();
        let parameters =
            BackendParameters::for_backend("memory").with("memory.database", database_name.as_str());
        let manager = registry
            .acquire(Some(&parameters))?
            .ok_or("memory backend did not accept the fixture parameters")?;

        Ok(TestFixture {
            registry,
            manager,
            database_name,
        })
    }

    /// Fixture seeded with the sample knowledge base
    pub fn with_sample_data() -> Result<Self, Box<dyn std::error::Error>> {
        let fixture = Self::new()?;
        super::sample_data::load(&fixture.manager)?;
        Ok(fixture)
    }

    pub fn registry(&self) -> &ManagerRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn database(&self) -> Arc<MemoryDatabase> {
        shared_database(&self.database_name)
    }

    /// Parameters addressing this fixture's database, for re-configuration
    pub fn parameters(&self) -> BackendParameters {
        BackendParameters::for_backend("memory").with("memory.database", self.database_name.as_str())
    }

    /// Queries executed against this fixture's database so far
    pub fn queries_executed(&self) -> u64 {
        self.database().query_count()
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        self.manager.release();
        drop_shared_database(&self.database_name);
    }
}
