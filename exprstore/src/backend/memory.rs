// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory backend
//!
//! Tables live in a [`MemoryDatabase`]. By default every backend instance gets
//! a private database; `memory.database` attaches it to a named database shared
//! across the process, which is how separate execution contexts see the same
//! data.
//!
//! Parameters:
//! - `memory.database`: name of a shared database
//! - `memory.latency_ms`: delay before each row is delivered
//! - `memory.fault_after_rows`: fail iteration after this many rows

use super::eval::{evaluate, TableData, TableSource};
use super::{ensure_addressed_to, ensure_known_keys, Backend, BackendProvider, BackendStatement, ResultHandle};
use crate::config::BackendParameters;
use crate::context::CancellationToken;
use crate::error::{DaoError, DaoResult};
use crate::query::{CompiledQuery, InsertStatement, QueryPlan};
use crate::value::{Row, Value};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SCOPE: &str = "memory";
const KNOWN_KEYS: &[&str] = &["database", "latency_ms", "fault_after_rows"];

static SHARED_DATABASES: Lazy<Mutex<HashMap<String, Arc<MemoryDatabase>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Named database shared across the process, created on first use
pub fn shared_database(name: &str) -> Arc<MemoryDatabase> {
    SHARED_DATABASES
        .lock()
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(MemoryDatabase::new()))
        .clone()
}

/// Forget a shared database. Backends still attached keep their handle.
pub fn drop_shared_database(name: &str) -> bool {
    SHARED_DATABASES.lock().remove(name).is_some()
}

/// Set of in-memory tables
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Arc<TableData>>>,
    queries_executed: AtomicU64,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table unless one with that name exists
    pub fn create_table(&self, name: &str, columns: &[&str]) -> bool {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return false;
        }
        let columns = columns.iter().map(|c| c.to_string()).collect();
        tables.insert(name.to_string(), Arc::new(TableData::new(columns)));
        true
    }

    /// Append a row. A missing table is created with `columns` as its schema.
    pub fn insert(&self, table: &str, columns: &[String], values: &[Value]) -> DaoResult<()> {
        let mut tables = self.tables.write();
        let data = tables
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(TableData::new(columns.to_vec())));
        let row = data.arrange(columns, values)?;
        Arc::make_mut(data).rows.push(row);
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(|data| data.rows.len())
            .unwrap_or(0)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of query executions served, across all attached backends
    pub fn query_count(&self) -> u64 {
        self.queries_executed.load(Ordering::Relaxed)
    }
}

impl TableSource for MemoryDatabase {
    fn table(&self, name: &str) -> DaoResult<Arc<TableData>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DaoError::Backend(format!("no such table: {}", name)))
    }
}

/// Provider of in-memory backends. Registered as `memory` and as `test`.
#[derive(Debug, Clone, Copy)]
pub struct MemoryProvider {
    name: &'static str,
}

impl MemoryProvider {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl BackendProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create(&self) -> Box<dyn Backend> {
        Box::new(MemoryBackend::new(self.name))
    }
}

pub struct MemoryBackend {
    name: &'static str,
    database: Arc<MemoryDatabase>,
    database_name: Option<String>,
    latency: Duration,
    fault_after_rows: Option<u64>,
    configured: bool,
    killed: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            database: Arc::new(MemoryDatabase::new()),
            database_name: None,
            latency: Duration::ZERO,
            fault_after_rows: None,
            configured: false,
            killed: Arc::new(AtomicBool::new(false)),
            closed: false,
        }
    }

    pub fn database(&self) -> Arc<MemoryDatabase> {
        self.database.clone()
    }

    fn ensure_open(&self) -> DaoResult<()> {
        if self.closed {
            return Err(DaoError::IllegalState(format!(
                "{} backend is closed",
                self.name
            )));
        }
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn set_parameters(&mut self, parameters: &BackendParameters) -> DaoResult<()> {
        ensure_addressed_to(parameters, self.name, SCOPE)?;
        ensure_known_keys(parameters, SCOPE, KNOWN_KEYS)?;

        let latency = parameters
            .parse::<u64>("memory.latency_ms")?
            .map(Duration::from_millis)
            .unwrap_or(self.latency);
        let fault_after_rows = parameters
            .parse::<u64>("memory.fault_after_rows")?
            .or(self.fault_after_rows);

        if let Some(requested) = parameters.get("memory.database") {
            if self.database_name.as_deref() != Some(requested) {
                if self.configured {
                    return Err(DaoError::Configuration(format!(
                        "cannot switch a live {} backend to database '{}'",
                        self.name, requested
                    )));
                }
                self.database = shared_database(requested);
                self.database_name = Some(requested.to_string());
            }
        }

        self.latency = latency;
        self.fault_after_rows = fault_after_rows;
        self.configured = true;
        log::debug!(
            "{} backend configured (database: {}, latency: {:?})",
            self.name,
            self.database_name.as_deref().unwrap_or("<private>"),
            self.latency
        );
        Ok(())
    }

    fn prepare_query(
        &mut self,
        query: &CompiledQuery,
        cancel: CancellationToken,
    ) -> DaoResult<Box<dyn BackendStatement>> {
        self.ensure_open()?;
        Ok(Box::new(MemoryStatement {
            sql: query.sql().to_string(),
            prepared: Prepared::Query(query.plan().clone()),
            database: self.database.clone(),
            cancel,
            latency: self.latency,
            fault_after_rows: self.fault_after_rows,
            killed: self.killed.clone(),
        }))
    }

    fn prepare_insert(&mut self, insert: &InsertStatement) -> DaoResult<Box<dyn BackendStatement>> {
        self.ensure_open()?;
        Ok(Box::new(MemoryStatement {
            sql: insert.to_sql(),
            prepared: Prepared::Insert(insert.clone()),
            database: self.database.clone(),
            cancel: CancellationToken::new(),
            latency: Duration::ZERO,
            fault_after_rows: None,
            killed: self.killed.clone(),
        }))
    }

    fn close(&mut self) -> DaoResult<()> {
        if !self.closed {
            self.closed = true;
            log::debug!("{} backend closed", self.name);
        }
        Ok(())
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        self.closed = true;
        log::debug!("{} backend killed", self.name);
    }
}

enum Prepared {
    Query(QueryPlan),
    Insert(InsertStatement),
}

struct MemoryStatement {
    sql: String,
    prepared: Prepared,
    database: Arc<MemoryDatabase>,
    cancel: CancellationToken,
    latency: Duration,
    fault_after_rows: Option<u64>,
    killed: Arc<AtomicBool>,
}

impl MemoryStatement {
    fn ensure_live(&self) -> DaoResult<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(DaoError::Interrupted("backend was killed".to_string()));
        }
        Ok(())
    }
}

impl BackendStatement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn execute_query(&mut self, parameters: &[Value]) -> DaoResult<Box<dyn ResultHandle>> {
        self.ensure_live()?;
        let plan = match &self.prepared {
            Prepared::Query(plan) => plan,
            Prepared::Insert(_) => {
                return Err(DaoError::Backend(format!("not a query: {}", self.sql)))
            }
        };
        self.database.queries_executed.fetch_add(1, Ordering::Relaxed);
        let rows = evaluate(plan, parameters, self.database.as_ref())?;
        Ok(Box::new(MemoryRows {
            rows: rows.into_iter(),
            cancel: self.cancel.clone(),
            latency: self.latency,
            fault_after_rows: self.fault_after_rows,
            delivered: 0,
            killed: self.killed.clone(),
        }))
    }

    fn execute_update(&mut self, parameters: &[Value]) -> DaoResult<u64> {
        self.ensure_live()?;
        match &self.prepared {
            Prepared::Insert(insert) => {
                self.database
                    .insert(&insert.table, &insert.columns, parameters)?;
                Ok(1)
            }
            Prepared::Query(_) => Err(DaoError::Backend(format!("not a write: {}", self.sql))),
        }
    }
}

struct MemoryRows {
    rows: std::vec::IntoIter<Row>,
    cancel: CancellationToken,
    latency: Duration,
    fault_after_rows: Option<u64>,
    delivered: u64,
    killed: Arc<AtomicBool>,
}

impl ResultHandle for MemoryRows {
    fn next_row(&mut self) -> DaoResult<Option<Row>> {
        if self.killed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return Err(DaoError::Interrupted("query was cancelled".to_string()));
        }
        if !self.latency.is_zero() && self.cancel.wait_timeout(self.latency) {
            return Err(DaoError::Interrupted(
                "query was cancelled while waiting for rows".to_string(),
            ));
        }
        if let Some(limit) = self.fault_after_rows {
            if self.delivered >= limit {
                return Err(DaoError::Backend(format!(
                    "simulated read failure after {} rows",
                    limit
                )));
            }
        }
        let row = self.rows.next();
        if row.is_some() {
            self.delivered += 1;
        }
        Ok(row)
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mapping::fixtures::SAMPLE;
    use crate::query::{QueryCompiler, QuerySpecification};
    use std::thread;
    use std::time::Instant;

    fn seeded(backend: &MemoryBackend) {
        let columns: Vec<String> = ["sampleId", "sampleLabel", "experimentId"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        for id in 1..=3i64 {
            backend
                .database()
                .insert("sample", &columns, &[id.into(), "liver".into(), 10i64.into()])
                .unwrap();
        }
    }

    fn all_samples() -> CompiledQuery {
        QueryCompiler::new(&SAMPLE)
            .compile(&QuerySpecification::new())
            .unwrap()
    }

    fn drain(handle: &mut dyn ResultHandle) -> DaoResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = handle.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[test]
    fn test_shared_database_by_name() {
        let mut a = MemoryBackend::new("memory");
        let mut b = MemoryBackend::new("memory");
        let params = BackendParameters::for_backend("memory").with("memory.database", "shared-by-name");
        a.set_parameters(&params).unwrap();
        b.set_parameters(&params).unwrap();

        seeded(&a);
        assert_eq!(b.database().row_count("sample"), 3);
        assert!(drop_shared_database("shared-by-name"));
    }

    #[test]
    fn test_rejects_foreign_parameters() {
        let mut backend = MemoryBackend::new("memory");
        assert!(backend
            .set_parameters(&BackendParameters::for_backend("sled"))
            .is_err());
        assert!(backend
            .set_parameters(&BackendParameters::new().with("sled.path", "/tmp/db"))
            .is_err());
        assert!(backend
            .set_parameters(&BackendParameters::new().with("memory.speed", "fast"))
            .is_err());
        assert!(backend
            .set_parameters(&BackendParameters::new().with("memory.latency_ms", "soon"))
            .is_err());

        let mut test_backend = MemoryBackend::new("test");
        assert!(test_backend
            .set_parameters(&BackendParameters::for_backend("test"))
            .is_ok());
    }

    #[test]
    fn test_live_backend_keeps_its_database() {
        let mut backend = MemoryBackend::new("memory");
        backend
            .set_parameters(&BackendParameters::new().with("memory.database", "first-db"))
            .unwrap();
        let err = backend
            .set_parameters(&BackendParameters::new().with("memory.database", "second-db"))
            .unwrap_err();
        assert!(matches!(err, DaoError::Configuration(_)));
        backend
            .set_parameters(&BackendParameters::new().with("memory.database", "first-db"))
            .unwrap();
        drop_shared_database("first-db");
    }

    #[test]
    fn test_query_and_count() {
        let mut backend = MemoryBackend::new("memory");
        seeded(&backend);
        let mut stmt = backend
            .prepare_query(&all_samples(), CancellationToken::new())
            .unwrap();
        let mut handle = stmt.execute_query(&[]).unwrap();
        assert_eq!(drain(handle.as_mut()).unwrap().len(), 3);
        assert_eq!(backend.database().query_count(), 1);
    }

    #[test]
    fn test_fault_injection() {
        let mut backend = MemoryBackend::new("memory");
        backend
            .set_parameters(&BackendParameters::new().with("memory.fault_after_rows", "2"))
            .unwrap();
        seeded(&backend);
        let mut stmt = backend
            .prepare_query(&all_samples(), CancellationToken::new())
            .unwrap();
        let mut handle = stmt.execute_query(&[]).unwrap();
        assert!(handle.next_row().unwrap().is_some());
        assert!(handle.next_row().unwrap().is_some());
        assert!(matches!(handle.next_row(), Err(DaoError::Backend(_))));
    }

    #[test]
    fn test_cancel_interrupts_slow_rows() {
        let mut backend = MemoryBackend::new("memory");
        backend
            .set_parameters(&BackendParameters::new().with("memory.latency_ms", "60000"))
            .unwrap();
        seeded(&backend);
        let token = CancellationToken::new();
        let mut stmt = backend.prepare_query(&all_samples(), token.clone()).unwrap();
        let mut handle = stmt.execute_query(&[]).unwrap();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let start = Instant::now();
        let err = handle.next_row().unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_interrupted());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_closed_backend_refuses_work() {
        let mut backend = MemoryBackend::new("memory");
        backend.close().unwrap();
        assert!(matches!(
            backend.prepare_query(&all_samples(), CancellationToken::new()),
            Err(DaoError::IllegalState(_))
        ));
    }
}
