// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Sled backend
//!
//! Each table is a sled tree of bincode-encoded rows keyed by a monotonically
//! generated id, so a scan returns rows in insertion order. Column lists are
//! kept in the `__schema` tree.
//!
//! Sled locks its directory for the whole process, so backends opened on the
//! same path share one `sled::Db` handle. The directory is unlocked once the
//! last backend and statement holding the handle are gone.

use super::eval::{evaluate, TableData, TableSource};
use super::{ensure_addressed_to, ensure_known_keys, Backend, BackendProvider, BackendStatement, ResultHandle};
use crate::config::BackendParameters;
use crate::context::CancellationToken;
use crate::error::{DaoError, DaoResult};
use crate::query::{CompiledQuery, InsertStatement, QueryPlan};
use crate::value::{Row, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

const SCOPE: &str = "sled";
const KNOWN_KEYS: &[&str] = &["path", "temporary"];
const SCHEMA_TREE: &str = "__schema";
const OPEN_ATTEMPTS: u32 = 10;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(25);

static OPEN_DATABASES: Lazy<Mutex<HashMap<PathBuf, Weak<sled::Db>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Handle on the database at `path`, shared with every other live backend on it
fn open_shared(path: &Path) -> DaoResult<Arc<sled::Db>> {
    std::fs::create_dir_all(path)?;
    let key = std::fs::canonicalize(path)?;
    let mut open = OPEN_DATABASES.lock();
    if let Some(db) = open.get(&key).and_then(Weak::upgrade) {
        log::debug!("Reusing open sled database {:?}", key);
        return Ok(db);
    }
    open.retain(|_, db| db.strong_count() > 0);

    // the previous handle may still be releasing its lock on another thread
    let mut attempt = 1;
    let db = loop {
        match sled::Config::new().path(path).open() {
            Ok(db) => break db,
            Err(e) if attempt < OPEN_ATTEMPTS => {
                log::debug!("Opening sled database {:?} failed (attempt {}): {}", path, attempt, e);
                attempt += 1;
                std::thread::sleep(OPEN_RETRY_DELAY);
            }
            Err(e) => {
                return Err(DaoError::Configuration(format!(
                    "failed to open sled database {:?}: {}",
                    path, e
                )))
            }
        }
    };
    let db = Arc::new(db);
    open.insert(key, Arc::downgrade(&db));
    Ok(db)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SledProvider;

impl BackendProvider for SledProvider {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn create(&self) -> Box<dyn Backend> {
        Box::new(SledBackend::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Path(PathBuf),
    Temporary,
}

pub struct SledBackend {
    db: Option<Arc<sled::Db>>,
    location: Option<Location>,
    killed: Arc<AtomicBool>,
}

impl SledBackend {
    pub fn new() -> Self {
        Self {
            db: None,
            location: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn db(&self) -> DaoResult<&Arc<sled::Db>> {
        self.db.as_ref().ok_or_else(|| {
            DaoError::IllegalState("sled backend is closed or was never configured".to_string())
        })
    }

    fn open(location: &Location) -> DaoResult<Arc<sled::Db>> {
        match location {
            Location::Path(path) => open_shared(path),
            Location::Temporary => sled::Config::new()
                .temporary(true)
                .open()
                .map(Arc::new)
                .map_err(|e| {
                    DaoError::Configuration(format!("failed to open temporary sled database: {}", e))
                }),
        }
    }
}

impl Default for SledBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SledBackend {
    fn name(&self) -> &str {
        "sled"
    }

    fn set_parameters(&mut self, parameters: &BackendParameters) -> DaoResult<()> {
        ensure_addressed_to(parameters, "sled", SCOPE)?;
        ensure_known_keys(parameters, SCOPE, KNOWN_KEYS)?;

        let temporary = parameters.parse::<bool>("sled.temporary")?.unwrap_or(false);
        let requested = match parameters.get("sled.path") {
            Some(path) => Some(Location::Path(PathBuf::from(path))),
            None if temporary => Some(Location::Temporary),
            None => None,
        };

        match (&self.location, requested) {
            (None, None) => Err(DaoError::Configuration(
                "sled backend needs sled.path or sled.temporary=true".to_string(),
            )),
            (None, Some(location)) => {
                let db = Self::open(&location)?;
                log::info!("Opened sled database {:?}", location);
                self.db = Some(db);
                self.location = Some(location);
                Ok(())
            }
            (Some(_), None) => Ok(()),
            (Some(current), Some(location)) if *current == location => Ok(()),
            (Some(current), Some(location)) => Err(DaoError::Configuration(format!(
                "cannot move a live sled backend from {:?} to {:?}",
                current, location
            ))),
        }
    }

    fn prepare_query(
        &mut self,
        query: &CompiledQuery,
        cancel: CancellationToken,
    ) -> DaoResult<Box<dyn BackendStatement>> {
        let db = self.db()?.clone();
        Ok(Box::new(SledStatement {
            sql: query.sql().to_string(),
            prepared: Prepared::Query(query.plan().clone()),
            db,
            cancel,
            killed: self.killed.clone(),
        }))
    }

    fn prepare_insert(&mut self, insert: &InsertStatement) -> DaoResult<Box<dyn BackendStatement>> {
        let db = self.db()?.clone();
        Ok(Box::new(SledStatement {
            sql: insert.to_sql(),
            prepared: Prepared::Insert(insert.clone()),
            db,
            cancel: CancellationToken::new(),
            killed: self.killed.clone(),
        }))
    }

    fn close(&mut self) -> DaoResult<()> {
        if let Some(db) = self.db.take() {
            db.flush()?;
            log::debug!("Closed sled database {:?}", self.location);
        }
        Ok(())
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        self.db = None;
        log::debug!("Killed sled backend {:?}", self.location);
    }
}

enum Prepared {
    Query(QueryPlan),
    Insert(InsertStatement),
}

struct SledStatement {
    sql: String,
    prepared: Prepared,
    db: Arc<sled::Db>,
    cancel: CancellationToken,
    killed: Arc<AtomicBool>,
}

impl SledStatement {
    fn ensure_live(&self) -> DaoResult<()> {
        if self.killed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return Err(DaoError::Interrupted("sled backend was killed".to_string()));
        }
        Ok(())
    }

    fn schema(&self, table: &str) -> DaoResult<Option<Vec<String>>> {
        let schema = self.db.open_tree(SCHEMA_TREE)?;
        match schema.get(table.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl TableSource for SledStatement {
    fn table(&self, name: &str) -> DaoResult<Arc<TableData>> {
        let columns = self
            .schema(name)?
            .ok_or_else(|| DaoError::Backend(format!("no such table: {}", name)))?;
        let tree = self.db.open_tree(name)?;
        let mut data = TableData::new(columns);
        for entry in tree.iter() {
            self.ensure_live()?;
            let (_, bytes) = entry?;
            data.rows.push(bincode::deserialize(&bytes)?);
        }
        Ok(Arc::new(data))
    }
}

impl BackendStatement for SledStatement {
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
        let rows = evaluate(plan, parameters, &*self)?;
        Ok(Box::new(SledRows {
            rows: rows.into_iter(),
            cancel: self.cancel.clone(),
        }))
    }

    fn execute_update(&mut self, parameters: &[Value]) -> DaoResult<u64> {
        self.ensure_live()?;
        let insert = match &self.prepared {
            Prepared::Insert(insert) => insert,
            Prepared::Query(_) => {
                return Err(DaoError::Backend(format!("not a write: {}", self.sql)))
            }
        };

        let columns = match self.schema(&insert.table)? {
            Some(columns) => columns,
            None => {
                let schema = self.db.open_tree(SCHEMA_TREE)?;
                schema.insert(insert.table.as_bytes(), bincode::serialize(&insert.columns)?)?;
                insert.columns.clone()
            }
        };
        let row = TableData::new(columns).arrange(&insert.columns, parameters)?;

        let tree = self.db.open_tree(&insert.table)?;
        let key = self.db.generate_id()?;
        tree.insert(key.to_be_bytes(), bincode::serialize(&row)?)?;
        Ok(1)
    }
}

struct SledRows {
    rows: std::vec::IntoIter<Row>,
    cancel: CancellationToken,
}

impl ResultHandle for SledRows {
    fn next_row(&mut self) -> DaoResult<Option<Row>> {
        if self.cancel.is_cancelled() {
            return Err(DaoError::Interrupted("query was cancelled".to_string()));
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mapping::fixtures::SAMPLE;
    use crate::query::{Predicate, QueryCompiler, QuerySpecification};
    use tempfile::TempDir;

    fn insert_samples(backend: &mut SledBackend) {
        let insert = InsertStatement::new("sample", ["sampleId", "sampleLabel", "experimentId"]);
        let mut stmt = backend.prepare_insert(&insert).unwrap();
        for (id, label) in [(2i64, "liver"), (1, "brain"), (3, "liver")] {
            stmt.execute_update(&[id.into(), label.into(), 10i64.into()])
                .unwrap();
        }
    }

    fn labels_of_liver(backend: &mut SledBackend) -> Vec<i64> {
        let compiled = QueryCompiler::new(&SAMPLE)
            .compile(&QuerySpecification::new().filter(Predicate::eq("label", "liver")))
            .unwrap();
        let mut stmt = backend
            .prepare_query(&compiled, CancellationToken::new())
            .unwrap();
        let mut handle = stmt.execute_query(compiled.parameters()).unwrap();
        let mut ids = Vec::new();
        while let Some(row) = handle.next_row().unwrap() {
            ids.extend(row.get_integer("id"));
        }
        ids
    }

    #[test]
    fn test_requires_location() {
        let mut backend = SledBackend::new();
        let err = backend
            .set_parameters(&BackendParameters::for_backend("sled"))
            .unwrap_err();
        assert!(matches!(err, DaoError::Configuration(_)));
        assert!(backend
            .set_parameters(&BackendParameters::new().with("memory.database", "x"))
            .is_err());
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let params = BackendParameters::for_backend("sled")
            .with("sled.path", dir.path().to_string_lossy().to_string());

        let mut backend = SledBackend::new();
        backend.set_parameters(&params).unwrap();
        insert_samples(&mut backend);
        assert_eq!(labels_of_liver(&mut backend), vec![2, 3]);
        backend.close().unwrap();

        let mut reopened = SledBackend::new();
        reopened.set_parameters(&params).unwrap();
        assert_eq!(labels_of_liver(&mut reopened), vec![2, 3]);
        reopened.close().unwrap();
    }

    #[test]
    fn test_backends_on_one_path_share_the_database() {
        let dir = TempDir::new().unwrap();
        let params = BackendParameters::for_backend("sled")
            .with("sled.path", dir.path().to_string_lossy().to_string());

        let mut first = SledBackend::new();
        first.set_parameters(&params).unwrap();
        let mut second = SledBackend::new();
        second.set_parameters(&params).unwrap();

        insert_samples(&mut first);
        assert_eq!(labels_of_liver(&mut second), vec![2, 3]);
        first.close().unwrap();
        assert_eq!(labels_of_liver(&mut second), vec![2, 3]);
        second.close().unwrap();

        let mut third = SledBackend::new();
        third.set_parameters(&params).unwrap();
        assert_eq!(labels_of_liver(&mut third), vec![2, 3]);
        third.close().unwrap();
    }

    #[test]
    fn test_location_is_fixed_once_open() {
        let mut backend = SledBackend::new();
        backend
            .set_parameters(&BackendParameters::new().with("sled.temporary", "true"))
            .unwrap();
        let err = backend
            .set_parameters(&BackendParameters::new().with("sled.path", "/tmp/elsewhere"))
            .unwrap_err();
        assert!(matches!(err, DaoError::Configuration(_)));
        assert!(backend
            .set_parameters(&BackendParameters::for_backend("sled"))
            .is_ok());
    }

    #[test]
    fn test_killed_backend_interrupts_statements() {
        let mut backend = SledBackend::new();
        backend
            .set_parameters(&BackendParameters::new().with("sled.temporary", "true"))
            .unwrap();
        insert_samples(&mut backend);
        let compiled = QueryCompiler::new(&SAMPLE)
            .compile(&QuerySpecification::new())
            .unwrap();
        let mut stmt = backend
            .prepare_query(&compiled, CancellationToken::new())
            .unwrap();
        backend.kill();
        assert!(matches!(stmt.execute_query(&[]), Err(DaoError::Interrupted(_))));
        assert!(matches!(
            backend.prepare_query(&compiled, CancellationToken::new()),
            Err(DaoError::IllegalState(_))
        ));
    }
}
