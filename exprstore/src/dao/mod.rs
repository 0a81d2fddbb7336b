// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Data access objects
//!
//! Every entity DAO is a thin wrapper around [`EntityDao`], which holds the
//! connection manager, compiles specifications against the entity's mapping
//! and wraps the raw rows in an entity-typed cursor. Identifier sub-queries
//! are resolved through the same manager before the main query runs.

pub mod condition;
pub mod expression;
pub mod gene;
pub mod species;

pub use condition::{AnatEntity, Condition, ConditionDao, ConditionFilter, DevStage};
pub use expression::{CallFilter, ExpressionCall, ExpressionCallDao};
pub use gene::{Gene, GeneDao, GeneFilter};
pub use species::{Species, SpeciesDao};

use crate::cursor::{CursorOptions, StreamingResultCursor};
use crate::error::{DaoError, DaoResult};
use crate::manager::ConnectionManager;
use crate::query::{
    CompiledQuery, EntityMapping, InsertStatement, Predicate, QueryCompiler, QuerySpecification,
};
use crate::value::{Row, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Rows between two progress messages of a batch insert
pub const INSERT_PROGRESS_INTERVAL: usize = 1000;

/// A type read from one entity's rows
pub trait Entity: Sized + Send + 'static {
    fn mapping() -> &'static EntityMapping;

    /// Build from a row labeled with attribute names. Attributes that were
    /// not requested are left unset.
    fn from_row(row: Row) -> DaoResult<Self>;
}

/// Paging and deduplication settings shared by the entity DAOs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub page_size: Option<u64>,
    pub filter_duplicates: bool,
}

impl QueryOptions {
    pub fn paginated(page_size: u64) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn apply(&self, mut spec: QuerySpecification) -> QuerySpecification {
        if let Some(offset) = self.offset {
            spec = spec.offset(offset);
        }
        if let Some(limit) = self.limit {
            spec = spec.limit(limit);
        }
        if let Some(page_size) = self.page_size {
            spec = spec.paginate(page_size);
        }
        spec
    }

    pub fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            filter_duplicates: self.filter_duplicates,
        }
    }
}

/// Generic DAO over one entity type
pub struct EntityDao<E: Entity> {
    manager: Arc<ConnectionManager>,
    compiler: QueryCompiler,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityDao<E> {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            compiler: QueryCompiler::new(E::mapping()),
            _entity: PhantomData,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Compile `spec`, executing identifier sub-queries on this DAO's manager
    pub fn compile(&self, spec: &QuerySpecification) -> DaoResult<CompiledQuery> {
        let manager = &self.manager;
        let mut resolver = |subquery: &CompiledQuery| resolve_identifiers(manager, subquery);
        self.compiler.compile_with_resolver(spec, &mut resolver)
    }

    pub fn query(&self, spec: &QuerySpecification) -> DaoResult<StreamingResultCursor<E>> {
        self.query_with(spec, CursorOptions::default())
    }

    pub fn query_with(
        &self,
        spec: &QuerySpecification,
        options: CursorOptions,
    ) -> DaoResult<StreamingResultCursor<E>> {
        self.open(spec, options, E::from_row)
    }

    /// Query returning raw rows instead of entities
    pub fn query_rows(
        &self,
        spec: &QuerySpecification,
        options: CursorOptions,
    ) -> DaoResult<StreamingResultCursor<Row>> {
        self.open(spec, options, Ok)
    }

    fn open<T, F>(
        &self,
        spec: &QuerySpecification,
        options: CursorOptions,
        mapper: F,
    ) -> DaoResult<StreamingResultCursor<T>>
    where
        F: Fn(Row) -> DaoResult<T> + Send + 'static,
    {
        let compiled = self.compile(spec)?;
        if compiled.is_provably_empty() {
            log::debug!(
                "{} query is provably empty, not executing it",
                E::mapping().entity
            );
            return Ok(StreamingResultCursor::empty());
        }
        let statement = self.manager.prepare(&compiled)?;
        StreamingResultCursor::open(statement, compiled.pagination(), options, mapper)
    }

    /// Entities whose key attribute is in `ids`
    pub fn get_by_ids(&self, ids: &[i64]) -> DaoResult<StreamingResultCursor<E>> {
        let key = E::mapping().key_attributes.first().ok_or_else(|| {
            DaoError::InvalidSpecification(format!("{} has no key attribute", E::mapping().entity))
        })?;
        let spec = QuerySpecification::new().filter(Predicate::in_values(*key, ids.iter().copied()));
        self.query(&spec)
    }

    /// Insert `records` one row at a time through a single prepared statement.
    /// Returns the number of rows written.
    pub fn insert_batch<R>(
        &self,
        insert: &InsertStatement,
        records: &[R],
        to_values: impl Fn(&R) -> Vec<Value>,
    ) -> DaoResult<u64> {
        if records.is_empty() {
            return Err(DaoError::InvalidArgument(format!(
                "no {} records to insert",
                insert.table
            )));
        }
        let mut statement = self.manager.prepare_insert(insert)?;
        let mut written = 0u64;
        for (i, record) in records.iter().enumerate() {
            for (index, value) in to_values(record).into_iter().enumerate() {
                statement.bind(index, value)?;
            }
            written += statement.execute_update()?;
            if (i + 1) % INSERT_PROGRESS_INTERVAL == 0 {
                log::info!(
                    "Inserted {} of {} {} rows",
                    i + 1,
                    records.len(),
                    insert.table
                );
            }
        }
        log::info!("Inserted {} rows into {}", written, insert.table);
        Ok(written)
    }
}

/// Execute an identifier sub-query and collect its non-NULL first column
fn resolve_identifiers(
    manager: &ConnectionManager,
    subquery: &CompiledQuery,
) -> DaoResult<Vec<Value>> {
    let statement = manager.prepare(subquery)?;
    let cursor = StreamingResultCursor::open(
        statement,
        subquery.pagination(),
        CursorOptions::default(),
        |row: Row| Ok(row.values().next().cloned().unwrap_or(Value::Null)),
    )?;
    let identifiers: Vec<Value> = cursor
        .collect_all()?
        .into_iter()
        .filter(|value| !value.is_null())
        .collect();
    log::debug!(
        "Identifier sub-query returned {} values: {}",
        identifiers.len(),
        subquery.sql()
    );
    Ok(identifiers)
}

impl ConnectionManager {
    pub fn species_dao(self: &Arc<Self>) -> SpeciesDao {
        SpeciesDao::new(self.clone())
    }

    pub fn gene_dao(self: &Arc<Self>) -> GeneDao {
        GeneDao::new(self.clone())
    }

    pub fn condition_dao(self: &Arc<Self>) -> ConditionDao {
        ConditionDao::new(self.clone())
    }

    pub fn expression_call_dao(self: &Arc<Self>) -> ExpressionCallDao {
        ExpressionCallDao::new(self.clone())
    }
}

pub(crate) fn text(row: &Row, label: &str) -> Option<String> {
    row.get_text(label).map(str::to_string)
}

/// Restrict `attribute` to `values`; an empty list leaves `spec` unrestricted
pub(crate) fn in_filter<V, I>(spec: QuerySpecification, attribute: &str, values: I) -> QuerySpecification
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        spec
    } else {
        spec.filter(Predicate::in_values(attribute, values))
    }
}
