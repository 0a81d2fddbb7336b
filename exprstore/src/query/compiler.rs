// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Query specification compiler
//!
//! Translates a [`QuerySpecification`] plus an [`EntityMapping`] into a
//! [`CompiledQuery`]:
//!
//! 1. projection, with `DISTINCT` when the key attributes are not all requested
//! 2. joins, included only when a projected, filtered or ordered attribute needs them
//! 3. predicates, AND-ed across filters, OR-groups parenthesized
//! 4. two-phase resolution of identifier sub-queries
//! 5. ordering, falling back to the entity's default ordering
//! 6. `LIMIT ? OFFSET ?`, always as bound parameters

use super::mapping::{AttributeMapping, EntityMapping};
use super::plan::{
    ColumnRef, CompiledQuery, Condition, OrderTerm, PaginationBinding, PlannedJoin,
    ProjectedColumn, QueryPlan,
};
use super::specification::{Direction, Predicate, QuerySpecification};
use crate::error::{DaoError, DaoResult};
use crate::value::Value;
use std::collections::{BTreeSet, HashSet};

/// Executes an identifier sub-query and returns the identifiers it produced
pub type IdentifierResolver<'a> = dyn FnMut(&CompiledQuery) -> DaoResult<Vec<Value>> + 'a;

/// Result of compiling one predicate
#[derive(Debug)]
enum Compiled {
    /// Always true; contributes nothing to the WHERE clause
    Always,
    /// Provably false
    Never,
    Cond(Condition),
}

#[derive(Debug, Clone, Default)]
struct CompileState {
    parameters: Vec<Value>,
    aliases: BTreeSet<&'static str>,
}

impl CompileState {
    fn bind(&mut self, value: Value) -> usize {
        self.parameters.push(value);
        self.parameters.len() - 1
    }

    fn mark(&self) -> (usize, BTreeSet<&'static str>) {
        (self.parameters.len(), self.aliases.clone())
    }

    fn rollback(&mut self, mark: (usize, BTreeSet<&'static str>)) {
        self.parameters.truncate(mark.0);
        self.aliases = mark.1;
    }
}

/// Compiles specifications for one entity
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler {
    mapping: &'static EntityMapping,
}

impl QueryCompiler {
    pub fn new(mapping: &'static EntityMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &'static EntityMapping {
        self.mapping
    }

    /// Compile a specification that contains no two-phase predicates
    pub fn compile(&self, spec: &QuerySpecification) -> DaoResult<CompiledQuery> {
        let mut refuse = |sub: &CompiledQuery| -> DaoResult<Vec<Value>> {
            Err(DaoError::InvalidSpecification(format!(
                "identifier sub-query needs a resolver: {}",
                sub.sql()
            )))
        };
        self.compile_with_resolver(spec, &mut refuse)
    }

    /// Compile a specification, running identifier sub-queries through `resolver`
    pub fn compile_with_resolver(
        &self,
        spec: &QuerySpecification,
        resolver: &mut IdentifierResolver<'_>,
    ) -> DaoResult<CompiledQuery> {
        if spec.page_size() == Some(0) {
            return Err(DaoError::InvalidSpecification(
                "page size must be greater than zero".to_string(),
            ));
        }

        let mut state = CompileState::default();

        // 1. projection
        let requested = spec.requested_attributes();
        let projected: Vec<&AttributeMapping> = if requested.is_empty() {
            self.mapping.primary_attributes().collect()
        } else {
            requested
                .iter()
                .map(|name| self.mapping.attribute(name))
                .collect::<DaoResult<_>>()?
        };
        let distinct = !requested.is_empty() && !self.mapping.covers_key(requested);
        let projection: Vec<ProjectedColumn> = projected
            .iter()
            .map(|attr| ProjectedColumn {
                column: ColumnRef::new(attr.alias, attr.column),
                label: attr.name.to_string(),
            })
            .collect();
        let projection_aliases: BTreeSet<&'static str> =
            projected.iter().map(|attr| attr.alias).collect();
        state.aliases.extend(projection_aliases.iter().copied());

        // 3-4. predicates, resolving sub-queries on the way
        let mut conditions = Vec::new();
        let mut never = false;
        for predicate in spec.filters() {
            match self.compile_predicate(predicate, &mut state, resolver)? {
                Compiled::Always => {}
                Compiled::Never => {
                    never = true;
                    break;
                }
                Compiled::Cond(condition) => conditions.push(condition),
            }
        }

        // 5. ordering
        let requested_order: Vec<(String, Direction)> = if spec.ordering().is_empty() {
            self.mapping
                .default_order
                .iter()
                .map(|attr| (attr.to_string(), Direction::Asc))
                .collect()
        } else {
            spec.ordering().to_vec()
        };
        let mut order_by = Vec::with_capacity(requested_order.len());
        for (name, direction) in &requested_order {
            let attr = self.mapping.attribute(name)?;
            state.aliases.insert(attr.alias);
            order_by.push(OrderTerm {
                column: ColumnRef::new(attr.alias, attr.column),
                direction: *direction,
            });
        }

        if never {
            return Ok(self.provably_empty(projection, distinct, projection_aliases, order_by));
        }

        // 2. joins, now that every referenced alias is known
        let joins = self.resolve_joins(&state.aliases);

        // 6. pagination
        let mut pagination = None;
        let (mut limit_param, mut offset_param) = (None, None);
        if spec.has_pagination() {
            let start_offset = spec.offset_value().unwrap_or(0);
            let first_limit = match (spec.page_size(), spec.limit_value()) {
                (Some(page), Some(limit)) => page.min(limit),
                (Some(page), None) => page,
                (None, Some(limit)) => limit,
                (None, None) => u64::MAX,
            };
            let limit_index = state.bind(Value::Integer(clamp_i64(first_limit)));
            let offset_index = state.bind(Value::Integer(clamp_i64(start_offset)));
            limit_param = Some(limit_index);
            offset_param = Some(offset_index);
            pagination = Some(PaginationBinding {
                limit_index,
                offset_index,
                start_offset,
                limit: spec.limit_value(),
                page_size: spec.page_size(),
            });
        }

        let condition = match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        };

        let plan = QueryPlan {
            table: self.mapping.table.to_string(),
            alias: self.mapping.alias.to_string(),
            joins,
            projection,
            distinct,
            condition,
            order_by,
            limit_param,
            offset_param,
        };
        let sql = plan.to_sql();
        log::debug!("Compiled {} query: {}", self.mapping.entity, sql);

        Ok(CompiledQuery {
            sql,
            parameters: state.parameters,
            plan,
            pagination,
            provably_empty: false,
        })
    }

    fn provably_empty(
        &self,
        projection: Vec<ProjectedColumn>,
        distinct: bool,
        aliases: BTreeSet<&'static str>,
        order_by: Vec<OrderTerm>,
    ) -> CompiledQuery {
        let joins = self.resolve_joins(&aliases);
        let order_by = order_by
            .into_iter()
            .filter(|term| {
                term.column.alias == self.mapping.alias
                    || joins.iter().any(|join| join.alias == term.column.alias)
            })
            .collect();
        let plan = QueryPlan {
            table: self.mapping.table.to_string(),
            alias: self.mapping.alias.to_string(),
            joins,
            projection,
            distinct,
            condition: Some(Condition::False),
            order_by,
            limit_param: None,
            offset_param: None,
        };
        let sql = plan.to_sql();
        log::debug!(
            "{} query short-circuited to an empty result: {}",
            self.mapping.entity,
            sql
        );
        CompiledQuery {
            sql,
            parameters: Vec::new(),
            plan,
            pagination: None,
            provably_empty: true,
        }
    }

    fn column(&self, name: &str, state: &mut CompileState) -> DaoResult<ColumnRef> {
        let attr = self.mapping.attribute(name)?;
        state.aliases.insert(attr.alias);
        Ok(ColumnRef::new(attr.alias, attr.column))
    }

    /// Compile one predicate. A predicate that folds to `Always` or `Never`
    /// leaves no parameters or join aliases behind.
    fn compile_predicate(
        &self,
        predicate: &Predicate,
        state: &mut CompileState,
        resolver: &mut IdentifierResolver<'_>,
    ) -> DaoResult<Compiled> {
        let mark = state.mark();
        let compiled = self.compile_part(predicate, state, resolver)?;
        if !matches!(compiled, Compiled::Cond(_)) {
            state.rollback(mark);
        }
        Ok(compiled)
    }

    fn compile_part(
        &self,
        predicate: &Predicate,
        state: &mut CompileState,
        resolver: &mut IdentifierResolver<'_>,
    ) -> DaoResult<Compiled> {
        match predicate {
            Predicate::Compare {
                attribute,
                op,
                value,
            } => {
                let column = self.column(attribute, state)?;
                let param = state.bind(value.clone());
                Ok(Compiled::Cond(Condition::Compare {
                    column,
                    op: *op,
                    param,
                }))
            }
            Predicate::In { attribute, values } => {
                let column = self.column(attribute, state)?;
                Ok(self.in_condition(column, values.iter().cloned(), state))
            }
            Predicate::IsNull { attribute, negated } => {
                let column = self.column(attribute, state)?;
                Ok(Compiled::Cond(Condition::IsNull {
                    column,
                    negated: *negated,
                }))
            }
            Predicate::All(parts) => {
                let mut conditions = Vec::new();
                for part in parts {
                    match self.compile_predicate(part, state, resolver)? {
                        Compiled::Always => {}
                        Compiled::Never => return Ok(Compiled::Never),
                        Compiled::Cond(condition) => conditions.push(condition),
                    }
                }
                Ok(match conditions.len() {
                    0 => Compiled::Always,
                    1 => Compiled::Cond(conditions.remove(0)),
                    _ => Compiled::Cond(Condition::And(conditions)),
                })
            }
            Predicate::AnyOf(alternatives) => {
                if alternatives.is_empty() {
                    return Err(DaoError::InvalidSpecification(format!(
                        "{}: alternative filter group has no conditions",
                        self.mapping.entity
                    )));
                }
                let mut conditions = Vec::new();
                let mut tautology = false;
                for alternative in alternatives {
                    match self.compile_predicate(alternative, state, resolver)? {
                        Compiled::Always => tautology = true,
                        Compiled::Never => {}
                        Compiled::Cond(condition) => conditions.push(condition),
                    }
                }
                if tautology {
                    return Ok(Compiled::Always);
                }
                Ok(match conditions.len() {
                    0 => Compiled::Never,
                    1 => Compiled::Cond(conditions.remove(0)),
                    _ => Compiled::Cond(Condition::Or(conditions)),
                })
            }
            Predicate::InResolved {
                attribute,
                subquery,
            } => {
                let column = self.column(attribute, state)?;
                if subquery.specification.requested_attributes().len() != 1 {
                    return Err(DaoError::InvalidSpecification(format!(
                        "identifier sub-query on {} must project exactly one attribute",
                        subquery.mapping.entity
                    )));
                }
                let compiled = QueryCompiler::new(subquery.mapping)
                    .compile_with_resolver(&subquery.specification, resolver)?;
                let identifiers = if compiled.is_provably_empty() {
                    Vec::new()
                } else {
                    resolver(&compiled)?
                };
                log::debug!(
                    "Resolved {} identifiers from {} for {}.{}",
                    identifiers.len(),
                    subquery.mapping.entity,
                    self.mapping.entity,
                    attribute
                );
                Ok(self.in_condition(column, identifiers.into_iter(), state))
            }
        }
    }

    fn in_condition(
        &self,
        column: ColumnRef,
        values: impl Iterator<Item = Value>,
        state: &mut CompileState,
    ) -> Compiled {
        let mut seen = HashSet::new();
        let params: Vec<usize> = values
            .filter(|value| !value.is_null() && seen.insert(value.clone()))
            .map(|value| state.bind(value))
            .collect();
        if params.is_empty() {
            Compiled::Never
        } else {
            Compiled::Cond(Condition::In { column, params })
        }
    }

    /// Joins needed to reach `aliases`, including the joins they chain through
    fn resolve_joins(&self, aliases: &BTreeSet<&'static str>) -> Vec<PlannedJoin> {
        let mut needed: BTreeSet<&str> = aliases.iter().copied().collect();
        for join in self.mapping.joins.iter().rev() {
            if needed.contains(join.alias) {
                needed.insert(join.from_alias);
            }
        }
        self.mapping
            .joins
            .iter()
            .filter(|join| needed.contains(join.alias))
            .map(|join| PlannedJoin {
                table: join.table.to_string(),
                alias: join.alias.to_string(),
                left: ColumnRef::new(join.from_alias, join.from_column),
                right: ColumnRef::new(join.alias, join.to_column),
            })
            .collect()
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
