// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Query plan evaluation over in-memory tables
//!
//! Backends without a SQL engine of their own load the tables a plan reads and
//! evaluate it here: inner hash joins, three-valued predicate logic, ordering,
//! projection, `DISTINCT`, then `LIMIT`/`OFFSET`.

use crate::error::{DaoError, DaoResult};
use crate::query::{ColumnRef, Comparison, Condition, Direction, QueryPlan};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Rows of one table, stored positionally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Arrange named values in table column order. Columns not supplied are NULL.
    pub fn arrange(&self, columns: &[String], values: &[Value]) -> DaoResult<Vec<Value>> {
        if columns.len() != values.len() {
            return Err(DaoError::Backend(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        let mut row = vec![Value::Null; self.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            let index = self
                .column_index(column)
                .ok_or_else(|| DaoError::Backend(format!("unknown column '{}'", column)))?;
            row[index] = value.clone();
        }
        Ok(row)
    }
}

/// Supplies tables by name
pub trait TableSource {
    fn table(&self, name: &str) -> DaoResult<Arc<TableData>>;
}

/// Tables of a plan, addressed by alias
struct Scope {
    tables: Vec<(String, Arc<TableData>)>,
}

impl Scope {
    /// (table position, column position) of a column reference
    fn locate(&self, column: &ColumnRef) -> DaoResult<(usize, usize)> {
        let position = self
            .tables
            .iter()
            .position(|(alias, _)| *alias == column.alias)
            .ok_or_else(|| DaoError::Backend(format!("unknown table alias '{}'", column.alias)))?;
        let index = self.tables[position]
            .1
            .column_index(&column.column)
            .ok_or_else(|| DaoError::Backend(format!("unknown column '{}'", column)))?;
        Ok((position, index))
    }

    fn value<'a>(&'a self, tuple: &[usize], at: (usize, usize)) -> &'a Value {
        &self.tables[at.0].1.rows[tuple[at.0]][at.1]
    }
}

/// Evaluate `plan` with `parameters` against tables from `source`
pub fn evaluate(plan: &QueryPlan, parameters: &[Value], source: &dyn TableSource) -> DaoResult<Vec<Row>> {
    let mut scope = Scope {
        tables: vec![(plan.alias.clone(), source.table(&plan.table)?)],
    };

    // a tuple holds one row index per table in scope
    let mut tuples: Vec<Vec<usize>> = (0..scope.tables[0].1.rows.len()).map(|i| vec![i]).collect();

    for join in &plan.joins {
        let left = scope.locate(&join.left)?;
        let table = source.table(&join.table)?;
        let right_index = table
            .column_index(&join.right.column)
            .ok_or_else(|| DaoError::Backend(format!("unknown column '{}'", join.right)))?;

        let mut lookup: HashMap<&Value, Vec<usize>> = HashMap::new();
        for (i, row) in table.rows.iter().enumerate() {
            let key = &row[right_index];
            if !key.is_null() {
                lookup.entry(key).or_default().push(i);
            }
        }

        let mut joined = Vec::new();
        for tuple in &tuples {
            let key = scope.value(tuple, left);
            if let Some(hits) = lookup.get(key) {
                for &i in hits {
                    let mut extended = tuple.clone();
                    extended.push(i);
                    joined.push(extended);
                }
            }
        }
        drop(lookup);
        tuples = joined;
        scope.tables.push((join.alias.clone(), table));
    }

    if let Some(condition) = &plan.condition {
        let mut kept = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if matches(condition, &scope, &tuple, parameters)? == Some(true) {
                kept.push(tuple);
            }
        }
        tuples = kept;
    }

    if !plan.order_by.is_empty() {
        let terms = plan
            .order_by
            .iter()
            .map(|term| Ok((scope.locate(&term.column)?, term.direction)))
            .collect::<DaoResult<Vec<_>>>()?;
        tuples.sort_by(|a, b| {
            for (at, direction) in &terms {
                let ordering = scope.value(a, *at).sort_cmp(scope.value(b, *at));
                let ordering = match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let projection = plan
        .projection
        .iter()
        .map(|p| Ok((p.label.as_str(), scope.locate(&p.column)?)))
        .collect::<DaoResult<Vec<_>>>()?;
    let mut rows = Vec::with_capacity(tuples.len());
    let mut seen = HashSet::new();
    for tuple in &tuples {
        let mut row = Row::with_capacity(projection.len());
        for (label, at) in &projection {
            row.push(*label, scope.value(tuple, *at).clone());
        }
        if plan.distinct && !seen.insert(row.clone()) {
            continue;
        }
        rows.push(row);
    }

    let offset = match plan.offset_param {
        Some(index) => non_negative(parameter(parameters, index)?, "OFFSET")?,
        None => 0,
    };
    let limit = match plan.limit_param {
        Some(index) => non_negative(parameter(parameters, index)?, "LIMIT")?,
        None => usize::MAX,
    };
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

fn parameter(parameters: &[Value], index: usize) -> DaoResult<&Value> {
    parameters
        .get(index)
        .ok_or_else(|| DaoError::Backend(format!("no value bound for parameter {}", index)))
}

fn non_negative(value: &Value, clause: &str) -> DaoResult<usize> {
    match value.as_integer() {
        Some(n) => Ok(usize::try_from(n.max(0)).unwrap_or(usize::MAX)),
        None => Err(DaoError::Backend(format!(
            "{} expects an integer, got {}",
            clause,
            value.type_name()
        ))),
    }
}

/// SQL three-valued evaluation; `None` is UNKNOWN
fn matches(
    condition: &Condition,
    scope: &Scope,
    tuple: &[usize],
    parameters: &[Value],
) -> DaoResult<Option<bool>> {
    Ok(match condition {
        Condition::False => Some(false),
        Condition::Compare { column, op, param } => {
            let value = scope.value(tuple, scope.locate(column)?);
            let bound = parameter(parameters, *param)?;
            value.sql_compare(bound).map(|ordering| match op {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Le => ordering != Ordering::Greater,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Ge => ordering != Ordering::Less,
            })
        }
        Condition::In { column, params } => {
            let value = scope.value(tuple, scope.locate(column)?);
            let mut unknown = false;
            for index in params {
                match value.sql_compare(parameter(parameters, *index)?) {
                    Some(Ordering::Equal) => return Ok(Some(true)),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
        Condition::IsNull { column, negated } => {
            let value = scope.value(tuple, scope.locate(column)?);
            Some(value.is_null() != *negated)
        }
        Condition::And(parts) => {
            let mut result = Some(true);
            for part in parts {
                match matches(part, scope, tuple, parameters)? {
                    Some(false) => return Ok(Some(false)),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Condition::Or(parts) => {
            let mut result = Some(false);
            for part in parts {
                match matches(part, scope, tuple, parameters)? {
                    Some(true) => return Ok(Some(true)),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mapping::fixtures::SAMPLE;
    use crate::query::{Predicate, QueryCompiler, QuerySpecification};

    struct Tables(HashMap<String, Arc<TableData>>);

    impl TableSource for Tables {
        fn table(&self, name: &str) -> DaoResult<Arc<TableData>> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| DaoError::Backend(format!("no table {}", name)))
        }
    }

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Arc<TableData> {
        Arc::new(TableData {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    fn tables() -> Tables {
        let mut map = HashMap::new();
        map.insert(
            "sample".to_string(),
            table(
                &["sampleId", "sampleLabel", "experimentId"],
                vec![
                    vec![3i64.into(), "liver".into(), 10i64.into()],
                    vec![1i64.into(), "brain".into(), 10i64.into()],
                    vec![2i64.into(), "liver".into(), 20i64.into()],
                    vec![4i64.into(), Value::Null, Value::Null],
                ],
            ),
        );
        map.insert(
            "experiment".to_string(),
            table(
                &["experimentId", "experimentName", "dataSourceId"],
                vec![
                    vec![10i64.into(), "GTEx".into(), 100i64.into()],
                    vec![20i64.into(), "ENCODE".into(), 200i64.into()],
                ],
            ),
        );
        map.insert(
            "dataSource".to_string(),
            table(
                &["dataSourceId", "sourceName"],
                vec![vec![100i64.into(), "GEO".into()], vec![200i64.into(), "SRA".into()]],
            ),
        );
        Tables(map)
    }

    fn run(spec: QuerySpecification) -> Vec<Row> {
        let compiled = QueryCompiler::new(&SAMPLE).compile(&spec).unwrap();
        evaluate(compiled.plan(), compiled.parameters(), &tables()).unwrap()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.get_integer("id")).collect()
    }

    #[test]
    fn test_default_order_and_projection() {
        let rows = run(QuerySpecification::new());
        assert_eq!(ids(&rows), vec![1, 2, 3, 4]);
        assert_eq!(
            rows[0].labels().collect::<Vec<_>>(),
            vec!["id", "label", "experimentId"]
        );
    }

    #[test]
    fn test_chained_join_filter() {
        let rows = run(QuerySpecification::new()
            .attributes(["id", "experimentName"])
            .filter(Predicate::eq("sourceName", "GEO")));
        assert_eq!(ids(&rows), vec![1, 3]);
        assert_eq!(rows[0].get_text("experimentName"), Some("GTEx"));
    }

    #[test]
    fn test_null_never_joins_or_matches() {
        let rows = run(QuerySpecification::new().attributes(["id", "experimentName"]));
        assert_eq!(ids(&rows), vec![1, 2, 3]);

        let rows = run(QuerySpecification::new()
            .filter(Predicate::compare("experimentId", Comparison::Ne, 10i64)));
        assert_eq!(ids(&rows), vec![2]);
    }

    #[test]
    fn test_distinct_and_pagination() {
        let rows = run(QuerySpecification::new()
            .attributes(["label"])
            .filter(Predicate::is_not_null("label"))
            .order_by("label", Direction::Asc));
        let labels: Vec<_> = rows.iter().filter_map(|r| r.get_text("label")).collect();
        assert_eq!(labels, vec!["brain", "liver"]);

        let rows = run(QuerySpecification::new().offset(1).limit(2));
        assert_eq!(ids(&rows), vec![2, 3]);
    }

    #[test]
    fn test_or_group() {
        let rows = run(QuerySpecification::new().filter(Predicate::any_of(vec![
            Predicate::eq("label", "brain"),
            Predicate::is_null("label"),
        ])));
        assert_eq!(ids(&rows), vec![1, 4]);
    }
}
