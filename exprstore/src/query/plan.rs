// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Compiled query plans
//!
//! A [`QueryPlan`] is the structured form of a compiled query: resolved
//! physical columns, the joins actually needed, a condition tree whose leaves
//! reference parameter positions, and ordering. SQL text is rendered from it,
//! and non-SQL backends evaluate it directly.

use super::specification::{Comparison, Direction};
use crate::statement::ParameterizedStatement;
use crate::value::Value;
use std::fmt;

/// Physical column qualified by table alias
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub column: ColumnRef,
    /// Logical attribute name the value is returned under
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJoin {
    pub table: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Boolean condition; leaves reference bound parameters by position
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Never true
    False,
    Compare {
        column: ColumnRef,
        op: Comparison,
        param: usize,
    },
    In {
        column: ColumnRef,
        params: Vec<usize>,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    fn render(&self, out: &mut String, nested: bool) {
        match self {
            Condition::False => out.push_str("1 = 0"),
            Condition::Compare { column, op, .. } => {
                out.push_str(&format!("{} {} ?", column, op));
            }
            Condition::In { column, params } => {
                out.push_str(&format!(
                    "{} IN ({})",
                    column,
                    ParameterizedStatement::placeholders(params.len())
                ));
            }
            Condition::IsNull { column, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                out.push_str(&format!("{} {}", column, keyword));
            }
            Condition::And(parts) => Self::render_group(parts, " AND ", out, nested),
            Condition::Or(parts) => Self::render_group(parts, " OR ", out, true),
        }
    }

    fn render_group(parts: &[Condition], separator: &str, out: &mut String, parenthesize: bool) {
        if parenthesize {
            out.push('(');
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            part.render(out, true);
        }
        if parenthesize {
            out.push(')');
        }
    }

    /// Every column the condition reads
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut found = Vec::new();
        self.collect_columns(&mut found);
        found
    }

    fn collect_columns<'a>(&'a self, found: &mut Vec<&'a ColumnRef>) {
        match self {
            Condition::False => {}
            Condition::Compare { column, .. }
            | Condition::In { column, .. }
            | Condition::IsNull { column, .. } => found.push(column),
            Condition::And(parts) | Condition::Or(parts) => {
                for part in parts {
                    part.collect_columns(found);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: Direction,
}

/// Structured form of a compiled read query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub table: String,
    pub alias: String,
    pub joins: Vec<PlannedJoin>,
    pub projection: Vec<ProjectedColumn>,
    pub distinct: bool,
    pub condition: Option<Condition>,
    pub order_by: Vec<OrderTerm>,
    pub limit_param: Option<usize>,
    pub offset_param: Option<usize>,
}

impl QueryPlan {
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns: Vec<String> = self
            .projection
            .iter()
            .map(|p| format!("{} AS {}", p.column, p.label))
            .collect();
        sql.push_str(&columns.join(", "));
        sql.push_str(&format!(" FROM {} AS {}", self.table, self.alias));

        for join in &self.joins {
            sql.push_str(&format!(
                " INNER JOIN {} AS {} ON {} = {}",
                join.table, join.alias, join.left, join.right
            ));
        }

        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            condition.render(&mut sql, false);
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|term| format!("{} {}", term.column, term.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if self.limit_param.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if self.offset_param.is_some() {
            sql.push_str(" OFFSET ?");
        }
        sql
    }

    /// Aliases of every table the plan reads
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.alias.as_str()).chain(self.joins.iter().map(|j| j.alias.as_str()))
    }
}

/// Positions of the LIMIT/OFFSET parameters and the paging parameters they carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationBinding {
    pub limit_index: usize,
    pub offset_index: usize,
    pub start_offset: u64,
    /// Overall number of rows requested, if bounded
    pub limit: Option<u64>,
    /// Rows per re-query in paginated mode
    pub page_size: Option<u64>,
}

/// Output of compilation: query text, ordered parameters and the plan
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub(crate) sql: String,
    pub(crate) parameters: Vec<Value>,
    pub(crate) plan: QueryPlan,
    pub(crate) pagination: Option<PaginationBinding>,
    pub(crate) provably_empty: bool,
}

impl CompiledQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn pagination(&self) -> Option<&PaginationBinding> {
        self.pagination.as_ref()
    }

    /// True when the query is known to return no rows without executing it
    pub fn is_provably_empty(&self) -> bool {
        self.provably_empty
    }

    /// Labels of the returned columns, in order
    pub fn labels(&self) -> Vec<&str> {
        self.plan.projection.iter().map(|p| p.label.as_str()).collect()
    }
}

/// Write statement: `INSERT INTO table (columns) VALUES (?, ...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
}

impl InsertStatement {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            ParameterizedStatement::placeholders(self.columns.len())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(alias: &str, column: &str) -> ColumnRef {
        ColumnRef::new(alias, column)
    }

    #[test]
    fn test_render_nested_groups() {
        let condition = Condition::And(vec![
            Condition::In {
                column: col("g", "speciesId"),
                params: vec![0, 1],
            },
            Condition::Or(vec![
                Condition::Compare {
                    column: col("g", "geneName"),
                    op: Comparison::Eq,
                    param: 2,
                },
                Condition::And(vec![
                    Condition::IsNull {
                        column: col("g", "geneName"),
                        negated: false,
                    },
                    Condition::False,
                ]),
            ]),
        ]);

        let mut out = String::new();
        condition.render(&mut out, false);
        assert_eq!(
            out,
            "g.speciesId IN (?, ?) AND (g.geneName = ? OR (g.geneName IS NULL AND 1 = 0))"
        );
        assert_eq!(condition.columns().len(), 3);
    }

    #[test]
    fn test_insert_sql() {
        let insert = InsertStatement::new("gene", ["geneId", "geneName"]);
        assert_eq!(insert.to_sql(), "INSERT INTO gene (geneId, geneName) VALUES (?, ?)");
    }
}
