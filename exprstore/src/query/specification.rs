// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Declarative query specifications
//!
//! A [`QuerySpecification`] says which attributes to fetch, which rows to keep
//! and in what order. It is built once per call with a consuming builder and is
//! never mutated afterwards.

use super::mapping::EntityMapping;
use crate::value::Value;
use std::fmt;

/// Sort direction of an ordering term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(format!("Unknown sort direction: {}. Valid options: asc, desc", s)),
        }
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A sub-query resolved to a set of identifiers before the main query runs
#[derive(Debug, Clone)]
pub struct Subquery {
    pub mapping: &'static EntityMapping,
    /// Must project exactly one attribute
    pub specification: QuerySpecification,
}

/// Filter predicate tree
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        attribute: String,
        op: Comparison,
        value: Value,
    },
    /// `attribute IN (...)`, one placeholder per value
    In {
        attribute: String,
        values: Vec<Value>,
    },
    IsNull {
        attribute: String,
        negated: bool,
    },
    /// Conjunction of independent conditions
    All(Vec<Predicate>),
    /// Alternative filter group, joined with OR; must not be empty
    AnyOf(Vec<Predicate>),
    /// Two-phase filter: `attribute IN (<identifiers produced by subquery>)`
    InResolved {
        attribute: String,
        subquery: Box<Subquery>,
    },
}

impl Predicate {
    pub fn compare(attribute: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Comparison::Eq, value)
    }

    pub fn in_values<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            attribute: attribute.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(attribute: impl Into<String>) -> Self {
        Predicate::IsNull {
            attribute: attribute.into(),
            negated: false,
        }
    }

    pub fn is_not_null(attribute: impl Into<String>) -> Self {
        Predicate::IsNull {
            attribute: attribute.into(),
            negated: true,
        }
    }

    pub fn any_of(alternatives: Vec<Predicate>) -> Self {
        Predicate::AnyOf(alternatives)
    }

    pub fn all(conditions: Vec<Predicate>) -> Self {
        Predicate::All(conditions)
    }

    pub fn in_resolved(
        attribute: impl Into<String>,
        mapping: &'static EntityMapping,
        specification: QuerySpecification,
    ) -> Self {
        Predicate::InResolved {
            attribute: attribute.into(),
            subquery: Box::new(Subquery {
                mapping,
                specification,
            }),
        }
    }
}

/// Immutable description of what to fetch
#[derive(Debug, Clone, Default)]
pub struct QuerySpecification {
    attributes: Vec<String>,
    filters: Vec<Predicate>,
    ordering: Vec<(String, Direction)>,
    offset: Option<u64>,
    limit: Option<u64>,
    page_size: Option<u64>,
}

impl QuerySpecification {
    /// Specification fetching all attributes of every row
    pub fn new() -> Self {
        Self::default()
    }

    /// Request specific attributes; an empty set means all
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for attr in attributes {
            let attr = attr.into();
            if !self.attributes.contains(&attr) {
                self.attributes.push(attr);
            }
        }
        self
    }

    /// Add a filter; filters are combined with AND
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Append an ordering term; earlier terms have priority
    pub fn order_by(mut self, attribute: impl Into<String>, direction: Direction) -> Self {
        self.ordering.push((attribute.into(), direction));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fetch results page by page, re-querying transparently
    pub fn paginate(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn requested_attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn filters(&self) -> &[Predicate] {
        &self.filters
    }

    pub fn ordering(&self) -> &[(String, Direction)] {
        &self.ordering
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn page_size(&self) -> Option<u64> {
        self.page_size
    }

    pub fn has_pagination(&self) -> bool {
        self.offset.is_some() || self.limit.is_some() || self.page_size.is_some()
    }
}
