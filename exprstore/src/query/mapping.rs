// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Declarative entity-to-table mappings
//!
//! Each entity declares, once, how its logical attributes map onto physical
//! columns and which tables have to be joined to reach them. The compiler
//! consumes these tables generically.

use crate::error::{DaoError, DaoResult};

/// A logical attribute and the physical column it is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMapping {
    pub name: &'static str,
    /// Alias of the primary table or of a join
    pub alias: &'static str,
    pub column: &'static str,
}

/// `INNER JOIN table AS alias ON from_alias.from_column = alias.to_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinMapping {
    pub table: &'static str,
    pub alias: &'static str,
    /// Primary alias or the alias of a join declared earlier
    pub from_alias: &'static str,
    pub from_column: &'static str,
    pub to_column: &'static str,
}

/// Attribute → column table for one entity
#[derive(Debug)]
pub struct EntityMapping {
    pub entity: &'static str,
    pub table: &'static str,
    pub alias: &'static str,
    pub attributes: &'static [AttributeMapping],
    /// Joins in dependency order
    pub joins: &'static [JoinMapping],
    /// Attributes that together identify one row of the entity
    pub key_attributes: &'static [&'static str],
    /// Ordering applied when the caller requests none
    pub default_order: &'static [&'static str],
}

impl EntityMapping {
    pub fn attribute(&self, name: &str) -> DaoResult<&AttributeMapping> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .ok_or_else(|| DaoError::unrecognized_attribute(self.entity, name))
    }

    /// Attributes stored on the primary table, in declaration order
    pub fn primary_attributes(&self) -> impl Iterator<Item = &AttributeMapping> {
        self.attributes
            .iter()
            .filter(move |attr| attr.alias == self.alias)
    }

    pub fn join(&self, alias: &str) -> Option<&JoinMapping> {
        self.joins.iter().find(|join| join.alias == alias)
    }

    /// Whether `requested` covers every key attribute
    pub fn covers_key<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        self.key_attributes
            .iter()
            .all(|key| requested.iter().any(|attr| attr.as_ref() == *key))
    }

    /// Check the mapping is internally consistent: every attribute and join
    /// refers to a known alias, and joins only depend on earlier joins.
    pub fn validate(&self) -> DaoResult<()> {
        let mut known = vec![self.alias];
        for join in self.joins {
            if !known.contains(&join.from_alias) {
                return Err(DaoError::InvalidSpecification(format!(
                    "{}: join '{}' depends on unknown alias '{}'",
                    self.entity, join.alias, join.from_alias
                )));
            }
            known.push(join.alias);
        }
        for attr in self.attributes {
            if !known.contains(&attr.alias) {
                return Err(DaoError::InvalidSpecification(format!(
                    "{}: attribute '{}' uses unknown alias '{}'",
                    self.entity, attr.name, attr.alias
                )));
            }
        }
        for key in self.key_attributes.iter().chain(self.default_order) {
            self.attribute(key)?;
        }
        Ok(())
    }
}
