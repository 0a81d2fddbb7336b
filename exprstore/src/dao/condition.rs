// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Expression conditions
//!
//! A condition is the combination of an anatomical entity and a developmental
//! stage in one species. Anatomical entities and stages are small reference
//! tables joined in for their names.

use super::{in_filter, text, Entity, EntityDao, QueryOptions};
use crate::cursor::StreamingResultCursor;
use crate::error::DaoResult;
use crate::manager::ConnectionManager;
use crate::query::{
    AttributeMapping, EntityMapping, InsertStatement, JoinMapping, Predicate, QuerySpecification,
};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub static CONDITION_MAPPING: EntityMapping = EntityMapping {
    entity: "Condition",
    table: "cond",
    alias: "c",
    attributes: &[
        AttributeMapping { name: "id", alias: "c", column: "conditionId" },
        AttributeMapping { name: "anatEntityId", alias: "c", column: "anatEntityId" },
        AttributeMapping { name: "stageId", alias: "c", column: "stageId" },
        AttributeMapping { name: "speciesId", alias: "c", column: "speciesId" },
        AttributeMapping { name: "anatEntityName", alias: "ae", column: "anatEntityName" },
        AttributeMapping { name: "stageName", alias: "st", column: "stageName" },
    ],
    joins: &[
        JoinMapping {
            table: "anatEntity",
            alias: "ae",
            from_alias: "c",
            from_column: "anatEntityId",
            to_column: "anatEntityId",
        },
        JoinMapping {
            table: "stage",
            alias: "st",
            from_alias: "c",
            from_column: "stageId",
            to_column: "stageId",
        },
    ],
    key_attributes: &["id"],
    default_order: &["id"],
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: Option<i64>,
    pub anat_entity_id: Option<String>,
    pub stage_id: Option<String>,
    pub species_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anat_entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
}

impl Entity for Condition {
    fn mapping() -> &'static EntityMapping {
        &CONDITION_MAPPING
    }

    fn from_row(row: Row) -> DaoResult<Self> {
        Ok(Condition {
            id: row.get_integer("id"),
            anat_entity_id: text(&row, "anatEntityId"),
            stage_id: text(&row, "stageId"),
            species_id: row.get_integer("speciesId"),
            anat_entity_name: text(&row, "anatEntityName"),
            stage_name: text(&row, "stageName"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnatEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevStage {
    pub id: String,
    pub name: String,
}

/// Condition selection; every non-empty list must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionFilter {
    pub species_ids: Vec<i64>,
    pub anat_entity_ids: Vec<String>,
    pub stage_ids: Vec<String>,
}

impl ConditionFilter {
    pub fn is_empty(&self) -> bool {
        self.species_ids.is_empty() && self.anat_entity_ids.is_empty() && self.stage_ids.is_empty()
    }

    /// The filter as one conjunctive predicate
    pub fn to_predicate(&self) -> Predicate {
        let mut parts = Vec::new();
        if !self.species_ids.is_empty() {
            parts.push(Predicate::in_values("speciesId", self.species_ids.iter().copied()));
        }
        if !self.anat_entity_ids.is_empty() {
            parts.push(Predicate::in_values(
                "anatEntityId",
                self.anat_entity_ids.iter().map(String::as_str),
            ));
        }
        if !self.stage_ids.is_empty() {
            parts.push(Predicate::in_values("stageId", self.stage_ids.iter().map(String::as_str)));
        }
        Predicate::all(parts)
    }

    /// Specification matching conditions accepted by any of `filters`
    pub fn any_of(filters: &[ConditionFilter]) -> QuerySpecification {
        match filters {
            [] => QuerySpecification::new(),
            [single] => single.apply(QuerySpecification::new()),
            _ => QuerySpecification::new().filter(Predicate::any_of(
                filters.iter().map(ConditionFilter::to_predicate).collect(),
            )),
        }
    }

    fn apply(&self, spec: QuerySpecification) -> QuerySpecification {
        let spec = in_filter(spec, "speciesId", self.species_ids.iter().copied());
        let spec = in_filter(spec, "anatEntityId", self.anat_entity_ids.iter().map(String::as_str));
        in_filter(spec, "stageId", self.stage_ids.iter().map(String::as_str))
    }
}

pub struct ConditionDao {
    dao: EntityDao<Condition>,
}

impl ConditionDao {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            dao: EntityDao::new(manager),
        }
    }

    pub fn get_by_ids(&self, ids: &[i64]) -> DaoResult<StreamingResultCursor<Condition>> {
        self.dao.get_by_ids(ids)
    }

    pub fn get_by_filter(&self, filter: &ConditionFilter) -> DaoResult<StreamingResultCursor<Condition>> {
        self.get_by_filters(std::slice::from_ref(filter), &[], QueryOptions::default())
    }

    /// Conditions matching any of `filters`, restricted to `attributes`
    pub fn get_by_filters(
        &self,
        filters: &[ConditionFilter],
        attributes: &[&str],
        options: QueryOptions,
    ) -> DaoResult<StreamingResultCursor<Condition>> {
        let spec = options.apply(ConditionFilter::any_of(filters).attributes(attributes.iter().copied()));
        self.dao.query_with(&spec, options.cursor_options())
    }

    pub fn query(&self, spec: &QuerySpecification) -> DaoResult<StreamingResultCursor<Condition>> {
        self.dao.query(spec)
    }

    pub fn insert_conditions(&self, conditions: &[Condition]) -> DaoResult<u64> {
        let insert = InsertStatement::new(
            "cond",
            ["conditionId", "anatEntityId", "stageId", "speciesId"],
        );
        self.dao.insert_batch(&insert, conditions, |c| {
            vec![
                Value::from(c.id),
                Value::from(c.anat_entity_id.clone()),
                Value::from(c.stage_id.clone()),
                Value::from(c.species_id),
            ]
        })
    }

    pub fn insert_anat_entities(&self, entities: &[AnatEntity]) -> DaoResult<u64> {
        let insert = InsertStatement::new("anatEntity", ["anatEntityId", "anatEntityName"]);
        self.dao.insert_batch(&insert, entities, |e| {
            vec![Value::from(e.id.as_str()), Value::from(e.name.as_str())]
        })
    }

    pub fn insert_stages(&self, stages: &[DevStage]) -> DaoResult<u64> {
        let insert = InsertStatement::new("stage", ["stageId", "stageName"]);
        self.dao.insert_batch(&insert, stages, |s| {
            vec![Value::from(s.id.as_str()), Value::from(s.name.as_str())]
        })
    }

    pub fn entity_dao(&self) -> &EntityDao<Condition> {
        &self.dao
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryCompiler;

    #[test]
    fn test_mapping_is_consistent() {
        CONDITION_MAPPING.validate().unwrap();
    }

    #[test]
    fn test_several_filters_are_alternatives() {
        let filters = vec![
            ConditionFilter {
                species_ids: vec![9606],
                anat_entity_ids: vec!["UBERON:0002107".to_string()],
                ..Default::default()
            },
            ConditionFilter {
                stage_ids: vec!["HsapDv:0000087".to_string()],
                ..Default::default()
            },
        ];
        let compiled = QueryCompiler::new(&CONDITION_MAPPING)
            .compile(&ConditionFilter::any_of(&filters).attributes(["id"]))
            .unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT c.conditionId AS id FROM cond AS c \
             WHERE ((c.speciesId IN (?) AND c.anatEntityId IN (?)) OR c.stageId IN (?)) \
             ORDER BY c.conditionId ASC"
        );
    }

    #[test]
    fn test_name_join_only_when_requested() {
        let compiler = QueryCompiler::new(&CONDITION_MAPPING);
        let bare = compiler.compile(&QuerySpecification::new()).unwrap();
        assert!(bare.plan().joins.is_empty());

        let named = compiler
            .compile(&QuerySpecification::new().attributes(["id", "stageName"]))
            .unwrap();
        assert_eq!(named.plan().joins.len(), 1);
        assert_eq!(named.plan().joins[0].alias, "st");
    }
}
