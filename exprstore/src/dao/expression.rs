// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Expression calls
//!
//! An expression call states that a gene is expressed in a condition, with a
//! rank (lower is stronger) and a summary quality. Condition criteria are
//! resolved in two phases: the matching condition identifiers are fetched
//! first, then calls are selected by identifier. When no condition matches,
//! the call query is never executed.

use super::condition::CONDITION_MAPPING;
use super::{in_filter, text, ConditionFilter, Entity, EntityDao, QueryOptions};
use crate::cursor::StreamingResultCursor;
use crate::error::DaoResult;
use crate::manager::ConnectionManager;
use crate::query::{
    AttributeMapping, EntityMapping, InsertStatement, JoinMapping, Predicate, QuerySpecification,
};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub static EXPRESSION_MAPPING: EntityMapping = EntityMapping {
    entity: "ExpressionCall",
    table: "expression",
    alias: "e",
    attributes: &[
        AttributeMapping { name: "id", alias: "e", column: "expressionId" },
        AttributeMapping { name: "geneId", alias: "e", column: "bgeeGeneId" },
        AttributeMapping { name: "conditionId", alias: "e", column: "conditionId" },
        AttributeMapping { name: "rank", alias: "e", column: "rank" },
        AttributeMapping { name: "quality", alias: "e", column: "summaryQuality" },
        AttributeMapping { name: "geneEnsemblId", alias: "g", column: "geneId" },
        AttributeMapping { name: "geneName", alias: "g", column: "geneName" },
        AttributeMapping { name: "speciesId", alias: "c", column: "speciesId" },
        AttributeMapping { name: "anatEntityId", alias: "c", column: "anatEntityId" },
        AttributeMapping { name: "stageId", alias: "c", column: "stageId" },
        AttributeMapping { name: "anatEntityName", alias: "ae", column: "anatEntityName" },
    ],
    joins: &[
        JoinMapping {
            table: "gene",
            alias: "g",
            from_alias: "e",
            from_column: "bgeeGeneId",
            to_column: "bgeeGeneId",
        },
        JoinMapping {
            table: "cond",
            alias: "c",
            from_alias: "e",
            from_column: "conditionId",
            to_column: "conditionId",
        },
        JoinMapping {
            table: "anatEntity",
            alias: "ae",
            from_alias: "c",
            from_column: "anatEntityId",
            to_column: "anatEntityId",
        },
    ],
    key_attributes: &["id"],
    default_order: &["geneId", "rank", "id"],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionCall {
    pub id: Option<i64>,
    pub gene_id: Option<i64>,
    pub condition_id: Option<i64>,
    pub rank: Option<f64>,
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_ensembl_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anat_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anat_entity_name: Option<String>,
}

impl Entity for ExpressionCall {
    fn mapping() -> &'static EntityMapping {
        &EXPRESSION_MAPPING
    }

    fn from_row(row: Row) -> DaoResult<Self> {
        Ok(ExpressionCall {
            id: row.get_integer("id"),
            gene_id: row.get_integer("geneId"),
            condition_id: row.get_integer("conditionId"),
            rank: row.get_float("rank"),
            quality: text(&row, "quality"),
            gene_ensembl_id: text(&row, "geneEnsemblId"),
            gene_name: text(&row, "geneName"),
            species_id: row.get_integer("speciesId"),
            anat_entity_id: text(&row, "anatEntityId"),
            stage_id: text(&row, "stageId"),
            anat_entity_name: text(&row, "anatEntityName"),
        })
    }
}

/// Expression call selection. Empty lists do not restrict.
///
/// `conditions` are alternatives: a call matches if its condition satisfies
/// any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFilter {
    pub gene_ids: Vec<i64>,
    pub ensembl_ids: Vec<String>,
    pub conditions: Vec<ConditionFilter>,
    pub quality: Option<String>,
}

impl CallFilter {
    pub fn to_specification(&self) -> QuerySpecification {
        let spec = in_filter(QuerySpecification::new(), "geneId", self.gene_ids.iter().copied());
        let mut spec = in_filter(spec, "geneEnsemblId", self.ensembl_ids.iter().map(String::as_str));
        if let Some(quality) = &self.quality {
            spec = spec.filter(Predicate::eq("quality", quality.as_str()));
        }
        if self.conditions.iter().any(|c| !c.is_empty()) {
            spec = spec.filter(Predicate::in_resolved(
                "conditionId",
                &CONDITION_MAPPING,
                ConditionFilter::any_of(&self.conditions).attributes(["id"]),
            ));
        }
        spec
    }
}

pub struct ExpressionCallDao {
    dao: EntityDao<ExpressionCall>,
}

impl ExpressionCallDao {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            dao: EntityDao::new(manager),
        }
    }

    pub fn get_by_filter(&self, filter: &CallFilter) -> DaoResult<StreamingResultCursor<ExpressionCall>> {
        self.get_by_filter_with(filter, &[], QueryOptions::default())
    }

    /// Filtered calls restricted to `attributes` (all when empty), with
    /// optional paging and duplicate suppression
    pub fn get_by_filter_with(
        &self,
        filter: &CallFilter,
        attributes: &[&str],
        options: QueryOptions,
    ) -> DaoResult<StreamingResultCursor<ExpressionCall>> {
        let spec = options.apply(filter.to_specification().attributes(attributes.iter().copied()));
        self.dao.query_with(&spec, options.cursor_options())
    }

    pub fn query(&self, spec: &QuerySpecification) -> DaoResult<StreamingResultCursor<ExpressionCall>> {
        self.dao.query(spec)
    }

    pub fn insert_calls(&self, calls: &[ExpressionCall]) -> DaoResult<u64> {
        let insert = InsertStatement::new(
            "expression",
            ["expressionId", "bgeeGeneId", "conditionId", "rank", "summaryQuality"],
        );
        self.dao.insert_batch(&insert, calls, |c| {
            vec![
                Value::from(c.id),
                Value::from(c.gene_id),
                Value::from(c.condition_id),
                Value::from(c.rank),
                Value::from(c.quality.clone()),
            ]
        })
    }

    pub fn entity_dao(&self) -> &EntityDao<ExpressionCall> {
        &self.dao
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaoError;
    use crate::query::{CompiledQuery, QueryCompiler};

    #[test]
    fn test_mapping_is_consistent() {
        EXPRESSION_MAPPING.validate().unwrap();
    }

    #[test]
    fn test_conditions_resolve_in_two_phases() {
        let filter = CallFilter {
            gene_ids: vec![1, 2],
            conditions: vec![ConditionFilter {
                anat_entity_ids: vec!["UBERON:0000955".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut subqueries = Vec::new();
        let mut resolver = |sub: &CompiledQuery| -> DaoResult<Vec<Value>> {
            subqueries.push(sub.sql().to_string());
            Ok(vec![Value::Integer(7), Value::Integer(8)])
        };
        let compiled = QueryCompiler::new(&EXPRESSION_MAPPING)
            .compile_with_resolver(&filter.to_specification(), &mut resolver)
            .unwrap();

        assert_eq!(
            subqueries,
            vec!["SELECT c.conditionId AS id FROM cond AS c WHERE c.anatEntityId IN (?) \
                  ORDER BY c.conditionId ASC"
                .to_string()]
        );
        assert!(compiled
            .sql()
            .contains("WHERE e.bgeeGeneId IN (?, ?) AND e.conditionId IN (?, ?)"));
        assert!(compiled.sql().ends_with("ORDER BY e.bgeeGeneId ASC, e.rank ASC, e.expressionId ASC"));
        // condition criteria no longer need the condition join
        assert!(compiled.plan().joins.is_empty());
    }

    #[test]
    fn test_no_matching_condition_is_provably_empty() {
        let filter = CallFilter {
            conditions: vec![ConditionFilter {
                species_ids: vec![1],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut resolver = |_: &CompiledQuery| -> DaoResult<Vec<Value>> { Ok(Vec::new()) };
        let compiled = QueryCompiler::new(&EXPRESSION_MAPPING)
            .compile_with_resolver(&filter.to_specification(), &mut resolver)
            .unwrap();
        assert!(compiled.is_provably_empty());

        let unresolved = QueryCompiler::new(&EXPRESSION_MAPPING).compile(&filter.to_specification());
        assert!(matches!(unresolved, Err(DaoError::InvalidSpecification(_))));
    }
}
