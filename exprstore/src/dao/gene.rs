// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Genes
//!
//! Genes are identified internally by `id` and externally by their Ensembl
//! identifier. The species common name is reached through a join that is only
//! emitted when that attribute is requested, filtered or ordered on.

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

pub static GENE_MAPPING: EntityMapping = EntityMapping {
    entity: "Gene",
    table: "gene",
    alias: "g",
    attributes: &[
        AttributeMapping { name: "id", alias: "g", column: "bgeeGeneId" },
        AttributeMapping { name: "ensemblId", alias: "g", column: "geneId" },
        AttributeMapping { name: "name", alias: "g", column: "geneName" },
        AttributeMapping { name: "description", alias: "g", column: "geneDescription" },
        AttributeMapping { name: "speciesId", alias: "g", column: "speciesId" },
        AttributeMapping { name: "speciesCommonName", alias: "sp", column: "speciesCommonName" },
    ],
    joins: &[JoinMapping {
        table: "species",
        alias: "sp",
        from_alias: "g",
        from_column: "speciesId",
        to_column: "speciesId",
    }],
    key_attributes: &["id"],
    default_order: &["id"],
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gene {
    pub id: Option<i64>,
    pub ensembl_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub species_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_common_name: Option<String>,
}

impl Entity for Gene {
    fn mapping() -> &'static EntityMapping {
        &GENE_MAPPING
    }

    fn from_row(row: Row) -> DaoResult<Self> {
        Ok(Gene {
            id: row.get_integer("id"),
            ensembl_id: text(&row, "ensemblId"),
            name: text(&row, "name"),
            description: text(&row, "description"),
            species_id: row.get_integer("speciesId"),
            species_common_name: text(&row, "speciesCommonName"),
        })
    }
}

/// Gene selection. Empty lists do not restrict.
///
/// A gene matches when its species is in `species_ids` and, if any
/// identifiers are given, its Ensembl id is in `ensembl_ids` or its name is in
/// `names`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneFilter {
    pub species_ids: Vec<i64>,
    pub ensembl_ids: Vec<String>,
    pub names: Vec<String>,
}

impl GeneFilter {
    pub fn to_specification(&self) -> QuerySpecification {
        let spec = in_filter(QuerySpecification::new(), "speciesId", self.species_ids.iter().copied());

        let mut alternatives = Vec::new();
        if !self.ensembl_ids.is_empty() {
            alternatives.push(Predicate::in_values("ensemblId", self.ensembl_ids.iter().map(String::as_str)));
        }
        if !self.names.is_empty() {
            alternatives.push(Predicate::in_values("name", self.names.iter().map(String::as_str)));
        }
        match alternatives.len() {
            0 => spec,
            1 => spec.filter(alternatives.remove(0)),
            _ => spec.filter(Predicate::any_of(alternatives)),
        }
    }
}

pub struct GeneDao {
    dao: EntityDao<Gene>,
}

impl GeneDao {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            dao: EntityDao::new(manager),
        }
    }

    pub fn get_by_ids(&self, ids: &[i64]) -> DaoResult<StreamingResultCursor<Gene>> {
        self.dao.get_by_ids(ids)
    }

    pub fn get_by_filter(&self, filter: &GeneFilter) -> DaoResult<StreamingResultCursor<Gene>> {
        self.get_by_filter_with(filter, &[], QueryOptions::default())
    }

    /// Filtered query restricted to `attributes` (all when empty)
    pub fn get_by_filter_with(
        &self,
        filter: &GeneFilter,
        attributes: &[&str],
        options: QueryOptions,
    ) -> DaoResult<StreamingResultCursor<Gene>> {
        let spec = options.apply(filter.to_specification().attributes(attributes.iter().copied()));
        self.dao.query_with(&spec, options.cursor_options())
    }

    pub fn query(&self, spec: &QuerySpecification) -> DaoResult<StreamingResultCursor<Gene>> {
        self.dao.query(spec)
    }

    pub fn insert_genes(&self, genes: &[Gene]) -> DaoResult<u64> {
        let insert = InsertStatement::new(
            "gene",
            ["bgeeGeneId", "geneId", "geneName", "geneDescription", "speciesId"],
        );
        self.dao.insert_batch(&insert, genes, |g| {
            vec![
                Value::from(g.id),
                Value::from(g.ensembl_id.clone()),
                Value::from(g.name.clone()),
                Value::from(g.description.clone()),
                Value::from(g.species_id),
            ]
        })
    }

    pub fn entity_dao(&self) -> &EntityDao<Gene> {
        &self.dao
    }
}
