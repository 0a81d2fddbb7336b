// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Species

use super::{text, Entity, EntityDao};
use crate::cursor::StreamingResultCursor;
use crate::error::DaoResult;
use crate::manager::ConnectionManager;
use crate::query::{AttributeMapping, EntityMapping, InsertStatement, QuerySpecification};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub static SPECIES_MAPPING: EntityMapping = EntityMapping {
    entity: "Species",
    table: "species",
    alias: "sp",
    attributes: &[
        AttributeMapping { name: "id", alias: "sp", column: "speciesId" },
        AttributeMapping { name: "genus", alias: "sp", column: "genus" },
        AttributeMapping { name: "speciesName", alias: "sp", column: "species" },
        AttributeMapping { name: "commonName", alias: "sp", column: "speciesCommonName" },
        AttributeMapping { name: "genomeVersion", alias: "sp", column: "genomeVersion" },
    ],
    joins: &[],
    key_attributes: &["id"],
    default_order: &["id"],
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Species {
    pub id: Option<i64>,
    pub genus: Option<String>,
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub genome_version: Option<String>,
}

impl Entity for Species {
    fn mapping() -> &'static EntityMapping {
        &SPECIES_MAPPING
    }

    fn from_row(row: Row) -> DaoResult<Self> {
        Ok(Species {
            id: row.get_integer("id"),
            genus: text(&row, "genus"),
            species_name: text(&row, "speciesName"),
            common_name: text(&row, "commonName"),
            genome_version: text(&row, "genomeVersion"),
        })
    }
}

pub struct SpeciesDao {
    dao: EntityDao<Species>,
}

impl SpeciesDao {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            dao: EntityDao::new(manager),
        }
    }

    pub fn get_all(&self) -> DaoResult<StreamingResultCursor<Species>> {
        self.dao.query(&QuerySpecification::new())
    }

    pub fn get_by_ids(&self, ids: &[i64]) -> DaoResult<StreamingResultCursor<Species>> {
        self.dao.get_by_ids(ids)
    }

    pub fn query(&self, spec: &QuerySpecification) -> DaoResult<StreamingResultCursor<Species>> {
        self.dao.query(spec)
    }

    pub fn insert_species(&self, species: &[Species]) -> DaoResult<u64> {
        let insert = InsertStatement::new(
            "species",
            ["speciesId", "genus", "species", "speciesCommonName", "genomeVersion"],
        );
        self.dao.insert_batch(&insert, species, |s| {
            vec![
                Value::from(s.id),
                Value::from(s.genus.clone()),
                Value::from(s.species_name.clone()),
                Value::from(s.common_name.clone()),
                Value::from(s.genome_version.clone()),
            ]
        })
    }

    pub fn entity_dao(&self) -> &EntityDao<Species> {
        &self.dao
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_consistent() {
        SPECIES_MAPPING.validate().unwrap();
    }

    #[test]
    fn test_partial_row() {
        let species = Species::from_row(Row::new().with("id", 9606i64).with("commonName", "human")).unwrap();
        assert_eq!(species.id, Some(9606));
        assert_eq!(species.common_name.as_deref(), Some("human"));
        assert!(species.genus.is_none());
    }
}
