//! Sample knowledge base
//!
//! Three species, 27 genes (5 named ones plus 22 generated mouse genes), three
//! anatomical entities, two stages, five conditions and eight expression calls.

use exprstore::dao::{AnatEntity, Condition, DevStage};
use exprstore::{ConnectionManager, DaoResult, ExpressionCall, Gene, Species};
use std::sync::Arc;

pub const HUMAN: i64 = 9606;
pub const MOUSE: i64 = 10090;
pub const ZEBRAFISH: i64 = 7955;

pub const BRAIN: &str = "UBERON:0000955";
pub const LIVER: &str = "UBERON:0002107";
pub const HEART: &str = "UBERON:0000948";

pub const HUMAN_ADULT: &str = "HsapDv:0000087";
pub const MOUSE_ADULT: &str = "MmusDv:0000110";

pub const GENE_COUNT: usize = 27;
pub const GENERATED_GENES: usize = 22;

pub fn species() -> Vec<Species> {
    vec![
        species_row(HUMAN, "Homo", "sapiens", "human", "GRCh38"),
        species_row(MOUSE, "Mus", "musculus", "mouse", "GRCm39"),
        species_row(ZEBRAFISH, "Danio", "rerio", "zebrafish", "GRCz11"),
    ]
}

fn species_row(id: i64, genus: &str, name: &str, common: &str, genome: &str) -> Species {
    Species {
        id: Some(id),
        genus: Some(genus.to_string()),
        species_name: Some(name.to_string()),
        common_name: Some(common.to_string()),
        genome_version: Some(genome.to_string()),
    }
}

pub fn genes() -> Vec<Gene> {
    let mut genes = vec![
        gene(1, "ENSG00000139618", "BRCA2", HUMAN),
        gene(2, "ENSG00000125398", "SOX9", HUMAN),
        gene(3, "ENSG00000141510", "TP53", HUMAN),
        gene(4, "ENSMUSG00000000567", "Sox9", MOUSE),
        gene(5, "ENSDARG00000003293", "sox9a", ZEBRAFISH),
    ];
    for i in 0..GENERATED_GENES as i64 {
        let id = 101 + i;
        genes.push(gene(id, &format!("ENSMUSG9{:010}", id), &format!("Gm{}", id), MOUSE));
    }
    genes
}

fn gene(id: i64, ensembl_id: &str, name: &str, species_id: i64) -> Gene {
    Gene {
        id: Some(id),
        ensembl_id: Some(ensembl_id.to_string()),
        name: Some(name.to_string()),
        description: None,
        species_id: Some(species_id),
        species_common_name: None,
    }
}

pub fn anat_entities() -> Vec<AnatEntity> {
    [(BRAIN, "brain"), (LIVER, "liver"), (HEART, "heart")]
        .iter()
        .map(|(id, name)| AnatEntity {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

pub fn stages() -> Vec<DevStage> {
    [(HUMAN_ADULT, "human adult stage"), (MOUSE_ADULT, "mature stage")]
        .iter()
        .map(|(id, name)| DevStage {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

pub fn conditions() -> Vec<Condition> {
    vec![
        condition(1, BRAIN, HUMAN_ADULT, HUMAN),
        condition(2, LIVER, HUMAN_ADULT, HUMAN),
        condition(3, HEART, HUMAN_ADULT, HUMAN),
        condition(4, BRAIN, MOUSE_ADULT, MOUSE),
        condition(5, LIVER, MOUSE_ADULT, MOUSE),
    ]
}

fn condition(id: i64, anat_entity: &str, stage: &str, species_id: i64) -> Condition {
    Condition {
        id: Some(id),
        anat_entity_id: Some(anat_entity.to_string()),
        stage_id: Some(stage.to_string()),
        species_id: Some(species_id),
        anat_entity_name: None,
        stage_name: None,
    }
}

pub fn calls() -> Vec<ExpressionCall> {
    vec![
        call(1, 1, 1, 1200.0, "gold"),
        call(2, 1, 2, 3400.5, "silver"),
        call(3, 2, 1, 150.0, "gold"),
        call(4, 2, 3, 980.0, "gold"),
        call(5, 3, 2, 45.0, "silver"),
        call(6, 4, 4, 300.0, "gold"),
        call(7, 4, 5, 7000.0, "silver"),
        call(8, 101, 4, 20.0, "gold"),
    ]
}

fn call(id: i64, gene_id: i64, condition_id: i64, rank: f64, quality: &str) -> ExpressionCall {
    ExpressionCall {
        id: Some(id),
        gene_id: Some(gene_id),
        condition_id: Some(condition_id),
        rank: Some(rank),
        quality: Some(quality.to_string()),
        ..Default::default()
    }
}

/// Insert the whole sample through the DAOs
pub fn load(manager: &Arc<ConnectionManager>) -> DaoResult<()> {
    manager.species_dao().insert_species(&species())?;
    manager.gene_dao().insert_genes(&genes())?;
    let condition_dao = manager.condition_dao();
    condition_dao.insert_anat_entities(&anat_entities())?;
    condition_dao.insert_stages(&stages())?;
    condition_dao.insert_conditions(&conditions())?;
    manager.expression_call_dao().insert_calls(&calls())?;
    Ok(())
}
