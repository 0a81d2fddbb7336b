#[path = "testutils/mod.rs"]
mod testutils;

use exprstore::dao::ConditionFilter;
use exprstore::query::Comparison;
use exprstore::{
    CallFilter, CursorOptions, DaoError, GeneFilter, Predicate, QueryOptions, QuerySpecification,
};
use testutils::sample_data::{self, BRAIN, HEART, HUMAN, LIVER, MOUSE, MOUSE_ADULT};
use testutils::test_fixture::TestFixture;

fn call_ids(calls: &[exprstore::ExpressionCall]) -> Vec<i64> {
    calls.iter().filter_map(|c| c.id).collect()
}

#[test]
fn test_species_in_default_order() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let species = fixture
        .manager()
        .species_dao()
        .get_all()
        .unwrap()
        .collect_all()
        .unwrap();
    let ids: Vec<i64> = species.iter().filter_map(|s| s.id).collect();
    assert_eq!(ids, vec![7955, 9606, 10090]);
    assert_eq!(species[1].common_name.as_deref(), Some("human"));
}

#[test]
fn test_genes_by_species() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let filter = GeneFilter {
        species_ids: vec![HUMAN],
        ..Default::default()
    };
    let genes = fixture
        .manager()
        .gene_dao()
        .get_by_filter(&filter)
        .unwrap()
        .collect_all()
        .unwrap();
    let names: Vec<&str> = genes.iter().filter_map(|g| g.name.as_deref()).collect();
    assert_eq!(names, vec!["BRCA2", "SOX9", "TP53"]);
}

#[test]
fn test_gene_identifiers_are_alternatives() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let filter = GeneFilter {
        species_ids: vec![MOUSE],
        ensembl_ids: vec!["ENSMUSG90000000101".to_string()],
        names: vec!["Sox9".to_string(), "SOX9".to_string()],
    };
    let genes = fixture
        .manager()
        .gene_dao()
        .get_by_filter(&filter)
        .unwrap()
        .collect_all()
        .unwrap();
    // human SOX9 is excluded by the species restriction
    let ids: Vec<i64> = genes.iter().filter_map(|g| g.id).collect();
    assert_eq!(ids, vec![4, 101]);
}

#[test]
fn test_joined_attribute_is_populated() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let filter = GeneFilter {
        species_ids: vec![HUMAN],
        ..Default::default()
    };
    let genes = fixture
        .manager()
        .gene_dao()
        .get_by_filter_with(&filter, &["id", "speciesCommonName"], QueryOptions::default())
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(genes.len(), 3);
    for gene in &genes {
        assert_eq!(gene.species_common_name.as_deref(), Some("human"));
        assert!(gene.name.is_none());
    }
}

#[test]
fn test_calls_resolve_conditions_first() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");
    let before = fixture.queries_executed();

    let filter = CallFilter {
        conditions: vec![ConditionFilter {
            anat_entity_ids: vec![BRAIN.to_string()],
            ..Default::default()
        }],
        ..Default::default()
    };
    let calls = fixture
        .manager()
        .expression_call_dao()
        .get_by_filter(&filter)
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(call_ids(&calls), vec![1, 3, 6, 8]);
    // one identifier query plus the call query
    assert_eq!(fixture.queries_executed() - before, 2);
}

#[test]
fn test_no_matching_condition_skips_call_query() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");
    let before = fixture.queries_executed();

    let filter = CallFilter {
        conditions: vec![ConditionFilter {
            species_ids: vec![MOUSE],
            anat_entity_ids: vec![HEART.to_string()],
            ..Default::default()
        }],
        ..Default::default()
    };
    let mut cursor = fixture
        .manager()
        .expression_call_dao()
        .get_by_filter(&filter)
        .unwrap();

    assert!(!cursor.advance().unwrap());
    assert_eq!(fixture.queries_executed() - before, 1);
}

#[test]
fn test_condition_filters_are_alternatives() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let filter = CallFilter {
        conditions: vec![
            ConditionFilter {
                species_ids: vec![HUMAN],
                anat_entity_ids: vec![LIVER.to_string()],
                ..Default::default()
            },
            ConditionFilter {
                stage_ids: vec![MOUSE_ADULT.to_string()],
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let calls = fixture
        .manager()
        .expression_call_dao()
        .get_by_filter(&filter)
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(call_ids(&calls), vec![2, 5, 6, 7, 8]);
}

#[test]
fn test_call_attributes_through_chained_join() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let filter = CallFilter {
        gene_ids: vec![2],
        ..Default::default()
    };
    let calls = fixture
        .manager()
        .expression_call_dao()
        .get_by_filter_with(
            &filter,
            &["id", "geneName", "anatEntityName"],
            QueryOptions::default(),
        )
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(call_ids(&calls), vec![3, 4]);
    let anat: Vec<&str> = calls
        .iter()
        .filter_map(|c| c.anat_entity_name.as_deref())
        .collect();
    assert_eq!(anat, vec!["brain", "heart"]);
    assert!(calls.iter().all(|c| c.gene_name.as_deref() == Some("SOX9")));
    assert!(calls.iter().all(|c| c.rank.is_none()));
}

#[test]
fn test_rank_comparison() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let spec = QuerySpecification::new().filter(Predicate::compare("rank", Comparison::Lt, 500.0));
    let calls = fixture
        .manager()
        .expression_call_dao()
        .query(&spec)
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(call_ids(&calls), vec![3, 5, 6, 8]);
}

#[test]
fn test_conditions_by_ids() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let conditions = fixture
        .manager()
        .condition_dao()
        .get_by_ids(&[5, 2])
        .unwrap()
        .collect_all()
        .unwrap();
    let ids: Vec<i64> = conditions.iter().filter_map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 5]);
}

#[test]
fn test_partial_projection_is_distinct() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let rows = fixture
        .manager()
        .gene_dao()
        .entity_dao()
        .query_rows(
            &QuerySpecification::new().attributes(["speciesId"]),
            CursorOptions::default(),
        )
        .unwrap()
        .collect_all()
        .unwrap();
    let species: Vec<i64> = rows.iter().filter_map(|r| r.get_integer("speciesId")).collect();
    assert_eq!(species, vec![HUMAN, MOUSE, 7955]);
}

#[test]
fn test_unknown_attribute_is_rejected() {
    let fixture = TestFixture::with_sample_data().expect("Failed to create fixture");

    let result = fixture
        .manager()
        .gene_dao()
        .query(&QuerySpecification::new().attributes(["chromosome"]));
    match result {
        Err(DaoError::UnrecognizedAttribute { entity, attribute }) => {
            assert_eq!(entity, "Gene");
            assert_eq!(attribute, "chromosome");
        }
        other => panic!("expected an unrecognized attribute error, got {:?}", other.err()),
    }
}

#[test]
fn test_empty_batch_is_rejected() {
    let fixture = TestFixture::new().expect("Failed to create fixture");

    let err = fixture.manager().gene_dao().insert_genes(&[]).unwrap_err();
    assert!(matches!(err, DaoError::InvalidArgument(_)));
}

#[test]
fn test_batch_insert_counts_rows() {
    let fixture = TestFixture::new().expect("Failed to create fixture");

    let written = fixture
        .manager()
        .gene_dao()
        .insert_genes(&sample_data::genes())
        .unwrap();
    assert_eq!(written as usize, sample_data::GENE_COUNT);
    assert_eq!(fixture.database().row_count("gene"), sample_data::GENE_COUNT);
}
