#![cfg(feature = "sled-backend")]

#[path = "testutils/mod.rs"]
mod testutils;

use exprstore::{BackendParameters, CallFilter, ConditionFilter, GeneFilter, ManagerRegistry};
use std::thread;
use tempfile::TempDir;
use testutils::sample_data::{self, HUMAN, LIVER};

fn sled_parameters(dir: &TempDir) -> BackendParameters {
    BackendParameters::for_backend("sled").with("sled.path", dir.path().to_string_lossy().to_string())
}

#[test]
fn test_knowledge_base_survives_reopen() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let registry = ManagerRegistry::with_builtin_providers();

    let manager = registry
        .acquire(Some(&sled_parameters(&dir)))
        .unwrap()
        .expect("sled backend should accept a path");
    assert_eq!(manager.backend_name(), "sled");
    sample_data::load(&manager).unwrap();
    assert!(manager.release());

    let manager = registry
        .acquire(Some(&sled_parameters(&dir)))
        .unwrap()
        .unwrap();
    let genes = manager
        .gene_dao()
        .get_by_filter(&GeneFilter {
            species_ids: vec![HUMAN],
            ..Default::default()
        })
        .unwrap()
        .collect_all()
        .unwrap();
    let names: Vec<&str> = genes.iter().filter_map(|g| g.name.as_deref()).collect();
    assert_eq!(names, vec!["BRCA2", "SOX9", "TP53"]);

    let calls = manager
        .expression_call_dao()
        .get_by_filter(&CallFilter {
            conditions: vec![ConditionFilter {
                anat_entity_ids: vec![LIVER.to_string()],
                ..Default::default()
            }],
            ..Default::default()
        })
        .unwrap()
        .collect_all()
        .unwrap();
    let ids: Vec<i64> = calls.iter().filter_map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 5, 7]);
    manager.release();
}

#[test]
fn test_contexts_share_one_path() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let registry = ManagerRegistry::with_builtin_providers();

    let main = registry
        .acquire(Some(&sled_parameters(&dir)))
        .unwrap()
        .expect("sled backend should accept a path");
    sample_data::load(&main).unwrap();

    let worker = {
        let registry = registry.clone();
        let parameters = sled_parameters(&dir);
        thread::spawn(move || {
            let manager = registry
                .acquire(Some(&parameters))
                .unwrap()
                .expect("second context should open the same path");
            let species = manager.species_dao().get_all().unwrap().collect_all().unwrap();
            let id = manager.id();
            manager.release();
            (id, species.len())
        })
    };
    let (worker_id, species_count) = worker.join().unwrap();
    assert_ne!(worker_id, main.id());
    assert_eq!(species_count, sample_data::species().len());
    main.release();
}

#[test]
fn test_temporary_database() {
    let registry = ManagerRegistry::with_builtin_providers();
    let parameters = BackendParameters::for_backend("sled").with("sled.temporary", "true");

    let manager = registry.acquire(Some(&parameters)).unwrap().unwrap();
    manager
        .species_dao()
        .insert_species(&sample_data::species())
        .unwrap();
    let species = manager.species_dao().get_all().unwrap().collect_all().unwrap();
    assert_eq!(species.len(), 3);
    manager.release();
}

#[test]
fn test_sled_refuses_to_move() {
    let first = TempDir::new().expect("Failed to create temp dir");
    let second = TempDir::new().expect("Failed to create temp dir");
    let registry = ManagerRegistry::with_builtin_providers();

    let manager = registry.acquire(Some(&sled_parameters(&first))).unwrap().unwrap();
    assert!(registry.acquire(Some(&sled_parameters(&second))).is_err());
    assert!(!manager.is_closed());
    manager.release();
}
