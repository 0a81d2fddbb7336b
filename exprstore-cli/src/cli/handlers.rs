// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for ExprStore

use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::commands::{OutputFormat, PagingArgs};
use super::output::{Listing, ResultFormatter};
use exprstore::dao::{AnatEntity, Condition, DevStage, Entity, EntityDao};
use exprstore::{
    manager, BackendParameters, CallFilter, ConditionFilter, ConnectionManager, DaoResult,
    ExpressionCall, Gene, GeneFilter, QueryOptions, QuerySpecification, Species,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Dataset accepted by the `load` command
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub species: Vec<Species>,
    pub genes: Vec<Gene>,
    pub anat_entities: Vec<AnatEntity>,
    pub stages: Vec<DevStage>,
    pub conditions: Vec<Condition>,
    pub calls: Vec<ExpressionCall>,
}

/// Where the CLI connects, in increasing priority: a sled database at
/// `path`, `EXPRSTORE_*` variables, then the `--config` file
pub fn backend_parameters(path: &Path, config: Option<&Path>) -> CliResult<BackendParameters> {
    let mut parameters = BackendParameters::from_env();
    if let Some(config) = config {
        parameters = parameters.merge(&BackendParameters::from_json_file(config)?);
    }
    if parameters.is_empty() {
        parameters = BackendParameters::for_backend("sled")
            .with("sled.path", path.to_string_lossy().to_string());
    }
    Ok(parameters)
}

/// Run `f` with this thread's connection manager, releasing everything after
fn with_manager<T>(
    parameters: &BackendParameters,
    f: impl FnOnce(&Arc<ConnectionManager>) -> CliResult<T>,
) -> CliResult<T> {
    let manager = manager::acquire(Some(parameters))?
        .ok_or("no backend accepted the configured parameters")?;
    log::info!(
        "Connected through the {} backend ({})",
        manager.backend_name(),
        manager.context()
    );
    let result = f(&manager);
    manager::shutdown_all();
    result
}

/// Handle the load command
pub fn handle_load(path: PathBuf, config: Option<PathBuf>, file: PathBuf) -> CliResult<()> {
    let content = std::fs::read_to_string(&file)
        .map_err(|e| format!("Cannot read dataset {:?}: {}", file, e))?;
    let dataset: Dataset = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid dataset {:?}: {}", file, e))?;

    let parameters = backend_parameters(&path, config.as_deref())?;
    println!("{}", "Loading dataset...".bold().green());

    with_manager(&parameters, |manager| {
        let conditions = manager.condition_dao();
        load_section("species", &dataset.species, |r| manager.species_dao().insert_species(r))?;
        load_section("genes", &dataset.genes, |r| manager.gene_dao().insert_genes(r))?;
        load_section("anatomical entities", &dataset.anat_entities, |r| {
            conditions.insert_anat_entities(r)
        })?;
        load_section("stages", &dataset.stages, |r| conditions.insert_stages(r))?;
        load_section("conditions", &dataset.conditions, |r| conditions.insert_conditions(r))?;
        load_section("expression calls", &dataset.calls, |r| {
            manager.expression_call_dao().insert_calls(r)
        })
    })?;

    println!("{}", "Dataset loaded".bold().green());
    Ok(())
}

fn load_section<R>(
    label: &str,
    records: &[R],
    insert: impl FnOnce(&[R]) -> DaoResult<u64>,
) -> CliResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    let written = insert(records)?;
    println!("  → {} {}", written, label);
    Ok(())
}

/// Handle the species command
pub fn handle_species(path: PathBuf, config: Option<PathBuf>, format: OutputFormat) -> CliResult<()> {
    let parameters = backend_parameters(&path, config.as_deref())?;
    let listing = with_manager(&parameters, |manager| {
        list(
            "Species",
            manager.species_dao().entity_dao(),
            QuerySpecification::new(),
            PagingArgs::default(),
        )
    })?;
    print!("{}", ResultFormatter::format(&listing, format));
    Ok(())
}

/// Handle the genes command
pub fn handle_genes(
    path: PathBuf,
    config: Option<PathBuf>,
    filter: GeneFilter,
    attributes: Vec<String>,
    paging: PagingArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let parameters = backend_parameters(&path, config.as_deref())?;
    let spec = filter.to_specification().attributes(attributes);
    let listing = with_manager(&parameters, |manager| {
        list("Genes", manager.gene_dao().entity_dao(), spec, paging)
    })?;
    print!("{}", ResultFormatter::format(&listing, format));
    Ok(())
}

/// Handle the calls command
#[allow(clippy::too_many_arguments)]
pub fn handle_calls(
    path: PathBuf,
    config: Option<PathBuf>,
    gene_ids: Vec<i64>,
    ensembl_ids: Vec<String>,
    condition: ConditionFilter,
    quality: Option<String>,
    attributes: Vec<String>,
    paging: PagingArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let filter = CallFilter {
        gene_ids,
        ensembl_ids,
        conditions: vec![condition],
        quality,
    };
    let parameters = backend_parameters(&path, config.as_deref())?;
    let spec = filter.to_specification().attributes(attributes);
    let listing = with_manager(&parameters, |manager| {
        list(
            "Expression calls",
            manager.expression_call_dao().entity_dao(),
            spec,
            paging,
        )
    })?;
    print!("{}", ResultFormatter::format(&listing, format));
    Ok(())
}

fn list<E: Entity>(
    title: &str,
    dao: &EntityDao<E>,
    spec: QuerySpecification,
    paging: PagingArgs,
) -> CliResult<Listing> {
    let options = QueryOptions {
        offset: paging.offset,
        limit: paging.limit,
        page_size: paging.page_size,
        filter_duplicates: paging.distinct,
    };
    let start = Instant::now();
    let rows = dao
        .query_rows(&options.apply(spec), options.cursor_options())?
        .collect_all()?;
    Ok(Listing {
        title: title.to_string(),
        rows,
        elapsed_ms: start.elapsed().as_millis(),
    })
}
