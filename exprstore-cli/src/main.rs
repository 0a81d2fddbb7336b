// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! ExprStore CLI entry point

use clap::Parser;
use colored::Colorize;
use exprstore::{ConditionFilter, GeneFilter};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments first to get log level
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // Default to Warn (can still be overridden by RUST_LOG env var)
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "ExprStore".bold().green(), exprstore::VERSION);
            println!("Gene-expression knowledge base data access");
            Ok(())
        }

        Commands::Load { file } => cli::handle_load(cli.path, cli.config, file),

        Commands::Species { format } => cli::handle_species(cli.path, cli.config, format),

        Commands::Genes {
            species,
            ensembl_id,
            name,
            attributes,
            paging,
            format,
        } => {
            let filter = GeneFilter {
                species_ids: species,
                ensembl_ids: ensembl_id,
                names: name,
            };
            cli::handle_genes(cli.path, cli.config, filter, attributes, paging, format)
        }

        Commands::Calls {
            gene,
            ensembl_id,
            species,
            anat_entity,
            stage,
            quality,
            attributes,
            paging,
            format,
        } => {
            let condition = ConditionFilter {
                species_ids: species,
                anat_entity_ids: anat_entity,
                stage_ids: stage,
            };
            cli::handle_calls(
                cli.path, cli.config, gene, ensembl_id, condition, quality, attributes, paging,
                format,
            )
        }
    }
}
