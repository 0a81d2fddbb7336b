// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command definitions for ExprStore

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Info, warnings, and errors
    Info,
    /// Debug messages and above (verbose)
    Debug,
    /// All messages including trace (very verbose)
    Trace,
    /// Disable all logging
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// ExprStore CLI - gene-expression knowledge base
#[derive(Parser)]
#[command(name = "exprstore")]
#[command(about = "ExprStore - query a gene-expression knowledge base")]
#[command(version)]
pub struct Cli {
    /// Database path (used when no backend is configured otherwise)
    #[arg(long, global = true, default_value = "./exprstore-db")]
    pub path: PathBuf,

    /// JSON file of backend parameters, e.g. {"backend": "sled", "sled.path": "./db"}
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace, off)
    #[arg(short = 'l', long = "log-level", global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Verbose mode (equivalent to --log-level debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show detailed version information
    Version,

    /// Load a JSON dataset into the database
    Load {
        /// Dataset file with species, genes, anatEntities, stages, conditions and calls
        file: PathBuf,
    },

    /// List species
    Species {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List genes
    Genes {
        /// Restrict to these species (repeatable)
        #[arg(short, long = "species")]
        species: Vec<i64>,

        /// Ensembl identifiers (repeatable)
        #[arg(short, long = "ensembl-id")]
        ensembl_id: Vec<String>,

        /// Gene names (repeatable)
        #[arg(short, long = "name")]
        name: Vec<String>,

        /// Attributes to show (comma separated, all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        attributes: Vec<String>,

        #[command(flatten)]
        paging: PagingArgs,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List expression calls
    Calls {
        /// Internal gene ids (repeatable)
        #[arg(short, long = "gene")]
        gene: Vec<i64>,

        /// Ensembl identifiers (repeatable)
        #[arg(short, long = "ensembl-id")]
        ensembl_id: Vec<String>,

        /// Condition species (repeatable)
        #[arg(short, long = "species")]
        species: Vec<i64>,

        /// Condition anatomical entities (repeatable)
        #[arg(long = "anat-entity")]
        anat_entity: Vec<String>,

        /// Condition developmental stages (repeatable)
        #[arg(long = "stage")]
        stage: Vec<String>,

        /// Summary quality
        #[arg(short, long)]
        quality: Option<String>,

        /// Attributes to show (comma separated, all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        attributes: Vec<String>,

        #[command(flatten)]
        paging: PagingArgs,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

/// Paging options shared by the listing commands
#[derive(clap::Args, Clone, Copy, Debug, Default)]
pub struct PagingArgs {
    /// Rows to skip
    #[arg(long)]
    pub offset: Option<u64>,

    /// Maximum number of rows
    #[arg(long)]
    pub limit: Option<u64>,

    /// Fetch rows in pages of this size
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Drop repeated rows
    #[arg(long)]
    pub distinct: bool,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
