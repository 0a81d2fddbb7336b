// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for ExprStore
//!
//! Provides dataset loading and listing commands over the species, gene and
//! expression call DAOs.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_calls, handle_genes, handle_load, handle_species};
