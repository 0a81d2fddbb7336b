// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! ExprStore - data access for a gene-expression knowledge base
//!
//! ExprStore sits between application code and a relational-style store of
//! species, genes, conditions and expression calls.
//!
//! # Features
//!
//! - **Connection managers**: one manager per execution context, with
//!   backends discovered from a provider list and selected by configuration
//! - **Query compilation**: declarative specifications compiled into SQL with
//!   lazy joins, OR groups and two-phase identifier resolution
//! - **Streaming cursors**: lazily advancing result cursors with transparent
//!   pagination and optional duplicate suppression
//! - **Pluggable storage**: an in-memory backend and a Sled-backed embedded
//!   backend
//!
//! # Usage
//!
//! ```ignore
//! use exprstore::{manager, BackendParameters, GeneFilter};
//!
//! let params = BackendParameters::for_backend("memory").with("memory.database", "kb");
//! let manager = manager::acquire(Some(&params))?.expect("memory backend");
//! let genes = manager
//!     .gene_dao()
//!     .get_by_filter(&GeneFilter { species_ids: vec![9606], ..Default::default() })?
//!     .collect_all()?;
//! manager.release();
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod cursor;
pub mod dao;
pub mod error;
pub mod manager;
pub mod query;
pub mod statement;
pub mod value;

pub use config::BackendParameters;
pub use context::{CancellationToken, ContextId};
pub use cursor::{CursorOptions, StreamingResultCursor};
pub use dao::{
    CallFilter, ConditionFilter, EntityDao, ExpressionCall, Gene, GeneFilter, QueryOptions, Species,
};
pub use error::{DaoError, DaoResult};
pub use manager::{ConnectionManager, ManagerRegistry};
pub use query::{Direction, Predicate, QueryCompiler, QuerySpecification};
pub use statement::ParameterizedStatement;
pub use value::{Row, Value};

/// ExprStore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ExprStore crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
