// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Query construction: entity mappings, specifications and their compilation

pub mod compiler;
pub mod mapping;
pub mod plan;
pub mod specification;

pub use compiler::{IdentifierResolver, QueryCompiler};
pub use mapping::{AttributeMapping, EntityMapping, JoinMapping};
pub use plan::{
    ColumnRef, CompiledQuery, Condition, InsertStatement, OrderTerm, PaginationBinding,
    PlannedJoin, ProjectedColumn, QueryPlan,
};
pub use specification::{Comparison, Direction, Predicate, QuerySpecification, Subquery};
