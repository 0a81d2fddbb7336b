//! Test utilities for ExprStore integration tests
//!
//! - TestFixture: a private registry with a connection manager on a named
//!   in-memory database
//! - sample_data: a small knowledge base of species, genes, conditions and
//!   expression calls

#[allow(dead_code)]
pub mod sample_data;
#[allow(dead_code)]
pub mod test_fixture;
