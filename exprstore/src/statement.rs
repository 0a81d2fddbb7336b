// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Prepared statement wrapper
//!
//! [`ParameterizedStatement`] owns one prepared backend statement and the
//! values bound to its placeholders. Collections are bound in one call, with
//! optional sorting so that equal sets always produce the same binding order.

use crate::backend::{BackendStatement, ResultHandle};
use crate::context::CancellationToken;
use crate::error::{DaoError, DaoResult};
use crate::value::Value;

pub struct ParameterizedStatement {
    inner: Box<dyn BackendStatement>,
    parameters: Vec<Value>,
    cancel: CancellationToken,
}

impl ParameterizedStatement {
    /// Wrap a prepared statement with `parameters` as the initial bindings.
    /// The number of placeholders is fixed by the length of `parameters`.
    pub(crate) fn new(
        inner: Box<dyn BackendStatement>,
        parameters: Vec<Value>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            parameters,
            cancel,
        }
    }

    /// Comma-separated placeholder list: `placeholders(3) == "?, ?, ?"`
    pub fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Bind one value to the zero-based placeholder `index`
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> DaoResult<()> {
        let count = self.parameters.len();
        let slot = self.parameters.get_mut(index).ok_or_else(|| {
            DaoError::InvalidArgument(format!(
                "parameter index {} out of range, statement has {} placeholders",
                index, count
            ))
        })?;
        *slot = value.into();
        Ok(())
    }

    /// Bind `values` to consecutive placeholders starting at `start`.
    /// Returns the index following the last bound placeholder.
    pub fn bind_strings<S: AsRef<str>>(
        &mut self,
        start: usize,
        values: &[S],
        sorted: bool,
    ) -> DaoResult<usize> {
        let mut values: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
        if sorted {
            values.sort_unstable();
        }
        self.bind_all(start, values.into_iter().map(Value::from))
    }

    /// Integer counterpart of [`ParameterizedStatement::bind_strings`]
    pub fn bind_integers(&mut self, start: usize, values: &[i64], sorted: bool) -> DaoResult<usize> {
        let mut values = values.to_vec();
        if sorted {
            values.sort_unstable();
        }
        self.bind_all(start, values.into_iter().map(Value::Integer))
    }

    fn bind_all(&mut self, start: usize, values: impl ExactSizeIterator<Item = Value>) -> DaoResult<usize> {
        let end = start + values.len();
        if end > self.parameters.len() {
            return Err(DaoError::InvalidArgument(format!(
                "cannot bind {} values from index {}, statement has {} placeholders",
                end - start,
                start,
                self.parameters.len()
            )));
        }
        for (slot, value) in self.parameters[start..end].iter_mut().zip(values) {
            *slot = value;
        }
        Ok(end)
    }

    /// Execute as a query with the current bindings
    pub fn execute_query(&mut self) -> DaoResult<Box<dyn ResultHandle>> {
        self.check_cancelled()?;
        self.inner.execute_query(&self.parameters)
    }

    /// Execute as a write with the current bindings; returns affected rows
    pub fn execute_update(&mut self) -> DaoResult<u64> {
        self.check_cancelled()?;
        self.inner.execute_update(&self.parameters)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn check_cancelled(&self) -> DaoResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DaoError::Interrupted(
                "connection manager was terminated".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ParameterizedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterizedStatement")
            .field("sql", &self.sql())
            .field("parameters", &self.parameters)
            .finish()
    }
}
