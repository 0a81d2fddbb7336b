// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Forward-only streaming cursors
//!
//! A [`StreamingResultCursor`] owns one prepared statement and its open result
//! handle, and materializes rows one at a time as the caller advances.
//!
//! In paginated mode the query carries `LIMIT ? OFFSET ?` placeholders: when a
//! page runs out, the cursor rebinds them on the same statement and executes it
//! again. It stops as soon as a page comes back short or the overall limit has
//! been delivered, so it never asks for a page that is known to be empty.
//!
//! With `filter_duplicates`, rows already emitted are skipped.

use crate::backend::ResultHandle;
use crate::context::CancellationToken;
use crate::error::{DaoError, DaoResult};
use crate::query::PaginationBinding;
use crate::statement::ParameterizedStatement;
use crate::value::{Row, Value};
use std::collections::HashSet;
use std::fmt;

/// Per-query cursor behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// Skip rows identical to one already returned
    pub filter_duplicates: bool,
}

impl CursorOptions {
    pub fn deduplicated() -> Self {
        Self {
            filter_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    Positioned,
    Exhausted,
    Closed,
}

/// Re-query bookkeeping for paginated cursors
#[derive(Debug)]
struct Paging {
    limit_index: usize,
    offset_index: usize,
    page_size: u64,
    /// Offset of the page being read
    offset: u64,
    /// LIMIT bound for the page being read
    requested: u64,
    /// Rows the backend returned for the page being read
    received: u64,
    /// Rows still allowed by the overall limit
    remaining: Option<u64>,
}

impl Paging {
    fn from_binding(binding: &PaginationBinding) -> Option<Self> {
        let page_size = binding.page_size?;
        Some(Self {
            limit_index: binding.limit_index,
            offset_index: binding.offset_index,
            page_size,
            offset: binding.start_offset,
            requested: binding.limit.map_or(page_size, |limit| limit.min(page_size)),
            received: 0,
            remaining: binding.limit,
        })
    }

    /// Move to the next page; `false` once no further page can hold rows
    fn advance_page(&mut self) -> bool {
        let received = self.received;
        self.remaining = self.remaining.map(|r| r.saturating_sub(received));
        if received == 0 || received < self.requested || self.remaining == Some(0) {
            return false;
        }
        self.offset += received;
        self.requested = self
            .remaining
            .map_or(self.page_size, |r| r.min(self.page_size));
        self.received = 0;
        true
    }
}

type RowMapper<T> = Box<dyn Fn(Row) -> DaoResult<T> + Send>;

/// Forward-only cursor over rows mapped to `T`
pub struct StreamingResultCursor<T> {
    statement: Option<ParameterizedStatement>,
    results: Option<Box<dyn ResultHandle>>,
    mapper: RowMapper<T>,
    state: CursorState,
    current: Option<T>,
    seen: Option<HashSet<Row>>,
    paging: Option<Paging>,
    cancel: CancellationToken,
    rows_returned: u64,
}

impl<T> StreamingResultCursor<T> {
    /// Execute `statement` and open a cursor over its first page
    pub fn open<F>(
        mut statement: ParameterizedStatement,
        pagination: Option<&PaginationBinding>,
        options: CursorOptions,
        mapper: F,
    ) -> DaoResult<Self>
    where
        F: Fn(Row) -> DaoResult<T> + Send + 'static,
    {
        let results = statement.execute_query()?;
        let cancel = statement.cancellation_token().clone();
        let paging = pagination.and_then(Paging::from_binding);
        log::debug!(
            "Opened cursor over: {}{}",
            statement.sql(),
            if paging.is_some() { " (paginated)" } else { "" }
        );
        Ok(Self {
            statement: Some(statement),
            results: Some(results),
            mapper: Box::new(mapper),
            state: CursorState::BeforeFirst,
            current: None,
            seen: options.filter_duplicates.then(HashSet::new),
            paging,
            cancel,
            rows_returned: 0,
        })
    }

    /// Cursor with no rows, for queries known to be empty
    pub fn empty() -> Self {
        Self {
            statement: None,
            results: None,
            mapper: Box::new(|_| Err(DaoError::Cursor("empty cursor has no rows".to_string()))),
            state: CursorState::BeforeFirst,
            current: None,
            seen: None,
            paging: None,
            cancel: CancellationToken::new(),
            rows_returned: 0,
        }
    }

    /// Move to the next row. Returns `false` once the rows are exhausted, at
    /// which point all resources have been released.
    pub fn advance(&mut self) -> DaoResult<bool> {
        if matches!(self.state, CursorState::Exhausted | CursorState::Closed) {
            return Ok(false);
        }
        loop {
            if self.cancel.is_cancelled() {
                self.close();
                return Err(DaoError::Interrupted(
                    "connection manager was terminated".to_string(),
                ));
            }

            let fetched = match self.results.as_mut() {
                Some(results) => results.next_row(),
                None => Ok(None),
            };

            match fetched {
                Err(e) => {
                    self.close();
                    return Err(e.into_cursor_error());
                }
                Ok(Some(row)) => {
                    if let Some(paging) = self.paging.as_mut() {
                        paging.received += 1;
                    }
                    if let Some(seen) = self.seen.as_mut() {
                        if !seen.insert(row.clone()) {
                            continue;
                        }
                    }
                    match (self.mapper)(row) {
                        Ok(item) => {
                            self.current = Some(item);
                            self.state = CursorState::Positioned;
                            self.rows_returned += 1;
                            return Ok(true);
                        }
                        Err(e) => {
                            self.close();
                            return Err(e);
                        }
                    }
                }
                Ok(None) => match self.next_page() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.finish();
                        return Ok(false);
                    }
                    Err(e) => {
                        self.close();
                        return Err(e.into_cursor_error());
                    }
                },
            }
        }
    }

    /// Re-execute for the next page, if there can be one
    fn next_page(&mut self) -> DaoResult<bool> {
        let (paging, statement) = match (self.paging.as_mut(), self.statement.as_mut()) {
            (Some(paging), Some(statement)) => (paging, statement),
            _ => return Ok(false),
        };
        if !paging.advance_page() {
            return Ok(false);
        }
        if let Some(mut previous) = self.results.take() {
            previous.close();
        }
        log::debug!(
            "Re-querying page at offset {} (limit {})",
            paging.offset,
            paging.requested
        );
        statement.bind(paging.limit_index, to_parameter(paging.requested))?;
        statement.bind(paging.offset_index, to_parameter(paging.offset))?;
        self.results = Some(statement.execute_query()?);
        Ok(true)
    }

    /// Row the cursor is positioned on
    pub fn current(&self) -> DaoResult<&T> {
        match self.state {
            CursorState::Positioned => self
                .current
                .as_ref()
                .ok_or_else(|| DaoError::Cursor("current row was already taken".to_string())),
            CursorState::BeforeFirst => Err(DaoError::Cursor(
                "cursor is not positioned, call advance first".to_string(),
            )),
            CursorState::Exhausted => Err(DaoError::Cursor("cursor is exhausted".to_string())),
            CursorState::Closed => Err(DaoError::Cursor("cursor is closed".to_string())),
        }
    }

    /// Iterator over the remaining rows; stops after the first error
    pub fn stream(&mut self) -> CursorStream<'_, T> {
        CursorStream {
            cursor: self,
            failed: false,
        }
    }

    /// Drain the remaining rows
    pub fn collect_all(mut self) -> DaoResult<Vec<T>> {
        self.stream().collect()
    }

    /// Release the statement and result handle. Idempotent.
    pub fn close(&mut self) {
        self.release_resources();
        if self.state != CursorState::Exhausted {
            self.state = CursorState::Closed;
        }
    }

    fn finish(&mut self) {
        self.release_resources();
        self.state = CursorState::Exhausted;
        log::debug!("Cursor exhausted after {} rows", self.rows_returned);
    }

    fn release_resources(&mut self) {
        if let Some(mut results) = self.results.take() {
            results.close();
        }
        self.statement = None;
        self.current = None;
        self.seen = None;
    }

    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, CursorState::Exhausted | CursorState::Closed)
    }
}

fn to_parameter(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

impl<T> Drop for StreamingResultCursor<T> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

impl<T> fmt::Debug for StreamingResultCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResultCursor")
            .field("state", &self.state)
            .field("rows_returned", &self.rows_returned)
            .field("paginated", &self.paging.is_some())
            .field("filter_duplicates", &self.seen.is_some())
            .finish()
    }
}

/// Borrowing iterator over a cursor's remaining rows
pub struct CursorStream<'a, T> {
    cursor: &'a mut StreamingResultCursor<T>,
    failed: bool,
}

impl<T> Iterator for CursorStream<'_, T> {
    type Item = DaoResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.cursor.advance() {
            Ok(true) => self.cursor.current.take().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<T> std::iter::FusedIterator for CursorStream<'_, T> {}
