// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Backend configuration
//!
//! Backends are configured through an opaque string-keyed map. The core imposes
//! no schema: each entry is a name/value pair interpreted by the backend plugin
//! that ends up accepting it.
//!
//! Parameters can be built in code, loaded from a JSON object file, or read from
//! `EXPRSTORE_*` environment variables (`EXPRSTORE_SLED_PATH` becomes
//! `sled.path`).

use crate::error::{DaoError, DaoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Key naming the backend plugin that should accept the parameters
pub const BACKEND_KEY: &str = "backend";

/// Environment variable prefix for parameters read by [`BackendParameters::from_env`]
pub const ENV_PREFIX: &str = "EXPRSTORE_";

/// Name/value parameters passed to backend plugins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendParameters {
    entries: BTreeMap<String, String>,
}

impl BackendParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters selecting a backend by name, with no other settings
    pub fn for_backend(name: &str) -> Self {
        Self::new().with(BACKEND_KEY, name)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Requested backend name, if any
    pub fn backend(&self) -> Option<&str> {
        self.get(BACKEND_KEY)
    }

    /// Parse an entry, mapping parse failures to configuration errors
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> DaoResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                DaoError::Configuration(format!("Invalid value '{}' for parameter '{}'", raw, key))
            }),
        }
    }

    /// Entries whose key starts with `prefix`, with the prefix stripped
    pub fn scoped<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .map(|rest| (rest, value.as_str()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Overlay `other` on top of these parameters
    pub fn merge(mut self, other: &BackendParameters) -> Self {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        self
    }

    /// Load parameters from a JSON object whose values are strings
    pub fn from_json_file(path: impl AsRef<Path>) -> DaoResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DaoError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DaoError::Configuration(format!("Invalid parameter file {}: {}", path.display(), e))
        })
    }

    /// Read `EXPRSTORE_*` variables from the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub(crate) fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::new();
        for (name, value) in vars {
            if let Some(rest) = name.strip_prefix(ENV_PREFIX) {
                if rest.is_empty() || rest == "BACKENDS" {
                    continue;
                }
                params.set(env_name_to_key(rest), value);
            }
        }
        params
    }
}

/// `SLED_PATH` -> `sled.path`, `BACKEND` -> `backend`
fn env_name_to_key(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.split_once('_') {
        Some((scope, rest)) if scope != BACKEND_KEY => format!("{}.{}", scope, rest),
        _ => lower,
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackendParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}
