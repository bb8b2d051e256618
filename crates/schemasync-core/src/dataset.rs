//! Dataset filters: which rows of a table belong to the managed data set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{name_key, Table};

/// Supplies an optional WHERE predicate for a table's managed rows.
pub trait DatasetFilter: Send + Sync {
    /// Predicate for `table` owned by `module`, without the `WHERE` keyword.
    fn where_clause(&self, table: &str, module: Option<&str>) -> Option<String>;
}

/// Filter that applies no restriction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl DatasetFilter for NoFilter {
    fn where_clause(&self, _table: &str, _module: Option<&str>) -> Option<String> {
        None
    }
}

/// Filter built from configuration: predicates per table and per module.
///
/// A table predicate takes precedence over its module's predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDatasetFilter {
    #[serde(default)]
    pub tables: HashMap<String, String>,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl StaticDatasetFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate for a table.
    #[must_use]
    pub fn table(mut self, table: &str, predicate: impl Into<String>) -> Self {
        self.tables.insert(name_key(table), predicate.into());
        self
    }

    /// Adds a predicate for every table of a module.
    #[must_use]
    pub fn module(mut self, module: &str, predicate: impl Into<String>) -> Self {
        self.modules.insert(module.to_string(), predicate.into());
        self
    }
}

impl DatasetFilter for StaticDatasetFilter {
    fn where_clause(&self, table: &str, module: Option<&str>) -> Option<String> {
        self.tables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(table))
            .map(|(_, v)| v.clone())
            .or_else(|| module.and_then(|m| self.modules.get(m).cloned()))
    }
}

/// Combined predicate for a table: its own row filter and the dataset
/// filter, joined with AND.
#[must_use]
pub fn table_predicate(table: &Table, filter: &dyn DatasetFilter) -> Option<String> {
    let parts: Vec<String> = table
        .row_filter
        .iter()
        .cloned()
        .chain(filter.where_clause(&table.name, table.module.as_deref()))
        .filter(|p| !p.trim().is_empty())
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(
            parts
                .iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(" AND "),
        ),
    }
}
