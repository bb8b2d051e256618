//! Model comparison.
//!
//! [`ModelComparator::compare`] produces the changes that turn the current
//! model into the desired one. Names match case-insensitively, types compare
//! in their native platform form, and expressions compare after
//! normalization, so representational differences never produce changes.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::change::{Change, ColumnDelta};
use crate::model::{
    name_eq, name_key, same_names, Column, Database, Function, Table, Trigger,
};
use crate::platform::{normalize_expression, PlatformInfo};
use crate::types::is_narrowing;
use crate::value::{Row, Value};

/// Options for the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Report column order differences.
    pub column_order_managed: bool,
    /// Compare managed rows.
    pub compare_data: bool,
}

impl CompareOptions {
    /// Options derived from the platform defaults.
    #[must_use]
    pub const fn for_platform(platform: &PlatformInfo) -> Self {
        Self {
            column_order_managed: platform.column_order_managed,
            compare_data: true,
        }
    }
}

/// Compares two models for one target platform.
#[derive(Debug, Clone)]
pub struct ModelComparator {
    platform: PlatformInfo,
    options: CompareOptions,
}

impl ModelComparator {
    /// Creates a comparator with the platform's default options.
    #[must_use]
    pub const fn new(platform: PlatformInfo) -> Self {
        let options = CompareOptions::for_platform(&platform);
        Self { platform, options }
    }

    /// Creates a comparator with custom options.
    #[must_use]
    pub const fn with_options(platform: PlatformInfo, options: CompareOptions) -> Self {
        Self { platform, options }
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Returns the changes that transform `current` into `desired`.
    ///
    /// Changes are sorted by table (or object) name, then by category:
    /// constraint drops, column drops, structure, column additions,
    /// constraint additions. `compare(m, m)` is always empty.
    #[must_use]
    pub fn compare(&self, current: &Database, desired: &Database) -> Vec<Change> {
        let mut changes = Vec::new();

        let current_tables: BTreeMap<String, &Table> =
            current.tables.iter().map(|t| (name_key(&t.name), t)).collect();
        let desired_tables: BTreeMap<String, &Table> =
            desired.tables.iter().map(|t| (name_key(&t.name), t)).collect();

        for (key, table) in &desired_tables {
            if !current_tables.contains_key(key) {
                Self::add_table(table, &mut changes);
            }
        }

        for (key, table) in &current_tables {
            if !desired_tables.contains_key(key) {
                for fk in &table.foreign_keys {
                    changes.push(Change::remove_foreign_key(&table.name, fk.clone()));
                }
                changes.push(Change::RemoveTable {
                    table: (*table).clone(),
                });
            }
        }

        for (key, desired_table) in &desired_tables {
            if let Some(current_table) = current_tables.get(key) {
                self.diff_table(current_table, desired_table, &mut changes);
            }
        }

        Self::diff_triggers(current, desired, &mut changes);
        Self::diff_sequences(current, desired, &mut changes);
        Self::diff_views(current, desired, &mut changes);
        Self::diff_functions(current, desired, &mut changes);

        changes.sort_by_cached_key(|c| (name_key(c.object_name()), c.category()));

        info!(changes = changes.len(), "Model comparison finished");
        for change in &changes {
            debug!(change = %change.description(), "Detected change");
        }
        changes
    }

    fn add_table(table: &Table, changes: &mut Vec<Change>) {
        let mut created = table.clone();
        created.foreign_keys.clear();
        created.indexes.clear();
        let rows = created.rows.as_mut().map(std::mem::take);
        changes.push(Change::AddTable { table: created });

        for fk in &table.foreign_keys {
            changes.push(Change::add_foreign_key(&table.name, fk.clone()));
        }
        for index in &table.indexes {
            changes.push(Change::add_index(&table.name, index.clone()));
        }
        for row in rows.into_iter().flatten() {
            changes.push(Change::add_row(table, row));
        }
    }

    fn diff_table(&self, current: &Table, desired: &Table, changes: &mut Vec<Change>) {
        let name = desired.name.as_str();

        for column in &current.columns {
            if desired.get_column(&column.name).is_none() {
                changes.push(Change::remove_column(name, &column.name));
            }
        }

        for (position, column) in desired.columns.iter().enumerate() {
            match current.get_column(&column.name) {
                None => changes.push(Change::add_column(
                    name,
                    column.clone(),
                    position,
                    desired.columns.get(position + 1).map(|c| c.name.clone()),
                )),
                Some(existing) => {
                    if let Some(change) = self.diff_column(name, existing, column) {
                        changes.push(change);
                    }
                }
            }
        }

        if self.options.column_order_managed && column_order_changed(current, desired) {
            changes.push(Change::ColumnOrderChange {
                table: name.to_string(),
                old_order: current.columns.iter().map(|c| c.name.clone()).collect(),
                new_order: desired.columns.iter().map(|c| c.name.clone()).collect(),
            });
        }

        let pk_changed = match (&current.primary_key, &desired.primary_key) {
            (None, None) => false,
            (Some(a), Some(b)) => !a.same_columns(b),
            _ => true,
        };
        if pk_changed {
            changes.push(Change::PrimaryKeyChange {
                table: name.to_string(),
                old: current.primary_key.clone(),
                new: desired.primary_key.clone(),
            });
        }

        for fk in &current.foreign_keys {
            match desired.get_foreign_key(&fk.name) {
                Some(wanted) if fk.equivalent(wanted) => {}
                _ => changes.push(Change::remove_foreign_key(name, fk.clone())),
            }
        }
        for fk in &desired.foreign_keys {
            match current.get_foreign_key(&fk.name) {
                Some(existing) if existing.equivalent(fk) => {}
                _ => changes.push(Change::add_foreign_key(name, fk.clone())),
            }
        }

        for index in &current.indexes {
            match desired.get_index(&index.name) {
                Some(wanted) if indexes_equivalent(index, wanted) => {}
                _ => changes.push(Change::remove_index(name, index.clone())),
            }
        }
        for index in &desired.indexes {
            match current.get_index(&index.name) {
                Some(existing) if indexes_equivalent(existing, index) => {}
                _ => changes.push(Change::add_index(name, index.clone())),
            }
        }

        for check in &current.checks {
            match desired.get_check(&check.name) {
                Some(wanted) if same_expression(&check.condition, &wanted.condition) => {}
                _ => changes.push(Change::remove_check(name, check.clone())),
            }
        }
        for check in &desired.checks {
            match current.get_check(&check.name) {
                Some(existing) if same_expression(&existing.condition, &check.condition) => {}
                _ => changes.push(Change::add_check(name, check.clone())),
            }
        }

        if self.options.compare_data {
            diff_rows(current, desired, changes);
        }
    }

    fn diff_column(&self, table: &str, current: &Column, desired: &Column) -> Option<Change> {
        let type_changed =
            self.platform.native_type(current) != self.platform.native_type(desired);
        let mut delta = ColumnDelta {
            type_changed,
            nullability_changed: current.nullable != desired.nullable,
            default_changed: self.platform.normalize_default(current.default.as_deref())
                != self.platform.normalize_default(desired.default.as_deref()),
            auto_increment_changed: current.auto_increment != desired.auto_increment,
            narrowing: type_changed && is_narrowing(current.shape(), desired.shape()),
            rebuild_required: false,
        };
        if delta.is_empty() {
            return None;
        }
        delta.rebuild_required =
            delta.narrowing || (delta.default_only() && !self.platform.supports_alter_default);

        Some(Change::ColumnDefinitionChange {
            table: table.to_string(),
            old: current.clone(),
            new: desired.clone(),
            delta,
        })
    }

    fn diff_triggers(current: &Database, desired: &Database, changes: &mut Vec<Change>) {
        for trigger in &current.triggers {
            match desired.get_trigger(&trigger.name) {
                Some(wanted) if triggers_equivalent(trigger, wanted) => {}
                _ => changes.push(Change::RemoveTrigger {
                    trigger: trigger.clone(),
                }),
            }
        }
        for trigger in &desired.triggers {
            match current.get_trigger(&trigger.name) {
                Some(existing) if triggers_equivalent(existing, trigger) => {}
                _ => changes.push(Change::AddTrigger {
                    trigger: trigger.clone(),
                }),
            }
        }

        // Unchanged triggers that read altered or dropped columns.
        let mut altered: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for change in changes.iter() {
            if let Change::ColumnDefinitionChange { table, new, .. } = change {
                altered.entry(name_key(table)).or_default().insert(new.name.clone());
            } else if let Change::RemoveColumn { table, column } = change {
                altered.entry(name_key(table)).or_default().insert(column.clone());
            }
        }
        let mut recreate = Vec::new();
        for (table, columns) in &altered {
            let triggers: Vec<Trigger> = desired
                .triggers_on(table)
                .filter(|t| {
                    current
                        .get_trigger(&t.name)
                        .is_some_and(|existing| triggers_equivalent(existing, t))
                })
                .filter(|t| columns.iter().any(|c| references_column(&t.body, c)))
                .cloned()
                .collect();
            if !triggers.is_empty() {
                let table = desired
                    .get_table(table)
                    .map_or_else(|| table.clone(), |t| t.name.clone());
                debug!(table = %table, count = triggers.len(), "Triggers reference altered columns");
                recreate.push(Change::RecreateTriggers { table, triggers });
            }
        }
        changes.extend(recreate);
    }

    fn diff_sequences(current: &Database, desired: &Database, changes: &mut Vec<Change>) {
        for sequence in &current.sequences {
            if desired.get_sequence(&sequence.name).is_none() {
                changes.push(Change::RemoveSequence {
                    sequence: sequence.clone(),
                });
            }
        }
        for sequence in &desired.sequences {
            match current.get_sequence(&sequence.name) {
                None => changes.push(Change::AddSequence {
                    sequence: sequence.clone(),
                }),
                Some(existing) if existing.increment != sequence.increment => {
                    changes.push(Change::AlterSequence {
                        old: existing.clone(),
                        new: sequence.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    fn diff_views(current: &Database, desired: &Database, changes: &mut Vec<Change>) {
        for view in &current.views {
            match desired.get_view(&view.name) {
                Some(wanted) if same_expression(&view.statement, &wanted.statement) => {}
                _ => changes.push(Change::RemoveView { view: view.clone() }),
            }
        }
        for view in &desired.views {
            match current.get_view(&view.name) {
                Some(existing) if same_expression(&existing.statement, &view.statement) => {}
                _ => changes.push(Change::AddView { view: view.clone() }),
            }
        }
    }

    fn diff_functions(current: &Database, desired: &Database, changes: &mut Vec<Change>) {
        for function in &current.functions {
            match desired.get_function(&function.name) {
                Some(wanted) if functions_equivalent(function, wanted) => {}
                _ => changes.push(Change::RemoveFunction {
                    function: function.clone(),
                }),
            }
        }
        for function in &desired.functions {
            match current.get_function(&function.name) {
                Some(existing) if functions_equivalent(existing, function) => {}
                _ => changes.push(Change::AddFunction {
                    function: function.clone(),
                }),
            }
        }
    }
}

/// Returns whether the relative order of shared columns differs, or a new
/// column is not appended after every existing one.
fn column_order_changed(current: &Table, desired: &Table) -> bool {
    let shared_current: Vec<&str> = current
        .columns
        .iter()
        .filter(|c| desired.get_column(&c.name).is_some())
        .map(|c| c.name.as_str())
        .collect();
    let shared_desired: Vec<&str> = desired
        .columns
        .iter()
        .filter(|c| current.get_column(&c.name).is_some())
        .map(|c| c.name.as_str())
        .collect();
    let reordered = shared_current
        .iter()
        .zip(&shared_desired)
        .any(|(a, b)| !name_eq(a, b));

    let last_shared = desired
        .columns
        .iter()
        .rposition(|c| current.get_column(&c.name).is_some());
    let first_new = desired
        .columns
        .iter()
        .position(|c| current.get_column(&c.name).is_none());
    let inserted = matches!((first_new, last_shared), (Some(n), Some(s)) if n < s);

    reordered || inserted
}

fn indexes_equivalent(a: &crate::model::Index, b: &crate::model::Index) -> bool {
    same_names(&a.columns, &b.columns)
        && a.unique == b.unique
        && a.condition.as_deref().map(normalize_expression)
            == b.condition.as_deref().map(normalize_expression)
}

fn same_expression(a: &str, b: &str) -> bool {
    normalize_expression(a) == normalize_expression(b)
}

fn triggers_equivalent(a: &Trigger, b: &Trigger) -> bool {
    let events = |t: &Trigger| t.events.iter().copied().collect::<BTreeSet<_>>();
    name_eq(&a.table, &b.table)
        && a.timing == b.timing
        && a.for_each_row == b.for_each_row
        && events(a) == events(b)
        && same_expression(&a.body, &b.body)
}

fn functions_equivalent(a: &Function, b: &Function) -> bool {
    a.returns == b.returns
        && a.parameters.len() == b.parameters.len()
        && a.parameters
            .iter()
            .zip(&b.parameters)
            .all(|(x, y)| name_eq(&x.name, &y.name) && x.type_code == y.type_code)
        && same_expression(&a.body, &b.body)
}

/// Returns whether `code` mentions `column` as a whole word.
#[must_use]
pub fn references_column(code: &str, column: &str) -> bool {
    if column.is_empty() {
        return false;
    }
    let code = code.to_uppercase();
    let column = column.to_uppercase();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    code.match_indices(&column).any(|(at, found)| {
        let before = code[..at].chars().next_back();
        let after = code[at + found.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Canonical text of a key value, equal across numeric representations.
fn key_text(value: &Value) -> String {
    match value {
        Value::Int(i) => i.to_string(),
        Value::Decimal(d) => d.normalize().to_string(),
        Value::Float(f) => Decimal::try_from(*f).map_or_else(|_| f.to_string(), |d| d.normalize().to_string()),
        Value::Bool(b) => i64::from(*b).to_string(),
        other => other.to_string(),
    }
}

fn key_string(key: &Row) -> String {
    key.iter()
        .map(|(c, v)| format!("{c}={}", key_text(v)))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn diff_rows(current: &Table, desired: &Table, changes: &mut Vec<Change>) {
    let (Some(desired_rows), Some(current_rows)) = (&desired.rows, &current.rows) else {
        return;
    };
    let key_columns = desired.key_columns();
    if key_columns.is_empty() {
        debug!(table = %desired.name, "Managed rows without primary key are not compared");
        return;
    }

    let existing: BTreeMap<String, &Row> = current_rows
        .iter()
        .filter_map(|r| r.key(key_columns).map(|k| (key_string(&k), r)))
        .collect();
    let mut seen = BTreeSet::new();

    for row in desired_rows {
        let Some(key) = row.key(key_columns) else {
            debug!(table = %desired.name, row = %row, "Row without key skipped");
            continue;
        };
        let id = key_string(&key);
        seen.insert(id.clone());
        match existing.get(&id) {
            None => changes.push(Change::add_row(desired, row.clone())),
            Some(current_row) => {
                for (column, value) in row.iter() {
                    if desired.is_key_column(column) {
                        continue;
                    }
                    let old = current_row.get(column).cloned().unwrap_or(Value::Null);
                    if !old.same_as(value) {
                        changes.push(Change::ColumnDataChange {
                            table: desired.name.clone(),
                            key: key.clone(),
                            column: column.to_string(),
                            old,
                            new: value.clone(),
                        });
                    }
                }
            }
        }
    }

    for row in current_rows {
        if let Some(key) = row.key(key_columns) {
            if !seen.contains(&key_string(&key)) {
                changes.push(Change::RemoveRow {
                    table: desired.name.clone(),
                    key,
                });
            }
        }
    }
}
