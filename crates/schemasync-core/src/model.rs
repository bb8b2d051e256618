//! Declarative database model.
//!
//! A [`Database`] describes tables, constraints and routines the way they
//! should exist (the desired model) or the way they were read from a live
//! database (the current model). All name lookups are case-insensitive.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::types::{TypeCode, TypeShape};
use crate::value::Row;

/// Case-insensitive identifier comparison.
#[must_use]
pub fn name_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Canonical key for an identifier (upper case).
#[must_use]
pub fn name_key(name: &str) -> String {
    name.to_uppercase()
}

/// Referential action on delete or update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A column of a table. Its ordinal is its position in [`Table::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Logical type.
    #[serde(rename = "type")]
    pub type_code: TypeCode,
    /// Length, or precision for decimal types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Scale for decimal types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Whether NULL is allowed.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Standing DEFAULT expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Value written to existing rows when the column is created.
    /// Never part of the column's standing definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_create_default: Option<String>,
    /// Whether values are generated by the database.
    #[serde(default)]
    pub auto_increment: bool,
}

const fn default_true() -> bool {
    true
}

impl Column {
    /// Creates a new nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            size: None,
            scale: None,
            nullable: true,
            default: None,
            on_create_default: None,
            auto_increment: false,
        }
    }

    /// Sets the length or precision.
    #[must_use]
    pub const fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets precision and scale.
    #[must_use]
    pub const fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.size = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the standing default expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Sets the on-create default.
    #[must_use]
    pub fn on_create_default(mut self, expr: impl Into<String>) -> Self {
        self.on_create_default = Some(expr.into());
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Returns the type together with size and scale.
    #[must_use]
    pub const fn shape(&self) -> TypeShape<'_> {
        TypeShape {
            code: &self.type_code,
            size: self.size,
            scale: self.scale,
        }
    }

    /// Value used to fill existing rows when the column is created:
    /// the on-create default, else the standing default.
    #[must_use]
    pub fn initial_value(&self) -> Option<&str> {
        self.on_create_default
            .as_deref()
            .or(self.default.as_deref())
    }
}

/// Primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

impl PrimaryKey {
    /// Creates a primary key.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
        }
    }

    /// Compares column lists case-insensitively, order included.
    #[must_use]
    pub fn same_columns(&self, other: &Self) -> bool {
        same_names(&self.columns, &other.columns)
    }
}

/// One local/foreign column pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub local: String,
    pub foreign: String,
}

/// Foreign key constraint. The source table is the table owning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referenced table.
    pub foreign_table: String,
    /// Ordered column pairs.
    pub references: Vec<Reference>,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    /// Set when the target table belongs to another module and may be absent
    /// from this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_module: Option<String>,
}

impl ForeignKey {
    /// Creates a foreign key with no column pairs.
    #[must_use]
    pub fn new(name: impl Into<String>, foreign_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_table: foreign_table.into(),
            references: Vec::new(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            external_module: None,
        }
    }

    /// Adds a column pair.
    #[must_use]
    pub fn reference(mut self, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        self.references.push(Reference {
            local: local.into(),
            foreign: foreign.into(),
        });
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Local column names.
    pub fn local_columns(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.local.as_str())
    }

    /// Referenced column names.
    pub fn foreign_columns(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.foreign.as_str())
    }

    /// Returns whether the constraint uses the given local column.
    #[must_use]
    pub fn uses_column(&self, column: &str) -> bool {
        self.local_columns().any(|c| name_eq(c, column))
    }

    /// Structural equality ignoring the constraint name's case.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        name_eq(&self.foreign_table, &other.foreign_table)
            && self.references.len() == other.references.len()
            && self
                .references
                .iter()
                .zip(&other.references)
                .all(|(a, b)| name_eq(&a.local, &b.local) && name_eq(&a.foreign, &b.foreign))
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

/// Index, optionally unique or partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Index {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
            unique: false,
            condition: None,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Makes the index partial.
    #[must_use]
    pub fn condition(mut self, predicate: impl Into<String>) -> Self {
        self.condition = Some(predicate.into());
        self
    }
}

/// Check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub condition: String,
}

impl Check {
    /// Creates a check constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
        }
    }
}

/// When a trigger fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    #[default]
    Before,
    After,
}

/// Statement kind that fires a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    /// SQL keyword of the event.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Table trigger. The body is platform procedural code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    #[serde(default = "default_true")]
    pub for_each_row: bool,
    pub body: String,
}

impl Trigger {
    /// Creates a row-level BEFORE trigger.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        events: &[TriggerEvent],
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            timing: TriggerTiming::Before,
            events: events.to_vec(),
            for_each_row: true,
            body: body.into(),
        }
    }
}

/// Sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    #[serde(default = "default_one")]
    pub start: i64,
    #[serde(default = "default_one")]
    pub increment: i64,
}

const fn default_one() -> i64 {
    1
}

/// View.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    /// The defining SELECT statement.
    pub statement: String,
}

/// Function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_code: TypeCode,
}

/// Stored function or procedure (no return type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeCode>,
    pub body: String,
}

/// Script executed before any other change, such as enabling an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreScript {
    pub name: String,
    pub sql: String,
}

/// A table and the constraints it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub checks: Vec<Check>,
    /// Predicate scoping which rows of this table are managed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_filter: Option<String>,
    /// Owning module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Managed rows; `None` when the table's data is not managed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
            row_filter: None,
            module: None,
            rows: None,
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKey::new(name, columns));
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a check constraint.
    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds a managed row, switching row management on.
    #[must_use]
    pub fn row(mut self, row: Row) -> Self {
        self.rows.get_or_insert_with(Vec::new).push(row);
        self
    }

    /// Sets the owning module.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| name_eq(&c.name, name))
    }

    /// Gets a mutable column by name.
    #[must_use]
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| name_eq(&c.name, name))
    }

    /// Returns the position of a column.
    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| name_eq(&c.name, name))
    }

    /// Gets a foreign key by name.
    #[must_use]
    pub fn get_foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| name_eq(&f.name, name))
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| name_eq(&i.name, name))
    }

    /// Gets a check constraint by name.
    #[must_use]
    pub fn get_check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| name_eq(&c.name, name))
    }

    /// Primary key columns, empty when the table has none.
    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        self.primary_key.as_ref().map_or(&[], |pk| pk.columns.as_slice())
    }

    /// Returns whether a column is part of the primary key.
    #[must_use]
    pub fn is_key_column(&self, column: &str) -> bool {
        self.key_columns().iter().any(|c| name_eq(c, column))
    }
}

/// The complete model of a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub pre_scripts: Vec<PreScript>,
}

impl Database {
    /// Creates an empty model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a trigger.
    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Adds a view.
    #[must_use]
    pub fn view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Adds a function.
    #[must_use]
    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Adds a pre-script.
    #[must_use]
    pub fn pre_script(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.pre_scripts.push(PreScript {
            name: name.into(),
            sql: sql.into(),
        });
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| name_eq(&t.name, name))
    }

    /// Gets a mutable table by name.
    #[must_use]
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| name_eq(&t.name, name))
    }

    /// Gets a trigger by name.
    #[must_use]
    pub fn get_trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| name_eq(&t.name, name))
    }

    /// Triggers defined on a table.
    pub fn triggers_on<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Trigger> + 'a {
        self.triggers.iter().filter(move |t| name_eq(&t.table, table))
    }

    /// Gets a sequence by name.
    #[must_use]
    pub fn get_sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| name_eq(&s.name, name))
    }

    /// Gets a view by name.
    #[must_use]
    pub fn get_view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| name_eq(&v.name, name))
    }

    /// Gets a function by name.
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| name_eq(&f.name, name))
    }

    /// Returns table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Foreign keys of other tables (and self references) pointing at `table`,
    /// as `(source table, foreign key)` pairs.
    #[must_use]
    pub fn referencing_foreign_keys(&self, table: &str) -> Vec<(&Table, &ForeignKey)> {
        self.tables
            .iter()
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(_, fk)| name_eq(&fk.foreign_table, table))
            .collect()
    }

    /// Checks the structural invariants of the model.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = BTreeSet::new();

        for table in &self.tables {
            if !seen.insert(name_key(&table.name)) {
                errors.push(SyncError::InvalidModel(format!(
                    "Duplicate table '{}'",
                    table.name
                )));
            }
            let mut columns = BTreeSet::new();
            for column in &table.columns {
                if !columns.insert(name_key(&column.name)) {
                    errors.push(SyncError::InvalidModel(format!(
                        "Duplicate column '{}' in table '{}'",
                        column.name, table.name
                    )));
                }
            }
            for column in table.key_columns() {
                if table.get_column(column).is_none() {
                    errors.push(SyncError::InvalidModel(format!(
                        "Primary key of '{}' uses unknown column '{column}'",
                        table.name
                    )));
                }
            }
            for index in &table.indexes {
                for column in &index.columns {
                    if table.get_column(column).is_none() {
                        errors.push(SyncError::InvalidModel(format!(
                            "Index '{}' uses unknown column '{}.{column}'",
                            index.name, table.name
                        )));
                    }
                }
            }
            for fk in &table.foreign_keys {
                self.validate_foreign_key(table, fk, &mut errors);
            }
        }

        for trigger in &self.triggers {
            if self.get_table(&trigger.table).is_none() {
                errors.push(SyncError::InvalidModel(format!(
                    "Trigger '{}' is defined on unknown table '{}'",
                    trigger.name, trigger.table
                )));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SyncError::Multiple(errors)),
        }
    }

    fn validate_foreign_key(&self, table: &Table, fk: &ForeignKey, errors: &mut Vec<SyncError>) {
        if fk.references.is_empty() {
            errors.push(SyncError::InvalidModel(format!(
                "Foreign key '{}' on '{}' has no columns",
                fk.name, table.name
            )));
        }
        for column in fk.local_columns() {
            if table.get_column(column).is_none() {
                errors.push(SyncError::InvalidModel(format!(
                    "Foreign key '{}' uses unknown column '{}.{column}'",
                    fk.name, table.name
                )));
            }
        }
        match self.get_table(&fk.foreign_table) {
            Some(target) => {
                for column in fk.foreign_columns() {
                    if target.get_column(column).is_none() {
                        errors.push(SyncError::InvalidModel(format!(
                            "Foreign key '{}' references unknown column '{}.{column}'",
                            fk.name, target.name
                        )));
                    }
                }
            }
            None if fk.external_module.is_some() => {}
            None => errors.push(SyncError::InvalidModel(format!(
                "Foreign key '{}' on '{}' references unknown table '{}'",
                fk.name, table.name, fk.foreign_table
            ))),
        }
    }
}

/// Result of ordering tables by their foreign key dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyOrder {
    /// Table names, referenced tables before referencing ones.
    pub order: Vec<String>,
    /// Upper-cased names of tables that are part of a reference cycle.
    pub cyclic: BTreeSet<String>,
}

/// Orders `tables` so that referenced tables come first.
///
/// Only references between the given tables count; self references are
/// ignored. Tables on a cycle are appended in name order.
#[must_use]
pub fn dependency_order(tables: &[&Table]) -> DependencyOrder {
    let keys: BTreeMap<String, &Table> = tables.iter().map(|t| (name_key(&t.name), *t)).collect();
    let mut incoming: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

    for (key, table) in &keys {
        let deps = incoming.entry(key.as_str()).or_default();
        for fk in &table.foreign_keys {
            let target = name_key(&fk.foreign_table);
            if target != *key && keys.contains_key(&target) {
                deps.insert(target);
            }
        }
    }

    let mut order = Vec::with_capacity(keys.len());
    let mut done = BTreeSet::new();
    loop {
        let ready: Vec<String> = incoming
            .iter()
            .filter(|&(k, deps)| !done.contains(*k) && deps.iter().all(|d| done.contains(d)))
            .map(|(k, _)| (*k).to_string())
            .collect();
        if ready.is_empty() {
            break;
        }
        for key in ready {
            order.push(keys[key.as_str()].name.clone());
            done.insert(key);
        }
    }

    let cyclic: BTreeSet<String> = keys
        .keys()
        .filter(|k| !done.contains(k.as_str()))
        .cloned()
        .collect();
    order.extend(cyclic.iter().map(|k| keys[k.as_str()].name.clone()));

    DependencyOrder { order, cyclic }
}

/// Compares two name lists case-insensitively, order included.
#[must_use]
pub fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| name_eq(x, y))
}
