//! Atomic model differences.
//!
//! A [`Change`] carries everything needed to render it on its own; the
//! comparator produces them and the planner orders them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    Check, Column, ForeignKey, Function, Index, PrimaryKey, Sequence, Table, Trigger, View,
};
use crate::value::{Row, Value};

/// What differs between two definitions of the same column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDelta {
    pub type_changed: bool,
    pub nullability_changed: bool,
    pub default_changed: bool,
    pub auto_increment_changed: bool,
    /// The new type cannot hold every value of the old one.
    pub narrowing: bool,
    /// The change cannot be applied in place.
    pub rebuild_required: bool,
}

impl ColumnDelta {
    /// Returns whether anything differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.type_changed
            || self.nullability_changed
            || self.default_changed
            || self.auto_increment_changed)
    }

    /// Returns whether only the default differs.
    #[must_use]
    pub const fn default_only(&self) -> bool {
        self.default_changed
            && !self.type_changed
            && !self.nullability_changed
            && !self.auto_increment_changed
    }
}

/// Ordering class of a change within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeCategory {
    DropConstraint,
    DropColumn,
    Structure,
    AddColumn,
    AddConstraint,
}

/// A single difference between the current and the desired model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    AddTable {
        table: Table,
    },
    RemoveTable {
        table: Table,
    },
    AddColumn {
        table: String,
        column: Column,
        /// Ordinal of the new column in the desired table.
        position: usize,
        /// Column that follows the new one, if any.
        next_column: Option<String>,
    },
    RemoveColumn {
        table: String,
        column: String,
    },
    ColumnDefinitionChange {
        table: String,
        old: Column,
        new: Column,
        delta: ColumnDelta,
    },
    ColumnOrderChange {
        table: String,
        old_order: Vec<String>,
        new_order: Vec<String>,
    },
    PrimaryKeyChange {
        table: String,
        old: Option<PrimaryKey>,
        new: Option<PrimaryKey>,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    RemoveForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    AddIndex {
        table: String,
        index: Index,
    },
    RemoveIndex {
        table: String,
        index: Index,
    },
    AddCheck {
        table: String,
        check: Check,
    },
    RemoveCheck {
        table: String,
        check: Check,
    },
    AddTrigger {
        trigger: Trigger,
    },
    RemoveTrigger {
        trigger: Trigger,
    },
    /// Triggers of a table that reference altered columns; dropped before
    /// and created again after the alteration.
    RecreateTriggers {
        table: String,
        triggers: Vec<Trigger>,
    },
    AddSequence {
        sequence: Sequence,
    },
    RemoveSequence {
        sequence: Sequence,
    },
    AlterSequence {
        old: Sequence,
        new: Sequence,
    },
    AddView {
        view: View,
    },
    RemoveView {
        view: View,
    },
    AddFunction {
        function: Function,
    },
    RemoveFunction {
        function: Function,
    },
    AddRow {
        table: String,
        row: Row,
        /// On-create default expressions of the columns the row leaves out.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        on_create: BTreeMap<String, String>,
    },
    RemoveRow {
        table: String,
        /// Primary key projection of the row.
        key: Row,
    },
    ColumnDataChange {
        table: String,
        key: Row,
        column: String,
        old: Value,
        new: Value,
    },
}

impl Change {
    /// Creates an AddColumn change.
    #[must_use]
    pub fn add_column(
        table: impl Into<String>,
        column: Column,
        position: usize,
        next_column: Option<String>,
    ) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
            position,
            next_column,
        }
    }

    /// Creates a RemoveColumn change.
    #[must_use]
    pub fn remove_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::RemoveColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an AddRow change for `table`, carrying the on-create defaults
    /// of the columns `row` has no value for.
    #[must_use]
    pub fn add_row(table: &Table, row: Row) -> Self {
        let on_create = table
            .columns
            .iter()
            .filter(|c| row.get(&c.name).is_none())
            .filter_map(|c| {
                c.on_create_default
                    .as_ref()
                    .map(|expr| (c.name.to_uppercase(), expr.clone()))
            })
            .collect();
        Self::AddRow {
            table: table.name.clone(),
            row,
            on_create,
        }
    }

    /// Creates an AddForeignKey change.
    #[must_use]
    pub fn add_foreign_key(table: impl Into<String>, foreign_key: ForeignKey) -> Self {
        Self::AddForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a RemoveForeignKey change.
    #[must_use]
    pub fn remove_foreign_key(table: impl Into<String>, foreign_key: ForeignKey) -> Self {
        Self::RemoveForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates an AddIndex change.
    #[must_use]
    pub fn add_index(table: impl Into<String>, index: Index) -> Self {
        Self::AddIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates a RemoveIndex change.
    #[must_use]
    pub fn remove_index(table: impl Into<String>, index: Index) -> Self {
        Self::RemoveIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates an AddCheck change.
    #[must_use]
    pub fn add_check(table: impl Into<String>, check: Check) -> Self {
        Self::AddCheck {
            table: table.into(),
            check,
        }
    }

    /// Creates a RemoveCheck change.
    #[must_use]
    pub fn remove_check(table: impl Into<String>, check: Check) -> Self {
        Self::RemoveCheck {
            table: table.into(),
            check,
        }
    }

    /// Table the change applies to, if it is table scoped.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::AddTable { table } | Self::RemoveTable { table } => Some(table.name.as_str()),
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::ColumnDefinitionChange { table, .. }
            | Self::ColumnOrderChange { table, .. }
            | Self::PrimaryKeyChange { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::RemoveForeignKey { table, .. }
            | Self::AddIndex { table, .. }
            | Self::RemoveIndex { table, .. }
            | Self::AddCheck { table, .. }
            | Self::RemoveCheck { table, .. }
            | Self::RecreateTriggers { table, .. }
            | Self::AddRow { table, .. }
            | Self::RemoveRow { table, .. }
            | Self::ColumnDataChange { table, .. } => Some(table.as_str()),
            Self::AddTrigger { trigger } | Self::RemoveTrigger { trigger } => {
                Some(trigger.table.as_str())
            }
            Self::AddSequence { .. }
            | Self::RemoveSequence { .. }
            | Self::AlterSequence { .. }
            | Self::AddView { .. }
            | Self::RemoveView { .. }
            | Self::AddFunction { .. }
            | Self::RemoveFunction { .. } => None,
        }
    }

    /// Column the change applies to, if it is column scoped.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::AddColumn { column, .. } => Some(column.name.as_str()),
            Self::RemoveColumn { column, .. } | Self::ColumnDataChange { column, .. } => {
                Some(column.as_str())
            }
            Self::ColumnDefinitionChange { new, .. } => Some(new.name.as_str()),
            _ => None,
        }
    }

    /// Table name, or the object name for schema-level objects.
    #[must_use]
    pub fn object_name(&self) -> &str {
        if let Some(table) = self.table() {
            return table;
        }
        match self {
            Self::AddSequence { sequence } | Self::RemoveSequence { sequence } => {
                sequence.name.as_str()
            }
            Self::AlterSequence { new, .. } => new.name.as_str(),
            Self::AddView { view } | Self::RemoveView { view } => view.name.as_str(),
            Self::AddFunction { function } | Self::RemoveFunction { function } => {
                function.name.as_str()
            }
            _ => "",
        }
    }

    /// Ordering class of the change.
    #[must_use]
    pub const fn category(&self) -> ChangeCategory {
        match self {
            Self::RemoveForeignKey { .. }
            | Self::RemoveIndex { .. }
            | Self::RemoveCheck { .. }
            | Self::RemoveTrigger { .. }
            | Self::RemoveView { .. }
            | Self::RemoveFunction { .. } => ChangeCategory::DropConstraint,
            Self::RemoveColumn { .. }
            | Self::RemoveTable { .. }
            | Self::RemoveSequence { .. }
            | Self::RemoveRow { .. } => ChangeCategory::DropColumn,
            Self::AddTable { .. }
            | Self::ColumnDefinitionChange { .. }
            | Self::ColumnOrderChange { .. }
            | Self::PrimaryKeyChange { .. }
            | Self::RecreateTriggers { .. }
            | Self::AddSequence { .. }
            | Self::AlterSequence { .. }
            | Self::ColumnDataChange { .. } => ChangeCategory::Structure,
            Self::AddColumn { .. } | Self::AddRow { .. } => ChangeCategory::AddColumn,
            Self::AddForeignKey { .. }
            | Self::AddIndex { .. }
            | Self::AddCheck { .. }
            | Self::AddTrigger { .. }
            | Self::AddView { .. }
            | Self::AddFunction { .. } => ChangeCategory::AddConstraint,
        }
    }

    /// Short kind name, used in reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddTable { .. } => "AddTable",
            Self::RemoveTable { .. } => "RemoveTable",
            Self::AddColumn { .. } => "AddColumn",
            Self::RemoveColumn { .. } => "RemoveColumn",
            Self::ColumnDefinitionChange { .. } => "ColumnDefinitionChange",
            Self::ColumnOrderChange { .. } => "ColumnOrderChange",
            Self::PrimaryKeyChange { .. } => "PrimaryKeyChange",
            Self::AddForeignKey { .. } => "AddForeignKey",
            Self::RemoveForeignKey { .. } => "RemoveForeignKey",
            Self::AddIndex { .. } => "AddIndex",
            Self::RemoveIndex { .. } => "RemoveIndex",
            Self::AddCheck { .. } => "AddCheck",
            Self::RemoveCheck { .. } => "RemoveCheck",
            Self::AddTrigger { .. } => "AddTrigger",
            Self::RemoveTrigger { .. } => "RemoveTrigger",
            Self::RecreateTriggers { .. } => "RecreateTriggers",
            Self::AddSequence { .. } => "AddSequence",
            Self::RemoveSequence { .. } => "RemoveSequence",
            Self::AlterSequence { .. } => "AlterSequence",
            Self::AddView { .. } => "AddView",
            Self::RemoveView { .. } => "RemoveView",
            Self::AddFunction { .. } => "AddFunction",
            Self::RemoveFunction { .. } => "RemoveFunction",
            Self::AddRow { .. } => "AddRow",
            Self::RemoveRow { .. } => "RemoveRow",
            Self::ColumnDataChange { .. } => "ColumnDataChange",
        }
    }

    /// Returns whether the change loses data or schema objects.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::RemoveTable { .. } | Self::RemoveColumn { .. } | Self::RemoveRow { .. }
        )
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AddTable { table } => format!("Create table {}", table.name),
            Self::RemoveTable { table } => format!("Drop table {}", table.name),
            Self::AddColumn { table, column, .. } => {
                format!("Add column {}.{}", table, column.name)
            }
            Self::RemoveColumn { table, column } => format!("Drop column {table}.{column}"),
            Self::ColumnDefinitionChange { table, new, delta, .. } => {
                let mut what = Vec::new();
                if delta.type_changed {
                    what.push("type");
                }
                if delta.nullability_changed {
                    what.push(if new.nullable { "nullable" } else { "not null" });
                }
                if delta.default_changed {
                    what.push("default");
                }
                if delta.auto_increment_changed {
                    what.push("auto increment");
                }
                format!("Alter column {}.{} ({})", table, new.name, what.join(", "))
            }
            Self::ColumnOrderChange { table, .. } => format!("Reorder columns of {table}"),
            Self::PrimaryKeyChange { table, .. } => format!("Change primary key of {table}"),
            Self::AddForeignKey { table, foreign_key } => format!(
                "Add foreign key {} on {} referencing {}",
                foreign_key.name, table, foreign_key.foreign_table
            ),
            Self::RemoveForeignKey { table, foreign_key } => {
                format!("Drop foreign key {} on {}", foreign_key.name, table)
            }
            Self::AddIndex { table, index } => format!("Create index {} on {}", index.name, table),
            Self::RemoveIndex { table, index } => format!("Drop index {} on {}", index.name, table),
            Self::AddCheck { table, check } => format!("Add check {} on {}", check.name, table),
            Self::RemoveCheck { table, check } => format!("Drop check {} on {}", check.name, table),
            Self::AddTrigger { trigger } => {
                format!("Create trigger {} on {}", trigger.name, trigger.table)
            }
            Self::RemoveTrigger { trigger } => {
                format!("Drop trigger {} on {}", trigger.name, trigger.table)
            }
            Self::RecreateTriggers { table, triggers } => format!(
                "Recreate {} trigger(s) on {}",
                triggers.len(),
                table
            ),
            Self::AddSequence { sequence } => format!("Create sequence {}", sequence.name),
            Self::RemoveSequence { sequence } => format!("Drop sequence {}", sequence.name),
            Self::AlterSequence { new, .. } => format!("Alter sequence {}", new.name),
            Self::AddView { view } => format!("Create view {}", view.name),
            Self::RemoveView { view } => format!("Drop view {}", view.name),
            Self::AddFunction { function } => format!("Create function {}", function.name),
            Self::RemoveFunction { function } => format!("Drop function {}", function.name),
            Self::AddRow { table, row, .. } => format!("Insert row into {table} ({row})"),
            Self::RemoveRow { table, key } => format!("Delete row from {table} ({key})"),
            Self::ColumnDataChange {
                table, key, column, ..
            } => format!("Update {table}.{column} ({key})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCode;

    #[test]
    fn test_category_order() {
        assert!(ChangeCategory::DropConstraint < ChangeCategory::DropColumn);
        assert!(ChangeCategory::Structure < ChangeCategory::AddColumn);
        assert!(ChangeCategory::AddColumn < ChangeCategory::AddConstraint);
    }

    #[test]
    fn test_accessors() {
        let change = Change::add_column(
            "C_ORDER",
            Column::new("EM_STATUS", TypeCode::Char).size(1),
            4,
            None,
        );
        assert_eq!(change.table(), Some("C_ORDER"));
        assert_eq!(change.column(), Some("EM_STATUS"));
        assert_eq!(change.category(), ChangeCategory::AddColumn);
        assert_eq!(change.description(), "Add column C_ORDER.EM_STATUS");

        let seq = Change::AddSequence {
            sequence: Sequence {
                name: "SEQ_DOC".into(),
                start: 1,
                increment: 1,
            },
        };
        assert_eq!(seq.table(), None);
        assert_eq!(seq.object_name(), "SEQ_DOC");
    }

    #[test]
    fn test_delta_default_only() {
        let delta = ColumnDelta {
            default_changed: true,
            ..ColumnDelta::default()
        };
        assert!(delta.default_only());
        assert!(!delta.is_empty());
        assert!(ColumnDelta::default().is_empty());
    }

    #[test]
    fn test_destructive() {
        assert!(Change::remove_column("T", "C").is_destructive());
        assert!(!Change::add_index("T", Index::new("I", &["C"])).is_destructive());
    }
}
