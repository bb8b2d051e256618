//! Model snapshot replay.
//!
//! [`ModelState`] applies changes to a model, producing the model the
//! database has after those changes ran. The planner uses it to derive
//! rebuild targets and the executor to keep its view of the current model
//! in step with what was applied.

use crate::change::Change;
use crate::error::{Result, SyncError};
use crate::model::{name_eq, Database, Table};

/// A database model that evolves as changes are applied.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    model: Database,
}

impl ModelState {
    /// Starts from the given model.
    #[must_use]
    pub const fn new(model: Database) -> Self {
        Self { model }
    }

    /// Returns the current model.
    #[must_use]
    pub const fn model(&self) -> &Database {
        &self.model
    }

    /// Consumes and returns the model.
    #[must_use]
    pub fn into_model(self) -> Database {
        self.model
    }

    /// Applies several changes in order.
    pub fn apply_all<'a>(&mut self, changes: impl IntoIterator<Item = &'a Change>) -> Result<()> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    /// Swaps a table for a new definition with the same name.
    pub fn replace_table(&mut self, table: Table) -> Result<()> {
        let existing = self.table_mut(&table.name)?;
        *existing = table;
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.model
            .get_table_mut(name)
            .ok_or_else(|| SyncError::missing_table(name))
    }

    /// Applies a single change.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::AddTable { table } => {
                if self.model.get_table(&table.name).is_some() {
                    return Err(SyncError::InvalidState(format!(
                        "Table '{}' already exists",
                        table.name
                    )));
                }
                self.model.tables.push(table.clone());
            }

            Change::RemoveTable { table } => {
                let idx = self
                    .model
                    .tables
                    .iter()
                    .position(|t| name_eq(&t.name, &table.name))
                    .ok_or_else(|| SyncError::missing_table(&table.name))?;
                self.model.tables.remove(idx);
                self.model.triggers.retain(|t| !name_eq(&t.table, &table.name));
            }

            Change::AddColumn {
                table,
                column,
                position,
                ..
            } => {
                let t = self.table_mut(table)?;
                if t.get_column(&column.name).is_some() {
                    return Err(SyncError::InvalidState(format!(
                        "Column '{}' already exists in table '{}'",
                        column.name, table
                    )));
                }
                let at = (*position).min(t.columns.len());
                t.columns.insert(at, column.clone());
            }

            Change::RemoveColumn { table, column } => {
                let t = self.table_mut(table)?;
                let idx = t
                    .column_position(column)
                    .ok_or_else(|| SyncError::missing_column(table, column))?;
                t.columns.remove(idx);
            }

            Change::ColumnDefinitionChange { table, new, .. } => {
                let t = self.table_mut(table)?;
                let col = t
                    .get_column_mut(&new.name)
                    .ok_or_else(|| SyncError::missing_column(table, &new.name))?;
                *col = new.clone();
            }

            Change::ColumnOrderChange {
                table, new_order, ..
            } => {
                let t = self.table_mut(table)?;
                let mut remaining = std::mem::take(&mut t.columns);
                for name in new_order {
                    if let Some(idx) = remaining.iter().position(|c| name_eq(&c.name, name)) {
                        t.columns.push(remaining.remove(idx));
                    }
                }
                t.columns.append(&mut remaining);
            }

            Change::PrimaryKeyChange { table, new, .. } => {
                self.table_mut(table)?.primary_key.clone_from(new);
            }

            Change::AddForeignKey { table, foreign_key } => {
                let t = self.table_mut(table)?;
                t.foreign_keys.retain(|f| !name_eq(&f.name, &foreign_key.name));
                t.foreign_keys.push(foreign_key.clone());
            }

            Change::RemoveForeignKey { table, foreign_key } => {
                self.table_mut(table)?
                    .foreign_keys
                    .retain(|f| !name_eq(&f.name, &foreign_key.name));
            }

            Change::AddIndex { table, index } => {
                let t = self.table_mut(table)?;
                t.indexes.retain(|i| !name_eq(&i.name, &index.name));
                t.indexes.push(index.clone());
            }

            Change::RemoveIndex { table, index } => {
                self.table_mut(table)?
                    .indexes
                    .retain(|i| !name_eq(&i.name, &index.name));
            }

            Change::AddCheck { table, check } => {
                let t = self.table_mut(table)?;
                t.checks.retain(|c| !name_eq(&c.name, &check.name));
                t.checks.push(check.clone());
            }

            Change::RemoveCheck { table, check } => {
                self.table_mut(table)?
                    .checks
                    .retain(|c| !name_eq(&c.name, &check.name));
            }

            Change::AddTrigger { trigger } => {
                self.model.triggers.retain(|t| !name_eq(&t.name, &trigger.name));
                self.model.triggers.push(trigger.clone());
            }

            Change::RemoveTrigger { trigger } => {
                self.model.triggers.retain(|t| !name_eq(&t.name, &trigger.name));
            }

            Change::RecreateTriggers { triggers, .. } => {
                for trigger in triggers {
                    self.model.triggers.retain(|t| !name_eq(&t.name, &trigger.name));
                    self.model.triggers.push(trigger.clone());
                }
            }

            Change::AddSequence { sequence } | Change::AlterSequence { new: sequence, .. } => {
                self.model.sequences.retain(|s| !name_eq(&s.name, &sequence.name));
                self.model.sequences.push(sequence.clone());
            }

            Change::RemoveSequence { sequence } => {
                self.model.sequences.retain(|s| !name_eq(&s.name, &sequence.name));
            }

            Change::AddView { view } => {
                self.model.views.retain(|v| !name_eq(&v.name, &view.name));
                self.model.views.push(view.clone());
            }

            Change::RemoveView { view } => {
                self.model.views.retain(|v| !name_eq(&v.name, &view.name));
            }

            Change::AddFunction { function } => {
                self.model.functions.retain(|f| !name_eq(&f.name, &function.name));
                self.model.functions.push(function.clone());
            }

            Change::RemoveFunction { function } => {
                self.model.functions.retain(|f| !name_eq(&f.name, &function.name));
            }

            Change::AddRow { table, row, .. } => {
                self.table_mut(table)?
                    .rows
                    .get_or_insert_with(Vec::new)
                    .push(row.clone());
            }

            Change::RemoveRow { table, key } => {
                if let Some(rows) = self.table_mut(table)?.rows.as_mut() {
                    rows.retain(|r| !r.matches(key));
                }
            }

            Change::ColumnDataChange {
                table,
                key,
                column,
                new,
                ..
            } => {
                let t = self.table_mut(table)?;
                let row = t
                    .rows
                    .as_mut()
                    .and_then(|rows| rows.iter_mut().find(|r| r.matches(key)))
                    .ok_or_else(|| {
                        SyncError::InvalidState(format!("No row ({key}) in table '{table}'"))
                    })?;
                row.set(column, new.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::change::ColumnDelta;
    use crate::model::{Column, ForeignKey, Index};
    use crate::types::TypeCode;
    use crate::value::Row;

    fn base() -> Database {
        Database::new("test").table(
            Table::new("C_BPARTNER")
                .column(Column::new("C_BPARTNER_ID", TypeCode::Varchar).size(32).not_null())
                .column(Column::new("NAME", TypeCode::Varchar).size(60))
                .primary_key("C_BPARTNER_KEY", &["C_BPARTNER_ID"]),
        )
    }

    #[test]
    fn test_add_and_remove_table() {
        let mut state = ModelState::new(Database::new("test"));
        let table = Table::new("T").column(Column::new("ID", TypeCode::Integer));
        state.apply(&Change::AddTable { table: table.clone() }).unwrap();
        assert!(state.model().get_table("t").is_some());

        let err = state.apply(&Change::AddTable { table: table.clone() }).unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(_)));

        state.apply(&Change::RemoveTable { table }).unwrap();
        assert!(state.model().tables.is_empty());
    }

    #[test]
    fn test_add_column_at_position() {
        let mut state = ModelState::new(base());
        state
            .apply(&Change::add_column(
                "C_BPARTNER",
                Column::new("VALUE", TypeCode::Varchar).size(40),
                1,
                Some("NAME".into()),
            ))
            .unwrap();
        let names: Vec<_> = state.model().tables[0]
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["C_BPARTNER_ID", "VALUE", "NAME"]);
    }

    #[test]
    fn test_alter_column() {
        let mut state = ModelState::new(base());
        let old = Column::new("NAME", TypeCode::Varchar).size(60);
        let new = old.clone().not_null();
        state
            .apply(&Change::ColumnDefinitionChange {
                table: "C_BPARTNER".into(),
                old,
                new,
                delta: ColumnDelta {
                    nullability_changed: true,
                    ..ColumnDelta::default()
                },
            })
            .unwrap();
        assert!(!state.model().tables[0].columns[1].nullable);
    }

    #[test]
    fn test_replace_table() {
        let mut state = ModelState::new(base());
        let rebuilt = Table::new("c_bpartner")
            .column(Column::new("C_BPARTNER_ID", TypeCode::Varchar).size(32).not_null());
        state.replace_table(rebuilt).unwrap();
        assert_eq!(state.model().tables.len(), 1);
        assert_eq!(state.model().tables[0].columns.len(), 1);

        let err = state.replace_table(Table::new("MISSING")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(_)));
    }

    #[test]
    fn test_missing_column() {
        let mut state = ModelState::new(base());
        let err = state
            .apply(&Change::remove_column("C_BPARTNER", "MISSING"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(msg) if msg.contains("MISSING")));
    }

    #[test]
    fn test_constraints_and_rows() {
        let mut state = ModelState::new(base());
        state
            .apply(&Change::add_index("C_BPARTNER", Index::new("C_BP_NAME", &["NAME"])))
            .unwrap();
        state
            .apply(&Change::add_foreign_key(
                "C_BPARTNER",
                ForeignKey::new("C_BP_PARENT", "C_BPARTNER").reference("C_BPARTNER_ID", "C_BPARTNER_ID"),
            ))
            .unwrap();
        let row = Row::new().with("C_BPARTNER_ID", "100").with("NAME", "Joe");
        state
            .apply(&Change::AddRow {
                table: "C_BPARTNER".into(),
                row,
                on_create: BTreeMap::new(),
            })
            .unwrap();
        state
            .apply(&Change::ColumnDataChange {
                table: "C_BPARTNER".into(),
                key: Row::new().with("C_BPARTNER_ID", "100"),
                column: "NAME".into(),
                old: "Joe".into(),
                new: "Joan".into(),
            })
            .unwrap();

        let table = &state.model().tables[0];
        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.foreign_keys.len(), 1);
        assert_eq!(table.rows.as_ref().unwrap()[0].text("NAME"), Some("Joan"));
    }
}
