//! SQL rendering for planned steps.
//!
//! One [`SqlBuilder`] serves every platform: differences are selected by the
//! flags of its [`PlatformInfo`]. DDL lives in [`ddl`], row statements in
//! [`dml`].

mod ddl;
mod dml;

use crate::change::Change;
use crate::error::{Result, SyncError};
use crate::planner::{Batch, ConstraintGuard, MigrationPlan, Step};
use crate::platform::{ConstraintToggle, PlatformInfo};

pub use ddl::{identity_sequence_name, identity_trigger_name, rebuild_table_name};
pub use dml::literal;

/// Renders steps and guards as SQL statements.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    platform: PlatformInfo,
}

impl SqlBuilder {
    /// Creates a builder for the given platform.
    #[must_use]
    pub const fn new(platform: PlatformInfo) -> Self {
        Self { platform }
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    fn quote(&self, name: &str) -> Result<String> {
        self.platform.quote(name)
    }

    fn unsupported(&self, change: &Change, reason: &str) -> SyncError {
        SyncError::UnsupportedChange {
            change: change.description(),
            platform: self.platform.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Renders one step. A step may need several statements.
    pub fn render(&self, step: &Step) -> Result<Vec<String>> {
        match step {
            Step::PreScript(script) => Ok(vec![script.sql.trim().to_string()]),
            Step::Change(change) => self.render_change(change),
            Step::Backfill(backfill) => Ok(vec![self.backfill(backfill)?]),
            Step::Rebuild(rebuild) => self.rebuild(rebuild),
        }
    }

    /// Renders one change.
    pub fn render_change(&self, change: &Change) -> Result<Vec<String>> {
        match change {
            Change::AddTable { table } => self.create_table(table, true),
            Change::RemoveTable { table } => self.drop_table(table),
            Change::AddColumn { table, column, .. } => self.add_column(table, column),
            Change::RemoveColumn { table, column } => Ok(vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote(table)?,
                self.quote(column)?
            )]),
            Change::ColumnDefinitionChange {
                table,
                old,
                new,
                delta,
            } => self.alter_column(change, table, old, new, delta),
            Change::ColumnOrderChange { .. } => {
                Err(self.unsupported(change, "column order changes require a table rebuild"))
            }
            Change::PrimaryKeyChange { table, old, new } => {
                let mut statements = Vec::new();
                if let Some(old) = old {
                    statements.push(self.drop_constraint(table, &old.name)?);
                }
                if let Some(new) = new {
                    statements.push(self.add_primary_key(table, new)?);
                }
                Ok(statements)
            }
            Change::AddForeignKey { table, foreign_key } => {
                Ok(vec![self.add_foreign_key(change, table, foreign_key)?])
            }
            Change::RemoveForeignKey { table, foreign_key } => {
                Ok(vec![self.drop_constraint(table, &foreign_key.name)?])
            }
            Change::AddIndex { table, index } => Ok(vec![self.create_index(change, table, index)?]),
            Change::RemoveIndex { index, .. } => {
                Ok(vec![format!("DROP INDEX {}", self.quote(&index.name)?)])
            }
            Change::AddCheck { table, check } => Ok(vec![self.add_check(table, check)?]),
            Change::RemoveCheck { table, check } => {
                Ok(vec![self.drop_constraint(table, &check.name)?])
            }
            Change::AddTrigger { trigger } => self.create_trigger(trigger),
            Change::RemoveTrigger { trigger } => self.drop_trigger(trigger),
            Change::RecreateTriggers { triggers, .. } => {
                let mut statements = Vec::new();
                for trigger in triggers {
                    statements.extend(self.drop_trigger(trigger)?);
                }
                for trigger in triggers {
                    statements.extend(self.create_trigger(trigger)?);
                }
                Ok(statements)
            }
            Change::AddSequence { sequence } => Ok(vec![format!(
                "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
                self.quote(&sequence.name)?,
                sequence.start,
                sequence.increment
            )]),
            Change::RemoveSequence { sequence } => {
                Ok(vec![format!("DROP SEQUENCE {}", self.quote(&sequence.name)?)])
            }
            Change::AlterSequence { new, .. } => Ok(vec![format!(
                "ALTER SEQUENCE {} INCREMENT BY {}",
                self.quote(&new.name)?,
                new.increment
            )]),
            Change::AddView { view } => Ok(vec![format!(
                "CREATE OR REPLACE VIEW {} AS {}",
                self.quote(&view.name)?,
                view.statement.trim().trim_end_matches(';')
            )]),
            Change::RemoveView { view } => {
                Ok(vec![format!("DROP VIEW {}", self.quote(&view.name)?)])
            }
            Change::AddFunction { function } => Ok(vec![self.create_function(function)?]),
            Change::RemoveFunction { function } => Ok(vec![self.drop_function(function)?]),
            Change::AddRow {
                table,
                row,
                on_create,
            } => Ok(vec![self.insert(table, row, on_create)?]),
            Change::RemoveRow { table, key } => Ok(vec![self.delete(table, key)?]),
            Change::ColumnDataChange {
                table,
                key,
                column,
                new,
                ..
            } => Ok(vec![self.update(table, key, column, new)?]),
        }
    }

    /// Statements that switch off the guarded constraints and triggers.
    pub fn disable_guard(&self, guard: &ConstraintGuard) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for trigger in &guard.triggers {
            statements.push(self.toggle_trigger(&trigger.table, &trigger.name, false)?);
        }
        for (table, fk) in &guard.foreign_keys {
            statements.push(match self.platform.constraint_toggle {
                ConstraintToggle::DisableEnable => self.toggle_constraint(table, &fk.name, false)?,
                ConstraintToggle::DropRecreate => self.drop_constraint(table, &fk.name)?,
            });
        }
        for (table, check) in &guard.checks {
            statements.push(match self.platform.constraint_toggle {
                ConstraintToggle::DisableEnable => {
                    self.toggle_constraint(table, &check.name, false)?
                }
                ConstraintToggle::DropRecreate => self.drop_constraint(table, &check.name)?,
            });
        }
        Ok(statements)
    }

    /// Statements that restore what [`Self::disable_guard`] switched off,
    /// as `(table, object, statement)`.
    pub fn enable_guard(&self, guard: &ConstraintGuard) -> Result<Vec<(String, String, String)>> {
        let mut statements = Vec::new();
        for (table, check) in &guard.checks {
            let sql = match self.platform.constraint_toggle {
                ConstraintToggle::DisableEnable => self.toggle_constraint(table, &check.name, true)?,
                ConstraintToggle::DropRecreate => self.add_check(table, check)?,
            };
            statements.push((table.clone(), check.name.clone(), sql));
        }
        for (table, fk) in &guard.foreign_keys {
            let sql = match self.platform.constraint_toggle {
                ConstraintToggle::DisableEnable => self.toggle_constraint(table, &fk.name, true)?,
                ConstraintToggle::DropRecreate => {
                    let change = Change::add_foreign_key(table.as_str(), fk.clone());
                    self.add_foreign_key(&change, table, fk)?
                }
            };
            statements.push((table.clone(), fk.name.clone(), sql));
        }
        for trigger in &guard.triggers {
            let sql = self.toggle_trigger(&trigger.table, &trigger.name, true)?;
            statements.push((trigger.table.clone(), trigger.name.clone(), sql));
        }
        Ok(statements)
    }

    fn toggle_constraint(&self, table: &str, name: &str, enable: bool) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} {} CONSTRAINT {}",
            self.quote(table)?,
            if enable { "ENABLE" } else { "DISABLE" },
            self.quote(name)?
        ))
    }

    fn toggle_trigger(&self, table: &str, name: &str, enable: bool) -> Result<String> {
        let action = if enable { "ENABLE" } else { "DISABLE" };
        if self.platform.is_oracle() {
            Ok(format!("ALTER TRIGGER {} {action}", self.quote(name)?))
        } else {
            Ok(format!(
                "ALTER TABLE {} {action} TRIGGER {}",
                self.quote(table)?,
                self.quote(name)?
            ))
        }
    }

    /// Adds the statement terminator. Oracle PL/SQL blocks end with `/`.
    #[must_use]
    pub fn terminate(&self, statement: &str) -> String {
        if self.platform.is_oracle() && is_plsql(statement) {
            format!("{}\n/", statement.trim_end())
        } else {
            format!("{};", statement.trim_end().trim_end_matches(';'))
        }
    }

    /// Renders a whole plan as a script.
    ///
    /// When `continue_on_error` is set, steps that cannot be rendered become
    /// `-- skipped` comments; otherwise the first render error is returned.
    pub fn render_script(&self, plan: &MigrationPlan, continue_on_error: bool) -> Result<String> {
        let mut out = Vec::new();
        for batch in &plan.batches {
            self.render_batch(batch, continue_on_error, &mut out)?;
        }
        Ok(out.join("\n"))
    }

    fn render_batch(&self, batch: &Batch, continue_on_error: bool, out: &mut Vec<String>) -> Result<()> {
        out.push(format!("-- {}", batch.phase));
        for statement in self.disable_guard(&batch.guard)? {
            out.push(self.terminate(&statement));
        }
        for step in batch.steps() {
            match self.render(step) {
                Ok(statements) => out.extend(statements.iter().map(|s| self.terminate(s))),
                Err(e) if continue_on_error => {
                    out.push(format!("-- skipped: {}: {e}", step.description()));
                }
                Err(e) => return Err(e),
            }
        }
        for (_, _, statement) in self.enable_guard(&batch.guard)? {
            out.push(self.terminate(&statement));
        }
        out.push(String::new());
        Ok(())
    }
}

/// Returns whether the statement is a PL/SQL block.
fn is_plsql(statement: &str) -> bool {
    let upper = statement.trim_start().to_uppercase();
    ["CREATE OR REPLACE TRIGGER", "CREATE OR REPLACE FUNCTION", "CREATE OR REPLACE PROCEDURE", "BEGIN", "DECLARE"]
        .iter()
        .any(|p| upper.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Check, Column, ForeignKey, Index, Trigger, TriggerEvent};
    use crate::planner::Phase;
    use crate::types::TypeCode;

    fn guard() -> ConstraintGuard {
        ConstraintGuard {
            foreign_keys: vec![(
                "C_ORDER".into(),
                ForeignKey::new("C_ORDER_BPARTNER", "C_BPARTNER")
                    .reference("C_BPARTNER_ID", "C_BPARTNER_ID"),
            )],
            triggers: vec![Trigger::new(
                "C_ORDER_TRG",
                "C_ORDER",
                &[TriggerEvent::Insert],
                "BEGIN NULL; END;",
            )],
            checks: vec![("C_ORDER".into(), Check::new("C_ORDER_CHK", "GRANDTOTAL >= 0"))],
        }
    }

    #[test]
    fn test_oracle_guard_toggles() {
        let builder = SqlBuilder::new(PlatformInfo::oracle());
        let disable = builder.disable_guard(&guard()).unwrap();
        assert_eq!(
            disable,
            vec![
                "ALTER TRIGGER C_ORDER_TRG DISABLE",
                "ALTER TABLE C_ORDER DISABLE CONSTRAINT C_ORDER_BPARTNER",
                "ALTER TABLE C_ORDER DISABLE CONSTRAINT C_ORDER_CHK",
            ]
        );
        let enable = builder.enable_guard(&guard()).unwrap();
        assert_eq!(enable[0].2, "ALTER TABLE C_ORDER ENABLE CONSTRAINT C_ORDER_CHK");
        assert_eq!(enable[2].2, "ALTER TRIGGER C_ORDER_TRG ENABLE");
    }

    #[test]
    fn test_postgres_guard_drops_and_recreates() {
        let builder = SqlBuilder::new(PlatformInfo::postgresql());
        let disable = builder.disable_guard(&guard()).unwrap();
        assert_eq!(disable[0], "ALTER TABLE C_ORDER DISABLE TRIGGER C_ORDER_TRG");
        assert_eq!(disable[1], "ALTER TABLE C_ORDER DROP CONSTRAINT C_ORDER_BPARTNER");

        let enable = builder.enable_guard(&guard()).unwrap();
        assert_eq!(
            enable[1].2,
            "ALTER TABLE C_ORDER ADD CONSTRAINT C_ORDER_BPARTNER FOREIGN KEY (C_BPARTNER_ID) REFERENCES C_BPARTNER (C_BPARTNER_ID)"
        );
    }

    #[test]
    fn test_terminate() {
        let oracle = SqlBuilder::new(PlatformInfo::oracle());
        assert_eq!(oracle.terminate("DROP TABLE T"), "DROP TABLE T;");
        assert!(oracle
            .terminate("CREATE OR REPLACE TRIGGER X BEFORE INSERT ON T BEGIN NULL; END;")
            .ends_with("END;\n/"));
        let pg = SqlBuilder::new(PlatformInfo::postgresql());
        assert_eq!(pg.terminate("SELECT 1;"), "SELECT 1;");
    }

    #[test]
    fn test_script_skips_unsupported_when_continuing() {
        let change = Change::add_index(
            "C_ORDER",
            Index::new("C_ORDER_OPEN", &["DOCSTATUS"]).condition("DOCSTATUS = 'DR'"),
        );
        let plan = MigrationPlan {
            batches: vec![Batch {
                phase: Phase::AddConstraints,
                units: vec![crate::planner::Unit {
                    table: Some("C_ORDER".into()),
                    steps: vec![
                        Step::Change(change),
                        Step::Change(Change::add_column(
                            "C_ORDER",
                            Column::new("NOTE", TypeCode::Varchar).size(255),
                            3,
                            None,
                        )),
                    ],
                }],
                destructive: false,
                parallel_eligible: false,
                guard: ConstraintGuard::default(),
            }],
        };
        let builder = SqlBuilder::new(PlatformInfo::oracle());
        let script = builder.render_script(&plan, true).unwrap();
        assert!(script.contains("-- skipped: "));
        assert!(script.contains("ALTER TABLE C_ORDER ADD (NOTE VARCHAR2(255));"));

        let err = builder.render_script(&plan, false).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedChange { .. }));
    }

    #[test]
    fn test_column_order_change_needs_rebuild() {
        let builder = SqlBuilder::new(PlatformInfo::postgresql());
        let change = Change::ColumnOrderChange {
            table: "T".into(),
            old_order: vec!["A".into(), "B".into()],
            new_order: vec!["B".into(), "A".into()],
        };
        assert!(builder.render_change(&change).is_err());
    }
}
