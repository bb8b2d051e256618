//! DDL statements.

use super::SqlBuilder;
use crate::change::{Change, ColumnDelta};
use crate::error::Result;
use crate::model::{
    Check, Column, ForeignKey, ForeignKeyAction, Function, Index, PrimaryKey, Table, Trigger,
    TriggerTiming,
};
use crate::planner::Rebuild;
use crate::platform::IdentityStrategy;

/// Name of the sequence feeding a table's auto-increment column.
#[must_use]
pub fn identity_sequence_name(table: &str) -> String {
    format!("{table}_SEQ")
}

/// Name of the trigger filling a table's auto-increment column.
#[must_use]
pub fn identity_trigger_name(table: &str) -> String {
    format!("{table}_AI")
}

/// Name of the temporary copy used while rebuilding a table.
#[must_use]
pub fn rebuild_table_name(table: &str) -> String {
    format!("TMP_{table}")
}

fn strip_size(native: &str) -> &str {
    native.split('(').next().unwrap_or(native).trim()
}

impl SqlBuilder {
    fn column_list(&self, columns: &[String]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// Column definition as used in CREATE TABLE and ADD COLUMN.
    pub(crate) fn column_definition(&self, column: &Column) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name)?,
            self.platform.native_type(column)
        );
        let identity = column.auto_increment
            && self.platform.identity == IdentityStrategy::Identity;
        if identity {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        } else if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default.trim());
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        Ok(sql)
    }

    pub(crate) fn add_primary_key(&self, table: &str, pk: &PrimaryKey) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            self.quote(table)?,
            self.quote(&pk.name)?,
            self.column_list(&pk.columns)?
        ))
    }

    pub(crate) fn add_check(&self, table: &str, check: &Check) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
            self.quote(table)?,
            self.quote(&check.name)?,
            check.condition.trim()
        ))
    }

    pub(crate) fn drop_constraint(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table)?,
            self.quote(name)?
        ))
    }

    /// CREATE TABLE plus whatever the platform declares separately: primary
    /// key and checks on Oracle, and the identity sequence and trigger.
    ///
    /// Indexes and foreign keys are not included.
    pub(crate) fn create_table(&self, table: &Table, with_sequence: bool) -> Result<Vec<String>> {
        let mut elements = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;
        let mut after = Vec::new();

        if let Some(pk) = &table.primary_key {
            if self.platform.embedded_primary_keys {
                elements.push(format!(
                    "CONSTRAINT {} PRIMARY KEY ({})",
                    self.quote(&pk.name)?,
                    self.column_list(&pk.columns)?
                ));
            } else {
                after.push(self.add_primary_key(&table.name, pk)?);
            }
        }
        for check in &table.checks {
            if self.platform.embedded_checks {
                elements.push(format!(
                    "CONSTRAINT {} CHECK ({})",
                    self.quote(&check.name)?,
                    check.condition.trim()
                ));
            } else {
                after.push(self.add_check(&table.name, check)?);
            }
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote(&table.name)?,
            elements.join(",\n    ")
        )];
        statements.extend(after);
        statements.extend(self.identity_objects(table, with_sequence)?);
        Ok(statements)
    }

    /// Sequence and trigger emulating an identity column on Oracle.
    fn identity_objects(&self, table: &Table, with_sequence: bool) -> Result<Vec<String>> {
        if self.platform.identity != IdentityStrategy::Sequence {
            return Ok(Vec::new());
        }
        let Some(column) = table.columns.iter().find(|c| c.auto_increment) else {
            return Ok(Vec::new());
        };
        let sequence = self.quote(&identity_sequence_name(&table.name))?;
        let trigger = self.quote(&identity_trigger_name(&table.name))?;
        let col = self.quote(&column.name)?;

        let mut statements = Vec::new();
        if with_sequence {
            statements.push(format!("CREATE SEQUENCE {sequence} START WITH 1 INCREMENT BY 1"));
        }
        statements.push(format!(
            "CREATE OR REPLACE TRIGGER {trigger} BEFORE INSERT ON {} FOR EACH ROW\n\
             BEGIN\n  \
             IF :new.{col} IS NULL THEN\n    \
             SELECT {sequence}.NEXTVAL INTO :new.{col} FROM DUAL;\n  \
             END IF;\n\
             END;",
            self.quote(&table.name)?
        ));
        Ok(statements)
    }

    pub(crate) fn drop_table(&self, table: &Table) -> Result<Vec<String>> {
        let mut statements = vec![format!("DROP TABLE {}", self.quote(&table.name)?)];
        if self.platform.identity == IdentityStrategy::Sequence
            && table.columns.iter().any(|c| c.auto_increment)
        {
            statements.push(format!(
                "DROP SEQUENCE {}",
                self.quote(&identity_sequence_name(&table.name))?
            ));
        }
        Ok(statements)
    }

    pub(crate) fn add_column(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let definition = self.column_definition(column)?;
        let add = if self.platform.is_oracle() {
            format!("ALTER TABLE {} ADD ({definition})", self.quote(table)?)
        } else {
            format!("ALTER TABLE {} ADD COLUMN {definition}", self.quote(table)?)
        };
        if !column.auto_increment {
            return Ok(vec![add]);
        }
        let owner = Table::new(table).column(column.clone());
        let mut statements = vec![add];
        statements.extend(self.identity_objects(&owner, true)?);
        Ok(statements)
    }

    pub(crate) fn alter_column(
        &self,
        change: &Change,
        table: &str,
        old: &Column,
        new: &Column,
        delta: &ColumnDelta,
    ) -> Result<Vec<String>> {
        let t = self.quote(table)?;
        let c = self.quote(&new.name)?;
        let oracle = self.platform.is_oracle();
        let mut statements = Vec::new();

        if delta.auto_increment_changed {
            if oracle {
                return Err(self.unsupported(change, "auto-increment cannot be toggled"));
            }
            statements.push(if new.auto_increment {
                format!("ALTER TABLE {t} ALTER COLUMN {c} ADD GENERATED BY DEFAULT AS IDENTITY")
            } else {
                format!("ALTER TABLE {t} ALTER COLUMN {c} DROP IDENTITY IF EXISTS")
            });
        }

        if delta.type_changed {
            let native = self.platform.native_type(new);
            statements.push(if oracle {
                format!("ALTER TABLE {t} MODIFY ({c} {native})")
            } else {
                format!("ALTER TABLE {t} ALTER COLUMN {c} TYPE {native}")
            });
        }

        if delta.default_changed {
            let default = new.default.as_deref().map(str::trim);
            statements.push(match (oracle, default) {
                (true, Some(expr)) => format!("ALTER TABLE {t} MODIFY ({c} DEFAULT {expr})"),
                (true, None) => format!("ALTER TABLE {t} MODIFY ({c} DEFAULT NULL)"),
                (false, Some(expr)) => format!("ALTER TABLE {t} ALTER COLUMN {c} SET DEFAULT {expr}"),
                (false, None) => format!("ALTER TABLE {t} ALTER COLUMN {c} DROP DEFAULT"),
            });
        }

        if delta.nullability_changed && old.nullable != new.nullable {
            statements.push(match (oracle, new.nullable) {
                (true, true) => format!("ALTER TABLE {t} MODIFY ({c} NULL)"),
                (true, false) => format!("ALTER TABLE {t} MODIFY ({c} NOT NULL)"),
                (false, true) => format!("ALTER TABLE {t} ALTER COLUMN {c} DROP NOT NULL"),
                (false, false) => format!("ALTER TABLE {t} ALTER COLUMN {c} SET NOT NULL"),
            });
        }
        Ok(statements)
    }

    pub(crate) fn add_foreign_key(
        &self,
        change: &Change,
        table: &str,
        fk: &ForeignKey,
    ) -> Result<String> {
        let oracle = self.platform.is_oracle();
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(table)?,
            self.quote(&fk.name)?,
            self.column_list(&fk.local_columns().map(String::from).collect::<Vec<_>>())?,
            self.quote(&fk.foreign_table)?,
            self.column_list(&fk.foreign_columns().map(String::from).collect::<Vec<_>>())?
        );
        match fk.on_delete {
            ForeignKeyAction::NoAction => {}
            ForeignKeyAction::Restrict if oracle => {}
            ForeignKeyAction::SetDefault if oracle => {
                return Err(self.unsupported(change, "ON DELETE SET DEFAULT is not available"));
            }
            action => {
                sql.push_str(" ON DELETE ");
                sql.push_str(action.to_sql());
            }
        }
        match fk.on_update {
            ForeignKeyAction::NoAction => {}
            ForeignKeyAction::Restrict if oracle => {}
            _ if oracle => {
                return Err(self.unsupported(change, "ON UPDATE actions are not available"));
            }
            action => {
                sql.push_str(" ON UPDATE ");
                sql.push_str(action.to_sql());
            }
        }
        Ok(sql)
    }

    pub(crate) fn create_index(&self, change: &Change, table: &str, index: &Index) -> Result<String> {
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote(&index.name)?,
            self.quote(table)?,
            self.column_list(&index.columns)?
        );
        if let Some(condition) = &index.condition {
            if !self.platform.supports_partial_indexes {
                return Err(self.unsupported(change, "partial indexes are not available"));
            }
            sql.push_str(" WHERE ");
            sql.push_str(condition.trim());
        }
        Ok(sql)
    }

    fn trigger_header(&self, trigger: &Trigger) -> Result<String> {
        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
        };
        let events = trigger
            .events
            .iter()
            .map(|e| e.to_sql())
            .collect::<Vec<_>>()
            .join(" OR ");
        Ok(format!(
            "{timing} {events} ON {}{}",
            self.quote(&trigger.table)?,
            if trigger.for_each_row { " FOR EACH ROW" } else { " FOR EACH STATEMENT" }
        ))
    }

    pub(crate) fn create_trigger(&self, trigger: &Trigger) -> Result<Vec<String>> {
        let name = self.quote(&trigger.name)?;
        let header = self.trigger_header(trigger)?;
        let body = trigger.body.trim();
        if self.platform.is_oracle() {
            let header = header.replace(" FOR EACH STATEMENT", "");
            return Ok(vec![format!("CREATE OR REPLACE TRIGGER {name} {header}\n{body}")]);
        }
        Ok(vec![
            format!(
                "CREATE OR REPLACE FUNCTION {name}() RETURNS trigger AS $BODY$\n{body}\n$BODY$ LANGUAGE plpgsql"
            ),
            format!("CREATE TRIGGER {name} {header} EXECUTE PROCEDURE {name}()"),
        ])
    }

    pub(crate) fn drop_trigger(&self, trigger: &Trigger) -> Result<Vec<String>> {
        let name = self.quote(&trigger.name)?;
        if self.platform.is_oracle() {
            return Ok(vec![format!("DROP TRIGGER {name}")]);
        }
        Ok(vec![
            format!("DROP TRIGGER {name} ON {}", self.quote(&trigger.table)?),
            format!("DROP FUNCTION {name}()"),
        ])
    }

    fn parameter_list(&self, function: &Function) -> Result<String> {
        let params = function
            .parameters
            .iter()
            .map(|p| {
                let native = self.platform.native_type_of(&p.type_code, None, None);
                Ok(format!("{} {}", self.quote(&p.name)?, strip_size(&native)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(params.join(", "))
    }

    pub(crate) fn create_function(&self, function: &Function) -> Result<String> {
        let name = self.quote(&function.name)?;
        let params = self.parameter_list(function)?;
        let body = function.body.trim();
        let returns = function
            .returns
            .as_ref()
            .map(|t| self.platform.native_type_of(t, None, None));

        if self.platform.is_oracle() {
            let signature = if params.is_empty() {
                name
            } else {
                format!("{name}({params})")
            };
            return Ok(match returns {
                Some(t) => format!(
                    "CREATE OR REPLACE FUNCTION {signature} RETURN {} AS\n{body}",
                    strip_size(&t)
                ),
                None => format!("CREATE OR REPLACE PROCEDURE {signature} AS\n{body}"),
            });
        }
        Ok(format!(
            "CREATE OR REPLACE FUNCTION {name}({params}) RETURNS {} AS $BODY$\n{body}\n$BODY$ LANGUAGE plpgsql",
            returns.as_deref().map_or("void", strip_size)
        ))
    }

    pub(crate) fn drop_function(&self, function: &Function) -> Result<String> {
        let name = self.quote(&function.name)?;
        if self.platform.is_oracle() {
            let kind = if function.returns.is_some() { "FUNCTION" } else { "PROCEDURE" };
            return Ok(format!("DROP {kind} {name}"));
        }
        let types = function
            .parameters
            .iter()
            .map(|p| strip_size(&self.platform.native_type_of(&p.type_code, None, None)).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("DROP FUNCTION {name}({types})"))
    }

    /// Copies a table out, recreates it with the new structure and copies the
    /// rows back in primary key order.
    pub(crate) fn rebuild(&self, rebuild: &Rebuild) -> Result<Vec<String>> {
        let old = &rebuild.old;
        let new = &rebuild.new;
        self.check_generated_names(new)?;
        let table = self.quote(&new.name)?;
        let tmp = self.quote(&rebuild_table_name(&new.name))?;

        let mut statements = vec![
            format!("CREATE TABLE {tmp} AS SELECT * FROM {}", self.quote(&old.name)?),
            format!("DROP TABLE {}", self.quote(&old.name)?),
        ];
        let had_sequence = old.columns.iter().any(|c| c.auto_increment);
        statements.extend(self.create_table(new, !had_sequence)?);

        let mut targets = Vec::new();
        let mut sources = Vec::new();
        for column in &new.columns {
            let source = if old.get_column(&column.name).is_some() {
                self.quote(&column.name)?
            } else if let Some(value) = rebuild.initial_values.get(&column.name) {
                match &rebuild.predicate {
                    Some(predicate) => {
                        format!("CASE WHEN ({predicate}) THEN {value} ELSE NULL END")
                    }
                    None => value.clone(),
                }
            } else {
                continue;
            };
            targets.push(self.quote(&column.name)?);
            sources.push(source);
        }
        let mut copy = format!(
            "INSERT INTO {table} ({}) SELECT {} FROM {tmp}",
            targets.join(", "),
            sources.join(", ")
        );
        if let Some(pk) = &old.primary_key {
            copy.push_str(" ORDER BY ");
            copy.push_str(&self.column_list(&pk.columns)?);
        }
        statements.push(copy);
        statements.push(format!("DROP TABLE {tmp}"));

        for index in &new.indexes {
            let change = Change::add_index(new.name.as_str(), index.clone());
            statements.push(self.create_index(&change, &new.name, index)?);
        }

        if self.platform.identity == IdentityStrategy::Identity {
            for column in new.columns.iter().filter(|c| c.auto_increment) {
                if old.get_column(&column.name).is_none() {
                    continue;
                }
                let c = self.quote(&column.name)?;
                statements.push(format!(
                    "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({c}), 0) + 1, false) FROM {table}",
                    self.platform.catalog_identifier(&new.name),
                    self.platform.catalog_identifier(&column.name)
                ));
            }
        }
        Ok(statements)
    }

    /// Fails with [`crate::error::SyncError::IdentifierTooLong`] when any generated name
    /// for `table` would overflow.
    pub fn check_generated_names(&self, table: &Table) -> Result<()> {
        self.platform.check_identifier(&rebuild_table_name(&table.name))?;
        if self.platform.identity == IdentityStrategy::Sequence
            && table.columns.iter().any(|c| c.auto_increment)
        {
            self.platform
                .check_identifier(&identity_sequence_name(&table.name))?;
            self.platform
                .check_identifier(&identity_trigger_name(&table.name))?;
        }
        Ok(())
    }
}
