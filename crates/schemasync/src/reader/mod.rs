//! Reads a live database into a [`Database`] model.
//!
//! Each platform supplies its catalog queries through [`CatalogDialect`].
//! Every query aliases its result columns to the same names, so assembling
//! the model is shared across platforms.

mod oracle;
mod postgres;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use schemasync_core::dataset::{table_predicate, DatasetFilter};
use schemasync_core::model::{
    name_eq, name_key, Check, Column, Database, ForeignKey, ForeignKeyAction, Function, Index, Parameter,
    PrimaryKey, Reference, Sequence, Table, Trigger, TriggerEvent, TriggerTiming, View,
};
use schemasync_core::platform::{IdentityStrategy, PlatformInfo, PlatformKind};
use schemasync_core::sql::{identity_sequence_name, identity_trigger_name, literal};
use schemasync_core::types::TypeCode;
use schemasync_core::value::{Row, Value};
use schemasync_core::SyncError;
use tracing::{debug, info};

use crate::connection::SqlConnection;
use crate::error::{DbError, Result};

pub use oracle::OracleCatalog;
pub use postgres::PostgresCatalog;

/// Catalog query text and platform quirks of one database family.
///
/// `schema` arguments are SQL expressions: a quoted literal or
/// [`CatalogDialect::current_schema`].
pub trait CatalogDialect: Send + Sync {
    /// Expression for the connection's current schema.
    fn current_schema(&self) -> &'static str;

    /// `TABLE_NAME`, `TABLE_TYPE` (`TABLE` or `VIEW`).
    fn tables_query(&self, catalog: Option<&str>, schema: &str) -> String;

    /// `TABLE_NAME`, `COLUMN_NAME`, `DATA_TYPE`, `CHAR_LENGTH`,
    /// `NUM_PRECISION`, `NUM_SCALE`, `NULLABLE`, `COLUMN_DEFAULT`,
    /// `IS_IDENTITY`, ordered by table and position.
    fn columns_query(&self, schema: &str) -> String;

    /// `TABLE_NAME`, `CONSTRAINT_NAME`, `COLUMN_NAME` in key order.
    fn primary_keys_query(&self, schema: &str) -> String;

    /// `TABLE_NAME`, `CONSTRAINT_NAME`, `FOREIGN_TABLE`, `LOCAL_COLUMN`,
    /// `FOREIGN_COLUMN`, `DELETE_RULE`, `UPDATE_RULE` in key order.
    fn foreign_keys_query(&self, schema: &str) -> String;

    /// `TABLE_NAME`, `INDEX_NAME`, `COLUMN_NAME`, `IS_UNIQUE`, `CONDITION`,
    /// `IS_SYSTEM` in column order.
    fn indexes_query(&self, schema: &str) -> String;

    /// `TABLE_NAME`, `CONSTRAINT_NAME`, `CONDITION`.
    fn checks_query(&self, schema: &str) -> String;

    /// `TRIGGER_NAME`, `TABLE_NAME`, `TIMING`, `EVENTS`, `FOR_EACH_ROW`,
    /// `BODY`.
    fn triggers_query(&self, schema: &str) -> String;

    /// `SEQUENCE_NAME`, `START_VALUE`, `INCREMENT_BY`.
    fn sequences_query(&self, schema: &str) -> String;

    /// `VIEW_NAME`, `STATEMENT`.
    fn views_query(&self, schema: &str) -> String;

    /// `FUNCTION_NAME`, `RETURN_TYPE`, `ARGUMENTS` and, unless
    /// [`CatalogDialect::source_query`] is provided, `BODY`.
    fn functions_query(&self, schema: &str) -> String;

    /// `NAME`, `TEXT` source lines of functions, in line order.
    fn source_query(&self, _schema: &str) -> Option<String> {
        None
    }

    /// Model form of a check condition, or `None` for checks the database
    /// creates on its own.
    fn check_condition(&self, condition: &str) -> Option<String>;

    /// Function body from its stored source.
    fn function_body(&self, source: &str) -> String {
        source.trim().to_string()
    }
}

/// Captures the column an identity trigger assigns from its sequence.
static IDENTITY_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)NEXTVAL\s+INTO\s+:new\."?([A-Za-z0-9_$#]+)"?"#).expect("valid regex")
});

/// Reads models and managed rows from a live database.
pub struct ModelReader {
    platform: PlatformInfo,
    dialect: Box<dyn CatalogDialect>,
}

impl ModelReader {
    /// Creates a reader using the platform's catalog queries.
    #[must_use]
    pub fn new(platform: PlatformInfo) -> Self {
        let dialect: Box<dyn CatalogDialect> = match platform.kind {
            PlatformKind::Oracle => Box::new(OracleCatalog),
            PlatformKind::PostgreSql => Box::new(PostgresCatalog),
        };
        Self { platform, dialect }
    }

    /// Creates a reader with custom catalog queries.
    #[must_use]
    pub fn with_dialect(platform: PlatformInfo, dialect: Box<dyn CatalogDialect>) -> Self {
        Self { platform, dialect }
    }

    /// Returns the platform.
    #[must_use]
    pub const fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Reads the structure of `schema` (the current schema when `None`).
    ///
    /// `table_types` selects `TABLE` and/or `VIEW`. Sequences and
    /// functions are always read.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ModelRead`] when a catalog query fails or a
    /// column type has no logical counterpart.
    pub async fn read_model<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        catalog: Option<&str>,
        schema: Option<&str>,
        table_types: &[String],
    ) -> Result<Database> {
        let schema_sql = schema.map_or_else(
            || self.dialect.current_schema().to_string(),
            |s| self.text_literal(&self.platform.catalog_identifier(s)),
        );
        let catalog_sql = catalog.map(|c| self.text_literal(c));
        let wants = |kind: &str| table_types.iter().any(|t| t.eq_ignore_ascii_case(kind));

        info!(
            platform = %self.platform.name,
            schema = schema.unwrap_or("<current>"),
            "Reading database model"
        );

        let mut tables = BTreeMap::new();
        if wants("TABLE") {
            let sql = self.dialect.tables_query(catalog_sql.as_deref(), &schema_sql);
            for row in self.fetch(conn, "tables", &sql).await? {
                if row.text("TABLE_TYPE") == Some("TABLE") {
                    let name = self.name(&row, "TABLE_NAME")?;
                    tables.insert(name_key(&name), Table::new(name));
                }
            }
            self.read_columns(conn, &schema_sql, &mut tables).await?;
            self.read_primary_keys(conn, &schema_sql, &mut tables).await?;
            self.read_foreign_keys(conn, &schema_sql, &mut tables).await?;
            self.read_indexes(conn, &schema_sql, &mut tables).await?;
            self.read_checks(conn, &schema_sql, &mut tables).await?;
        }

        let mut database = Database::new(schema.unwrap_or("live"));
        database.tables = tables.into_values().collect();
        database.triggers = self.read_triggers(conn, &schema_sql, &database).await?;
        database.sequences = self.read_sequences(conn, &schema_sql).await?;
        database.functions = self.read_functions(conn, &schema_sql).await?;
        if wants("VIEW") {
            database.views = self.read_views(conn, &schema_sql).await?;
        }
        self.detect_identity_triggers(&mut database);

        info!(
            tables = database.tables.len(),
            views = database.views.len(),
            sequences = database.sequences.len(),
            triggers = database.triggers.len(),
            functions = database.functions.len(),
            "Read database model"
        );
        Ok(database)
    }

    /// Reads the managed rows of `table`, restricted by its row filter and
    /// the dataset filter, ordered by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ModelRead`] when the query fails.
    pub async fn read_rows<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        table: &Table,
        filter: &dyn DatasetFilter,
    ) -> Result<Vec<Row>> {
        let columns = table
            .columns
            .iter()
            .map(|c| self.platform.quote(&c.name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.platform.quote(&table.name)?
        );
        if let Some(predicate) = table_predicate(table, filter) {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        let key = table
            .key_columns()
            .iter()
            .map(|c| self.platform.quote(c))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if !key.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&key.join(", "));
        }

        let rows = self.fetch(conn, &format!("rows of {}", table.name), &sql).await?;
        debug!(table = %table.name, count = rows.len(), "Read rows");
        Ok(rows)
    }

    // ---- Tables ----

    async fn read_columns<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> Result<()> {
        let sql = self.dialect.columns_query(schema);
        for row in self.fetch(conn, "columns", &sql).await? {
            let table_name = self.name(&row, "TABLE_NAME")?;
            if let Some(table) = tables.get_mut(&name_key(&table_name)) {
                table.columns.push(self.column(&row)?);
            }
        }
        Ok(())
    }

    fn column(&self, row: &Row) -> Result<Column> {
        let name = self.name(row, "COLUMN_NAME")?;
        let native = required(row, "DATA_TYPE")?;
        let logical = self.platform.logical_type(
            native,
            unsigned(row, "CHAR_LENGTH"),
            unsigned(row, "NUM_PRECISION"),
            unsigned(row, "NUM_SCALE"),
        )?;

        let mut column = Column::new(name, logical.code);
        column.size = logical.size;
        column.scale = logical.scale;
        column.nullable = row.bool("NULLABLE").unwrap_or(true);
        column.auto_increment = row.bool("IS_IDENTITY").unwrap_or(false);
        match row.text("COLUMN_DEFAULT").map(str::trim) {
            // serial columns
            Some(d) if d.to_ascii_lowercase().starts_with("nextval(") => {
                column.auto_increment = true;
            }
            Some(d) if !d.is_empty() => column.default = Some(d.to_string()),
            _ => {}
        }
        Ok(column)
    }

    async fn read_primary_keys<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> Result<()> {
        let sql = self.dialect.primary_keys_query(schema);
        for row in self.fetch(conn, "primary keys", &sql).await? {
            let Some(table) = tables.get_mut(&name_key(&self.name(&row, "TABLE_NAME")?)) else {
                continue;
            };
            let name = self.name(&row, "CONSTRAINT_NAME")?;
            let column = self.name(&row, "COLUMN_NAME")?;
            table
                .primary_key
                .get_or_insert_with(|| PrimaryKey {
                    name,
                    columns: Vec::new(),
                })
                .columns
                .push(column);
        }
        Ok(())
    }

    async fn read_foreign_keys<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> Result<()> {
        let sql = self.dialect.foreign_keys_query(schema);
        for row in self.fetch(conn, "foreign keys", &sql).await? {
            let Some(table) = tables.get_mut(&name_key(&self.name(&row, "TABLE_NAME")?)) else {
                continue;
            };
            let name = self.name(&row, "CONSTRAINT_NAME")?;
            let reference = Reference {
                local: self.name(&row, "LOCAL_COLUMN")?,
                foreign: self.name(&row, "FOREIGN_COLUMN")?,
            };
            match table.foreign_keys.iter_mut().find(|fk| name_eq(&fk.name, &name)) {
                Some(fk) => fk.references.push(reference),
                None => {
                    let mut fk = ForeignKey::new(name, self.name(&row, "FOREIGN_TABLE")?);
                    fk.on_delete = action(row.text("DELETE_RULE"));
                    fk.on_update = action(row.text("UPDATE_RULE"));
                    fk.references.push(reference);
                    table.foreign_keys.push(fk);
                }
            }
        }
        Ok(())
    }

    async fn read_indexes<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> Result<()> {
        let sql = self.dialect.indexes_query(schema);
        let mut skipped = BTreeSet::new();
        for row in self.fetch(conn, "indexes", &sql).await? {
            let Some(table) = tables.get_mut(&name_key(&self.name(&row, "TABLE_NAME")?)) else {
                continue;
            };
            let name = self.name(&row, "INDEX_NAME")?;
            if self.platform.suppress_system_indexes && row.bool("IS_SYSTEM") == Some(true) {
                skipped.insert(name);
                continue;
            }
            let column = self.name(&row, "COLUMN_NAME")?;
            match table.indexes.iter_mut().find(|i| name_eq(&i.name, &name)) {
                Some(index) => index.columns.push(column),
                None => {
                    let mut index = Index::new(name, &[]);
                    index.columns.push(column);
                    index.unique = row.bool("IS_UNIQUE").unwrap_or(false);
                    index.condition = row
                        .text("CONDITION")
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string);
                    table.indexes.push(index);
                }
            }
        }
        if !skipped.is_empty() {
            debug!(count = skipped.len(), "Skipped system indexes");
        }
        Ok(())
    }

    async fn read_checks<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> Result<()> {
        let sql = self.dialect.checks_query(schema);
        for row in self.fetch(conn, "checks", &sql).await? {
            let Some(table) = tables.get_mut(&name_key(&self.name(&row, "TABLE_NAME")?)) else {
                continue;
            };
            if let Some(condition) = self.dialect.check_condition(required(&row, "CONDITION")?) {
                let name = self.name(&row, "CONSTRAINT_NAME")?;
                table.checks.push(Check::new(name, condition));
            }
        }
        Ok(())
    }

    // ---- Other objects ----

    async fn read_triggers<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
        database: &Database,
    ) -> Result<Vec<Trigger>> {
        let sql = self.dialect.triggers_query(schema);
        let mut triggers = Vec::new();
        for row in self.fetch(conn, "triggers", &sql).await? {
            let table = self.name(&row, "TABLE_NAME")?;
            if database.get_table(&table).is_none() {
                continue;
            }
            let timing = if row.text("TIMING") == Some("AFTER") {
                TriggerTiming::After
            } else {
                TriggerTiming::Before
            };
            let events = required(&row, "EVENTS")?
                .split(" OR ")
                .filter_map(|e| match e.trim().to_ascii_uppercase().as_str() {
                    "INSERT" => Some(TriggerEvent::Insert),
                    "UPDATE" => Some(TriggerEvent::Update),
                    "DELETE" => Some(TriggerEvent::Delete),
                    _ => None,
                })
                .collect();
            triggers.push(Trigger {
                name: self.name(&row, "TRIGGER_NAME")?,
                table,
                timing,
                events,
                for_each_row: row.bool("FOR_EACH_ROW").unwrap_or(true),
                body: row.text("BODY").unwrap_or_default().trim().to_string(),
            });
        }
        Ok(triggers)
    }

    async fn read_sequences<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
    ) -> Result<Vec<Sequence>> {
        let sql = self.dialect.sequences_query(schema);
        self.fetch(conn, "sequences", &sql)
            .await?
            .iter()
            .map(|row| {
                Ok(Sequence {
                    name: self.name(row, "SEQUENCE_NAME")?,
                    start: row.int("START_VALUE").unwrap_or(1),
                    increment: row.int("INCREMENT_BY").unwrap_or(1),
                })
            })
            .collect()
    }

    async fn read_views<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
    ) -> Result<Vec<View>> {
        let sql = self.dialect.views_query(schema);
        self.fetch(conn, "views", &sql)
            .await?
            .iter()
            .map(|row| {
                let statement = row.text("STATEMENT").unwrap_or_default().trim();
                Ok(View {
                    name: self.name(row, "VIEW_NAME")?,
                    statement: statement.trim_end_matches(';').trim_end().to_string(),
                })
            })
            .collect()
    }

    async fn read_functions<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &str,
    ) -> Result<Vec<Function>> {
        let mut sources: BTreeMap<String, String> = BTreeMap::new();
        if let Some(sql) = self.dialect.source_query(schema) {
            for row in self.fetch(conn, "function sources", &sql).await? {
                let name = name_key(required(&row, "NAME")?);
                sources
                    .entry(name)
                    .or_default()
                    .push_str(row.text("TEXT").unwrap_or_default());
            }
        }

        let sql = self.dialect.functions_query(schema);
        let mut functions = Vec::new();
        for row in self.fetch(conn, "functions", &sql).await? {
            let name = self.name(&row, "FUNCTION_NAME")?;
            let source = match row.text("BODY") {
                Some(body) => body.to_string(),
                None => sources.remove(&name_key(&name)).unwrap_or_default(),
            };
            let returns = match row.text("RETURN_TYPE").map(str::trim) {
                Some(t) if !t.is_empty() => Some(self.logical_code(t)?),
                _ => None,
            };
            functions.push(Function {
                parameters: self.parameters(row.text("ARGUMENTS").unwrap_or_default())?,
                returns,
                body: self.dialect.function_body(&source),
                name,
            });
        }
        Ok(functions)
    }

    /// Parses an argument list such as `p_id integer, IN p_name varchar`.
    fn parameters(&self, arguments: &str) -> Result<Vec<Parameter>> {
        arguments
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .enumerate()
            .map(|(i, argument)| {
                let argument = argument
                    .split(" DEFAULT ")
                    .next()
                    .unwrap_or(argument)
                    .trim();
                let mut words: Vec<&str> = argument.split_whitespace().collect();
                if words
                    .first()
                    .is_some_and(|w| matches!(w.to_ascii_uppercase().as_str(), "IN" | "OUT" | "INOUT"))
                {
                    words.remove(0);
                }
                let (name, native) = match words.as_slice() {
                    [] => return Err(read_error(format!("Empty argument in '{arguments}'"))),
                    [native] => (format!("ARG{}", i + 1), (*native).to_string()),
                    [name, rest @ ..] => (self.platform.fold_identifier(name), rest.join(" ")),
                };
                Ok(Parameter {
                    name,
                    type_code: self.logical_code(&native)?,
                })
            })
            .collect()
    }

    fn logical_code(&self, native: &str) -> Result<TypeCode> {
        Ok(self.platform.logical_type(native, None, None, None)?.code)
    }

    /// Marks columns filled by `{table}_AI` triggers from `{table}_SEQ` as
    /// auto-increment, and removes the trigger and sequence from the model.
    fn detect_identity_triggers(&self, database: &mut Database) {
        if self.platform.identity != IdentityStrategy::Sequence {
            return;
        }
        let Database {
            tables,
            triggers,
            sequences,
            ..
        } = database;

        let mut owned_triggers = Vec::new();
        let mut owned_sequences = Vec::new();
        for table in tables.iter_mut() {
            let trigger_name = identity_trigger_name(&table.name);
            let Some(trigger) = triggers.iter().find(|t| name_eq(&t.name, &trigger_name)) else {
                continue;
            };
            let Some(captures) = IDENTITY_TARGET.captures(&trigger.body) else {
                continue;
            };
            let column = self.platform.fold_identifier(&captures[1]);
            if let Some(column) = table.get_column_mut(&column) {
                column.auto_increment = true;
                owned_triggers.push(trigger.name.clone());
                owned_sequences.push(identity_sequence_name(&table.name));
            }
        }
        triggers.retain(|t| !owned_triggers.iter().any(|n| name_eq(n, &t.name)));
        sequences.retain(|s| !owned_sequences.iter().any(|n| name_eq(n, &s.name)));
        if !owned_triggers.is_empty() {
            debug!(count = owned_triggers.len(), "Detected identity triggers");
        }
    }

    // ---- Helpers ----

    async fn fetch<C: SqlConnection + ?Sized>(
        &self,
        conn: &mut C,
        what: &str,
        sql: &str,
    ) -> Result<Vec<Row>> {
        let rows = conn
            .query(sql)
            .await
            .map_err(|e| read_error(format!("Reading {what}: {e}")))?;
        debug!(what, count = rows.len(), "Catalog query");
        Ok(rows)
    }

    fn name(&self, row: &Row, column: &str) -> Result<String> {
        Ok(self.platform.fold_identifier(required(row, column)?.trim()))
    }

    fn text_literal(&self, text: &str) -> String {
        literal(&self.platform, &Value::from(text))
    }
}

fn read_error(message: String) -> DbError {
    SyncError::ModelRead(message).into()
}

fn required<'a>(row: &'a Row, column: &str) -> Result<&'a str> {
    row.text(column)
        .ok_or_else(|| read_error(format!("Catalog row without {column}: {row}")))
}

fn unsigned(row: &Row, column: &str) -> Option<u32> {
    row.int(column).and_then(|v| u32::try_from(v).ok())
}

fn action(rule: Option<&str>) -> ForeignKeyAction {
    match rule.map(|r| r.trim().to_ascii_uppercase()).as_deref() {
        Some("CASCADE") => ForeignKeyAction::Cascade,
        Some("SET NULL") => ForeignKeyAction::SetNull,
        Some("SET DEFAULT") => ForeignKeyAction::SetDefault,
        Some("RESTRICT") => ForeignKeyAction::Restrict,
        _ => ForeignKeyAction::NoAction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPool;
    use crate::mock::MockPool;
    use schemasync_core::dataset::StaticDatasetFilter;

    fn text(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().fold(Row::new(), |row, (c, v)| row.with(c, *v))
    }

    fn tables() -> Vec<String> {
        vec!["TABLE".to_string(), "VIEW".to_string()]
    }

    fn postgres_catalog() -> MockPool {
        MockPool::new()
            .respond(
                "FROM information_schema.tables",
                vec![
                    text(&[("table_name", "ad_client"), ("table_type", "TABLE")]),
                    text(&[("table_name", "ad_org"), ("table_type", "TABLE")]),
                    text(&[("table_name", "ad_org_v"), ("table_type", "VIEW")]),
                ],
            )
            .respond(
                "FROM information_schema.columns",
                vec![
                    text(&[("table_name", "ad_client"), ("column_name", "ad_client_id"), ("data_type", "integer"), ("nullable", "N")])
                        .with("is_identity", "Y"),
                    text(&[("table_name", "ad_client"), ("column_name", "name"), ("data_type", "character varying"), ("nullable", "N")])
                        .with("char_length", 60_i64),
                    text(&[("table_name", "ad_org"), ("column_name", "ad_org_id"), ("data_type", "integer"), ("nullable", "N")]),
                    text(&[("table_name", "ad_org"), ("column_name", "ad_client_id"), ("data_type", "integer"), ("nullable", "N")]),
                    text(&[("table_name", "ad_org"), ("column_name", "isactive"), ("data_type", "character"), ("nullable", "Y")])
                        .with("char_length", 1_i64)
                        .with("column_default", "'Y'::bpchar"),
                    text(&[("table_name", "ad_org_v"), ("column_name", "ad_org_id"), ("data_type", "integer"), ("nullable", "Y")]),
                ],
            )
            .respond(
                "con.contype = 'p'",
                vec![
                    text(&[("table_name", "ad_client"), ("constraint_name", "ad_client_key"), ("column_name", "ad_client_id")]),
                    text(&[("table_name", "ad_org"), ("constraint_name", "ad_org_key"), ("column_name", "ad_org_id")]),
                ],
            )
            .respond(
                "con.contype = 'f'",
                vec![text(&[
                    ("table_name", "ad_org"),
                    ("constraint_name", "ad_org_client"),
                    ("foreign_table", "ad_client"),
                    ("local_column", "ad_client_id"),
                    ("foreign_column", "ad_client_id"),
                    ("delete_rule", "CASCADE"),
                    ("update_rule", "NO ACTION"),
                ])],
            )
            .respond(
                "FROM pg_index",
                vec![
                    text(&[("table_name", "ad_org"), ("index_name", "ad_org_key"), ("column_name", "ad_org_id"), ("is_unique", "Y"), ("is_system", "Y")]),
                    text(&[("table_name", "ad_org"), ("index_name", "ad_org_active"), ("column_name", "ad_client_id"), ("is_unique", "N"), ("is_system", "N"), ("condition", "(isactive = 'Y'::bpchar)")]),
                ],
            )
            .respond(
                "con.contype = 'c'",
                vec![text(&[("table_name", "ad_org"), ("constraint_name", "ad_org_isactive"), ("condition", "CHECK ((isactive = ANY (ARRAY['Y'::bpchar, 'N'::bpchar])))")])],
            )
            .respond(
                "FROM pg_trigger",
                vec![text(&[
                    ("trigger_name", "ad_org_trg"),
                    ("table_name", "ad_org"),
                    ("timing", "AFTER"),
                    ("events", "INSERT OR UPDATE"),
                    ("for_each_row", "Y"),
                    ("body", "\nBEGIN\n  RETURN NEW;\nEND;\n"),
                ])],
            )
            .respond(
                "FROM pg_sequence",
                vec![text(&[("sequence_name", "ad_sequence_no")])
                    .with("start_value", 1000_i64)
                    .with("increment_by", 1_i64)],
            )
            .respond(
                "FROM information_schema.views",
                vec![text(&[("view_name", "ad_org_v"), ("statement", " SELECT ad_org.ad_org_id\n   FROM ad_org;")])],
            )
            .respond(
                "FROM pg_proc",
                vec![text(&[
                    ("function_name", "ad_get_name"),
                    ("return_type", "character varying"),
                    ("arguments", "p_id integer, IN p_lang character varying DEFAULT 'en'::character varying"),
                    ("body", "\nBEGIN RETURN 'x'; END;\n"),
                ])],
            )
    }

    #[tokio::test]
    async fn test_read_postgres_model() {
        let pool = postgres_catalog();
        let reader = ModelReader::new(PlatformInfo::postgresql());
        let mut conn = pool.acquire().await.unwrap();
        let model = reader
            .read_model(&mut conn, None, Some("public"), &tables())
            .await
            .unwrap();

        assert_eq!(model.table_names().collect::<Vec<_>>(), vec!["AD_CLIENT", "AD_ORG"]);
        let client = model.get_table("AD_CLIENT").unwrap();
        assert!(client.get_column("AD_CLIENT_ID").unwrap().auto_increment);
        assert_eq!(client.get_column("NAME").unwrap().size, Some(60));
        assert_eq!(client.primary_key.as_ref().unwrap().columns, vec!["AD_CLIENT_ID"]);

        let org = model.get_table("AD_ORG").unwrap();
        let isactive = org.get_column("ISACTIVE").unwrap();
        assert!(isactive.nullable);
        assert_eq!(isactive.default.as_deref(), Some("'Y'::bpchar"));
        let fk = org.get_foreign_key("AD_ORG_CLIENT").unwrap();
        assert_eq!(fk.foreign_table, "AD_CLIENT");
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
        assert_eq!(fk.references.len(), 1);

        // The primary key index is skipped.
        assert_eq!(org.indexes.len(), 1);
        assert_eq!(org.indexes[0].name, "AD_ORG_ACTIVE");
        assert!(org.indexes[0].condition.is_some());
        assert_eq!(
            org.get_check("AD_ORG_ISACTIVE").unwrap().condition,
            "isactive = ANY (ARRAY['Y'::bpchar, 'N'::bpchar])"
        );

        assert_eq!(model.triggers.len(), 1);
        assert_eq!(model.triggers[0].timing, TriggerTiming::After);
        assert_eq!(model.triggers[0].events, vec![TriggerEvent::Insert, TriggerEvent::Update]);
        assert_eq!(model.triggers[0].body, "BEGIN\n  RETURN NEW;\nEND;");
        assert_eq!(model.get_sequence("AD_SEQUENCE_NO").unwrap().start, 1000);
        assert_eq!(model.get_view("AD_ORG_V").unwrap().statement, "SELECT ad_org.ad_org_id\n   FROM ad_org");

        let function = model.get_function("AD_GET_NAME").unwrap();
        assert_eq!(function.returns, Some(TypeCode::Varchar));
        assert_eq!(function.parameters.len(), 2);
        assert_eq!(function.parameters[1].name, "P_LANG");
        assert_eq!(function.body, "BEGIN RETURN 'x'; END;");

        assert!(pool.statements().iter().any(|s| s.contains("table_schema = 'public'")));
    }

    #[tokio::test]
    async fn test_views_only_when_requested() {
        let pool = postgres_catalog();
        let reader = ModelReader::new(PlatformInfo::postgresql());
        let mut conn = pool.acquire().await.unwrap();
        let model = reader
            .read_model(&mut conn, None, None, &["TABLE".to_string()])
            .await
            .unwrap();
        assert!(model.views.is_empty());
        assert!(pool.statements().iter().any(|s| s.contains("current_schema()")));
    }

    #[tokio::test]
    async fn test_oracle_identity_trigger_and_not_null_checks() {
        let pool = MockPool::new()
            .respond(
                "FROM ALL_TABLES",
                vec![text(&[("TABLE_NAME", "C_ORDER"), ("TABLE_TYPE", "TABLE")])],
            )
            .respond(
                "FROM ALL_TAB_COLUMNS",
                vec![
                    text(&[("TABLE_NAME", "C_ORDER"), ("COLUMN_NAME", "C_ORDER_ID"), ("DATA_TYPE", "NUMBER"), ("NULLABLE", "N")])
                        .with("NUM_PRECISION", 10_i64)
                        .with("NUM_SCALE", 0_i64),
                    text(&[("TABLE_NAME", "C_ORDER"), ("COLUMN_NAME", "DOCUMENTNO"), ("DATA_TYPE", "VARCHAR2"), ("NULLABLE", "N")])
                        .with("CHAR_LENGTH", 30_i64),
                ],
            )
            .respond(
                "SEARCH_CONDITION",
                vec![text(&[("TABLE_NAME", "C_ORDER"), ("CONSTRAINT_NAME", "SYS_C001"), ("CONDITION", "\"DOCUMENTNO\" IS NOT NULL")])],
            )
            .respond(
                "FROM ALL_TRIGGERS",
                vec![text(&[
                    ("TRIGGER_NAME", "C_ORDER_AI"),
                    ("TABLE_NAME", "C_ORDER"),
                    ("TIMING", "BEFORE"),
                    ("EVENTS", "INSERT"),
                    ("FOR_EACH_ROW", "Y"),
                    ("BODY", "BEGIN\n  IF :new.C_ORDER_ID IS NULL THEN\n    SELECT C_ORDER_SEQ.NEXTVAL INTO :new.C_ORDER_ID FROM DUAL;\n  END IF;\nEND;"),
                ])],
            )
            .respond(
                "FROM ALL_SEQUENCES",
                vec![
                    text(&[("SEQUENCE_NAME", "C_ORDER_SEQ")]),
                    text(&[("SEQUENCE_NAME", "AD_SEQUENCE_NO")]),
                ],
            );
        let reader = ModelReader::new(PlatformInfo::oracle());
        let mut conn = pool.acquire().await.unwrap();
        let model = reader
            .read_model(&mut conn, None, Some("erp"), &tables())
            .await
            .unwrap();

        let order = model.get_table("C_ORDER").unwrap();
        assert!(order.get_column("C_ORDER_ID").unwrap().auto_increment);
        assert!(order.checks.is_empty());
        assert!(model.triggers.is_empty());
        assert_eq!(model.sequences.len(), 1);
        assert_eq!(model.sequences[0].name, "AD_SEQUENCE_NO");
        assert!(pool.statements().iter().any(|s| s.contains("OWNER = 'ERP'")));
    }

    #[tokio::test]
    async fn test_unmappable_type_is_a_read_error() {
        let pool = MockPool::new()
            .respond(
                "FROM information_schema.tables",
                vec![text(&[("table_name", "geo"), ("table_type", "TABLE")])],
            )
            .respond(
                "FROM information_schema.columns",
                vec![text(&[("table_name", "geo"), ("column_name", "shape"), ("data_type", "geometry")])],
            );
        let reader = ModelReader::new(PlatformInfo::postgresql());
        let mut conn = pool.acquire().await.unwrap();
        let err = reader
            .read_model(&mut conn, None, None, &tables())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Sync(SyncError::ModelRead(_))));
    }

    #[tokio::test]
    async fn test_query_failure_is_a_read_error() {
        let pool = MockPool::new().fail_on("information_schema.tables", "permission denied");
        let reader = ModelReader::new(PlatformInfo::postgresql());
        let mut conn = pool.acquire().await.unwrap();
        let err = reader
            .read_model(&mut conn, None, None, &tables())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_read_rows_scoped_and_ordered() {
        let pool = MockPool::new();
        let table = Table::new("AD_ORG")
            .column(Column::new("AD_ORG_ID", TypeCode::Varchar).size(32))
            .column(Column::new("NAME", TypeCode::Varchar).size(60))
            .primary_key("AD_ORG_KEY", &["AD_ORG_ID"])
            .module("core");
        let filter = StaticDatasetFilter::new().module("core", "AD_CLIENT_ID = '0'");
        let reader = ModelReader::new(PlatformInfo::postgresql());
        let mut conn = pool.acquire().await.unwrap();
        reader.read_rows(&mut conn, &table, &filter).await.unwrap();

        assert_eq!(
            pool.statements(),
            vec!["SELECT AD_ORG_ID, NAME FROM AD_ORG WHERE AD_CLIENT_ID = '0' ORDER BY AD_ORG_ID"]
        );
    }
}
