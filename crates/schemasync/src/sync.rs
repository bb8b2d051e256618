//! End-to-end synchronization: read, compare, plan, render and apply.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use schemasync_core::change::Change;
use schemasync_core::compare::ModelComparator;
use schemasync_core::model::{Database, Table};
use schemasync_core::planner::{MigrationPlan, Planner};
use schemasync_core::platform::PlatformInfo;
use schemasync_core::sql::SqlBuilder;
use schemasync_core::SyncError;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::connection::ConnectionPool;
use crate::error::Result;
use crate::executor::{ExecutionReport, MigrationExecutor};
use crate::reader::ModelReader;

/// Loads a model from a JSON file and validates it.
pub fn load_model(path: impl AsRef<Path>) -> Result<Database> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading model");
    let content = fs::read_to_string(path)?;
    let model: Database = serde_json::from_str(&content).map_err(SyncError::from)?;
    model.validate()?;
    Ok(model)
}

/// Writes a model as pretty-printed JSON.
pub fn save_model(model: &Database, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(model).map_err(SyncError::from)?;
    fs::write(path, json)?;
    Ok(())
}

/// Runs the stages of a synchronization for one platform and configuration.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    platform: PlatformInfo,
    config: SyncConfig,
}

impl Synchronizer {
    pub const fn new(platform: PlatformInfo, config: SyncConfig) -> Self {
        Self { platform, config }
    }

    #[must_use]
    pub const fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reads the live model.
    ///
    /// When `desired` is given, the managed rows of each of its tables with
    /// data (and present in the database) are read as well, restricted to
    /// the columns the desired table declares.
    pub async fn read_model<P: ConnectionPool>(
        &self,
        pool: &P,
        desired: Option<&Database>,
    ) -> Result<Database> {
        let reader = ModelReader::new(self.platform.clone());
        let mut conn = pool.acquire().await?;
        let mut model = reader
            .read_model(
                &mut conn,
                self.config.catalog.as_deref(),
                self.config.schema.as_deref(),
                &self.config.table_types,
            )
            .await?;

        let Some(desired) = desired else {
            return Ok(model);
        };
        for wanted in desired.tables.iter().filter(|t| t.rows.is_some()) {
            let Some(live) = model.get_table_mut(&wanted.name) else {
                continue;
            };
            let scope = row_scope(live, wanted);
            let rows = reader.read_rows(&mut conn, &scope, &self.config.dataset).await?;
            live.rows = Some(rows);
        }
        Ok(model)
    }

    /// Lists the changes turning `current` into `desired`.
    #[must_use]
    pub fn diff(&self, current: &Database, desired: &Database) -> Vec<Change> {
        ModelComparator::with_options(
            self.platform.clone(),
            self.config.compare_options(&self.platform),
        )
        .compare(current, desired)
    }

    /// Plans the migration from `current` to `desired`.
    pub fn plan(&self, current: &Database, desired: &Database) -> Result<MigrationPlan> {
        let changes = self.diff(current, desired);
        let plan = Planner::new(self.platform.clone())
            .with_options(self.config.plan_options())
            .with_dataset_filter(Arc::new(self.config.dataset.clone()))
            .plan(current, desired, &changes)?;
        Ok(plan)
    }

    /// Renders a plan as a SQL script.
    pub fn script(&self, plan: &MigrationPlan) -> Result<String> {
        let builder = SqlBuilder::new(self.platform.clone());
        Ok(builder.render_script(plan, self.config.continue_on_error)?)
    }

    /// Reads the live model, plans, and applies the plan.
    pub async fn migrate<P: ConnectionPool + Clone>(
        &self,
        pool: &P,
        desired: &Database,
        dry_run: bool,
    ) -> Result<ExecutionReport> {
        let current = self.read_model(pool, Some(desired)).await?;
        let plan = self.plan(&current, desired)?;
        if plan.is_empty() {
            info!("Database is up to date");
        }
        MigrationExecutor::new(pool.clone(), self.platform.clone())
            .with_options(self.config.executor_options(&self.platform).dry_run(dry_run))
            .execute(&plan, current)
            .await
    }
}

/// The live table as seen through the desired table's data scope.
fn row_scope(live: &Table, wanted: &Table) -> Table {
    let mut scope = live.clone();
    scope
        .columns
        .retain(|c| wanted.get_column(&c.name).is_some());
    scope.row_filter.clone_from(&wanted.row_filter);
    scope.module.clone_from(&wanted.module);
    scope.rows = None;
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPool;
    use schemasync_core::prelude::*;

    fn product() -> Table {
        Table::new("M_PRODUCT")
            .column(Column::new("M_PRODUCT_ID", TypeCode::Varchar).size(32).not_null())
            .column(Column::new("NAME", TypeCode::Varchar).size(60))
            .primary_key("M_PRODUCT_KEY", &["M_PRODUCT_ID"])
            .module("core")
    }

    #[test]
    fn test_model_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = Database::new("erp").table(product());

        save_model(&model, &path).unwrap();
        assert_eq!(load_model(&path).unwrap(), model);
    }

    #[test]
    fn test_script_for_new_table() {
        let sync = Synchronizer::new(PlatformInfo::postgresql(), SyncConfig::default());
        let desired = Database::new("erp").table(product());
        let plan = sync.plan(&Database::new("live"), &desired).unwrap();
        let script = sync.script(&plan).unwrap();

        assert!(script.contains("CREATE TABLE M_PRODUCT"));
        assert!(sync.plan(&desired, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_row_scope_uses_desired_filter() {
        let mut live = product();
        live.module = None;
        live.columns.push(Column::new("OBSOLETE", TypeCode::Integer));
        let mut wanted = product();
        wanted.row_filter = Some("NAME IS NOT NULL".to_string());

        let scope = row_scope(&live, &wanted);
        assert_eq!(scope.columns.len(), 2);
        assert_eq!(scope.module.as_deref(), Some("core"));
        assert_eq!(scope.row_filter.as_deref(), Some("NAME IS NOT NULL"));
    }

    #[tokio::test]
    async fn test_read_model_reads_managed_rows() {
        let pool = MockPool::new()
            .respond(
                "information_schema.tables",
                vec![Row::new().with("table_name", "m_product").with("table_type", "TABLE")],
            )
            .respond(
                "information_schema.columns",
                vec![
                    Row::new()
                        .with("table_name", "m_product")
                        .with("column_name", "m_product_id")
                        .with("data_type", "character varying")
                        .with("char_length", 32_i64)
                        .with("nullable", "N")
                        .with("is_identity", "N"),
                    Row::new()
                        .with("table_name", "m_product")
                        .with("column_name", "name")
                        .with("data_type", "character varying")
                        .with("char_length", 60_i64)
                        .with("nullable", "Y")
                        .with("is_identity", "N"),
                ],
            )
            .respond(
                "FROM M_PRODUCT",
                vec![Row::new().with("M_PRODUCT_ID", "1").with("NAME", "Widget")],
            );
        let config = SyncConfig::parse("[dataset.modules]\ncore = \"NAME IS NOT NULL\"").unwrap();
        let sync = Synchronizer::new(PlatformInfo::postgresql(), config);
        let desired = Database::new("erp").table(product().row(Row::new()));

        let model = sync.read_model(&pool, Some(&desired)).await.unwrap();
        let rows = model.tables[0].rows.as_ref().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("NAME"), Some("Widget"));
        assert!(pool
            .statements()
            .contains(&"SELECT M_PRODUCT_ID, NAME FROM M_PRODUCT WHERE NAME IS NOT NULL".to_string()));
    }

    #[tokio::test]
    async fn test_migrate_dry_run_touches_nothing() {
        let pool = MockPool::new();
        let sync = Synchronizer::new(PlatformInfo::postgresql(), SyncConfig::default());
        let desired = Database::new("erp").table(product());

        let report = sync.migrate(&pool, &desired, true).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.applied_count, 1);
        assert!(!pool.statements().iter().any(|s| s.starts_with("CREATE")));
    }
}
