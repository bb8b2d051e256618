//! Run configuration loaded from TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use schemasync_core::compare::CompareOptions;
use schemasync_core::dataset::StaticDatasetFilter;
use schemasync_core::planner::PlanOptions;
use schemasync_core::platform::{PlatformInfo, PlatformRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DbError, Result};
use crate::executor::ExecutorOptions;

fn default_table_types() -> Vec<String> {
    vec!["TABLE".to_string(), "VIEW".to_string()]
}

const fn default_true() -> bool {
    true
}

const fn default_max_threads() -> usize {
    1
}

/// Settings of a synchronization run.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Connection URL of the live database.
    pub url: Option<String>,
    /// Driver class name, used to pick the platform.
    pub driver: Option<String>,
    /// Platform name; wins over `driver` and `url`.
    pub platform: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    /// Object types read from the catalog.
    #[serde(default = "default_table_types")]
    pub table_types: Vec<String>,
    pub continue_on_error: bool,
    pub use_batch_mode: bool,
    /// Defaults to the platform's batch size.
    pub batch_size: Option<usize>,
    #[serde(default = "default_true")]
    pub ensure_foreign_key_order: bool,
    /// Defaults to the platform setting.
    pub column_order_managed: Option<bool>,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    pub statement_timeout_secs: Option<u64>,
    pub dataset: StaticDatasetFilter,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: None,
            driver: None,
            platform: None,
            catalog: None,
            schema: None,
            table_types: default_table_types(),
            continue_on_error: false,
            use_batch_mode: false,
            batch_size: None,
            ensure_foreign_key_order: true,
            column_order_managed: None,
            max_threads: default_max_threads(),
            statement_timeout_secs: None,
            dataset: StaticDatasetFilter::default(),
        }
    }
}

impl SyncConfig {
    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses TOML configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.max_threads == 0 {
            return Err(DbError::Config("max_threads must be at least 1".to_string()));
        }
        if config.batch_size == Some(0) {
            return Err(DbError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Resolves the target platform: by name, else by driver, else by URL.
    pub fn resolve_platform(&self, registry: &PlatformRegistry) -> Result<PlatformInfo> {
        let platform = match &self.platform {
            Some(name) => registry
                .get(name)
                .cloned()
                .ok_or_else(|| DbError::Config(format!("Unknown platform '{name}'")))?,
            None => registry.resolve(self.driver.as_deref(), self.url.as_deref())?,
        };
        Ok(match self.column_order_managed {
            Some(managed) => platform.column_order_managed(managed),
            None => platform,
        })
    }

    #[must_use]
    pub const fn compare_options(&self, platform: &PlatformInfo) -> CompareOptions {
        CompareOptions::for_platform(platform)
    }

    #[must_use]
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            ensure_foreign_key_order: self.ensure_foreign_key_order,
            ..PlanOptions::default()
        }
    }

    /// Executor settings for `platform`.
    #[must_use]
    pub fn executor_options(&self, platform: &PlatformInfo) -> ExecutorOptions {
        let mut options = ExecutorOptions::for_platform(platform)
            .continue_on_error(self.continue_on_error)
            .max_threads(self.max_threads);
        if let Some(size) = self.batch_size {
            options.batch_size = size;
        }
        options.use_batch_mode = self.use_batch_mode;
        if let Some(secs) = self.statement_timeout_secs {
            options = options.statement_timeout(Duration::from_secs(secs));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemasync_core::dataset::DatasetFilter;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SyncConfig::parse("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.table_types, vec!["TABLE", "VIEW"]);
        assert!(config.ensure_foreign_key_order);
        assert_eq!(config.max_threads, 1);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
url = "postgres://erp@localhost/erp"
schema = "public"
continue_on_error = true
use_batch_mode = true
batch_size = 50
max_threads = 4
statement_timeout_secs = 30

[dataset.tables]
AD_ORG = "AD_CLIENT_ID = '0'"

[dataset.modules]
core = "AD_MODULE_ID = '0'"
"#
        )
        .unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        let platform = config.resolve_platform(&PlatformRegistry::with_defaults()).unwrap();
        assert_eq!(platform.name, "postgresql");

        let options = config.executor_options(&platform);
        assert!(options.continue_on_error);
        assert!(options.use_batch_mode);
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.max_threads, 4);
        assert_eq!(options.statement_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            config.dataset.where_clause("AD_ORG", None).as_deref(),
            Some("AD_CLIENT_ID = '0'")
        );
        assert_eq!(
            config.dataset.where_clause("AD_ROLE", Some("core")).as_deref(),
            Some("AD_MODULE_ID = '0'")
        );
    }

    #[test]
    fn test_platform_name_wins() {
        let config = SyncConfig::parse(
            "platform = \"oracle\"\nurl = \"postgres://localhost/erp\"\ncolumn_order_managed = true",
        )
        .unwrap();
        let platform = config.resolve_platform(&PlatformRegistry::with_defaults()).unwrap();
        assert!(platform.is_oracle());
        assert!(platform.column_order_managed);
        assert_eq!(config.executor_options(&platform).batch_size, 100);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            SyncConfig::parse("max_threads = 0"),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::parse("batch_size = \"many\""),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::parse("platform = \"db2\"")
                .unwrap()
                .resolve_platform(&PlatformRegistry::with_defaults()),
            Err(DbError::Config(_))
        ));
    }
}
