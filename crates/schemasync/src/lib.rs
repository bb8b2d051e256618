//! Live-database side of schemasync.
//!
//! `schemasync` brings a live Oracle or PostgreSQL database in line with a
//! declarative model:
//!
//! - **Reader** - Reads the live model and managed rows from the catalog
//! - **Executor** - Applies a migration plan batch by batch, collecting
//!   failures into a report
//! - **Connection** - The two traits the reader and executor run against,
//!   with `sqlx` implementations
//! - **Config** - TOML run configuration
//!
//! Comparison, planning and SQL rendering live in `schemasync-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemasync::prelude::*;
//!
//! let pool = PgPool::connect("postgres://erp@localhost/erp").await?;
//! let config = SyncConfig::load("schemasync.toml")?;
//! let platform = config.resolve_platform(&PlatformRegistry::with_defaults())?;
//! let desired = load_model("model.json")?;
//!
//! let report = Synchronizer::new(platform, config)
//!     .migrate(&pool, &desired, false)
//!     .await?;
//! for failure in &report.failures {
//!     eprintln!("{failure}");
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Dump the live model
//! schemasync read --output live.json
//!
//! # Show the SQL that would bring the database in line
//! schemasync script --model model.json
//!
//! # Apply it
//! schemasync migrate --model model.json
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod reader;
pub mod sync;

pub use error::{DbError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::connection::{ConnectionPool, SqlConnection};
    pub use crate::error::{DbError, Result};
    pub use crate::executor::{
        ExecutionFailure, ExecutionReport, ExecutorOptions, FailureKind, MigrationExecutor,
        Severity,
    };
    pub use crate::reader::ModelReader;
    pub use crate::sync::{load_model, save_model, Synchronizer};
    pub use schemasync_core::prelude::*;
    pub use sqlx::PgPool;
}
