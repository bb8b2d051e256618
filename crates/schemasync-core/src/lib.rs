//! Database model synchronization.
//!
//! `schemasync-core` compares a desired database model (tables, constraints,
//! triggers, sequences, views, functions and seed rows) with the model of a
//! live database, and turns the differences into an ordered, dependency-safe
//! migration plan rendered as Oracle or PostgreSQL SQL.
//!
//! # Architecture
//!
//! - **Model** - Platform-neutral description of a database
//! - **Platform** - Capabilities, native type mapping and platform lookup
//! - **Comparator** - Diffs two models into atomic [`Change`]s
//! - **Planner** - Orders changes into phases and batches
//! - **SQL builder** - Renders plan steps for the target platform
//! - **State** - Replays changes on a model snapshot
//!
//! Reading live databases and executing plans is the job of the
//! `schemasync` crate.
//!
//! # Example
//!
//! ```rust
//! use schemasync_core::prelude::*;
//!
//! let current = Database::new("live");
//! let desired = Database::new("model").table(
//!     Table::new("AD_CLIENT")
//!         .column(Column::new("AD_CLIENT_ID", TypeCode::Varchar).size(32).not_null())
//!         .column(Column::new("NAME", TypeCode::Varchar).size(60).not_null())
//!         .primary_key("AD_CLIENT_KEY", &["AD_CLIENT_ID"]),
//! );
//!
//! let platform = PlatformInfo::postgresql();
//! let changes = ModelComparator::new(platform.clone()).compare(&current, &desired);
//! let plan = Planner::new(platform.clone())
//!     .plan(&current, &desired, &changes)
//!     .unwrap();
//! let script = SqlBuilder::new(platform).render_script(&plan, false).unwrap();
//! assert!(script.contains("CREATE TABLE AD_CLIENT"));
//! ```

pub mod change;
pub mod compare;
pub mod dataset;
pub mod error;
pub mod model;
pub mod planner;
pub mod platform;
pub mod sql;
pub mod state;
pub mod types;
pub mod value;

pub use change::Change;
pub use error::{Result, SyncError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::change::{Change, ChangeCategory, ColumnDelta};
    pub use crate::compare::{CompareOptions, ModelComparator};
    pub use crate::dataset::{DatasetFilter, NoFilter, StaticDatasetFilter};
    pub use crate::error::{Result, SyncError};
    pub use crate::model::{
        Check, Column, Database, ForeignKey, ForeignKeyAction, Function, Index, Parameter,
        PreScript, PrimaryKey, Sequence, Table, Trigger, TriggerEvent, TriggerTiming, View,
    };
    pub use crate::planner::{
        Backfill, Batch, ConstraintGuard, MigrationPlan, Phase, PlanOptions, Planner, Rebuild,
        Step, Unit,
    };
    pub use crate::platform::{PlatformInfo, PlatformKind, PlatformRegistry};
    pub use crate::sql::SqlBuilder;
    pub use crate::state::ModelState;
    pub use crate::types::TypeCode;
    pub use crate::value::{Row, Value};
}
