//! Migration planning.
//!
//! The planner turns the comparator's changes into ordered batches that can
//! be applied without violating referential integrity at any point:
//!
//! 1. pre-scripts
//! 2. drops of dependent objects (views, triggers, foreign keys, checks, indexes)
//! 3. drops of columns, tables, functions and sequences
//! 4. structure: sequences, new tables, column additions and alterations,
//!    primary key changes, table rebuilds
//! 5. data rows
//! 6. NOT NULL on added columns, once every row has a value
//! 7. functions
//! 8. indexes, checks and triggers
//! 9. foreign keys
//! 10. views
//!
//! Objects that must disappear temporarily (foreign keys pointing at a table
//! whose primary key changes, triggers reading an altered column, ...) are
//! dropped in step 2 and created again in step 8 or 9.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::change::{Change, ColumnDelta};
use crate::compare::references_column;
use crate::dataset::{table_predicate, DatasetFilter, NoFilter};
use crate::error::Result;
use crate::model::{
    dependency_order, name_eq, name_key, Check, Column, Database, ForeignKey, PreScript, Table,
    Trigger, View,
};
use crate::platform::{ConstraintToggle, PlatformInfo};
use crate::state::ModelState;

/// Ordered stage of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    PreScripts,
    DropDependents,
    DropObjects,
    Structure,
    Data,
    NotNull,
    Routines,
    AddConstraints,
    ForeignKeys,
    Views,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreScripts => "pre-scripts",
            Self::DropDependents => "drop dependents",
            Self::DropObjects => "drop objects",
            Self::Structure => "structure",
            Self::Data => "data",
            Self::NotNull => "not null",
            Self::Routines => "routines",
            Self::AddConstraints => "add constraints",
            Self::ForeignKeys => "foreign keys",
            Self::Views => "views",
        };
        write!(f, "{name}")
    }
}

/// Fills a newly added column on existing rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backfill {
    pub table: String,
    pub column: String,
    /// SQL expression written into rows where the column is NULL.
    pub value: String,
    /// Restricts the rows that are filled.
    pub predicate: Option<String>,
}

/// Rebuilds a table whose changes cannot be applied in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rebuild {
    /// The table as it exists before the rebuild.
    pub old: Table,
    /// Structure to create (foreign keys are re-added separately).
    pub new: Table,
    /// Values for columns that do not exist in the old table.
    pub initial_values: BTreeMap<String, String>,
    /// Restricts which rows receive initial values.
    pub predicate: Option<String>,
}

/// One executable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Step {
    PreScript(PreScript),
    Change(Change),
    Backfill(Backfill),
    Rebuild(Rebuild),
}

impl Step {
    /// Table touched by the step.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::PreScript(_) => None,
            Self::Change(change) => change.table(),
            Self::Backfill(b) => Some(b.table.as_str()),
            Self::Rebuild(r) => Some(r.new.name.as_str()),
        }
    }

    /// Column touched by the step.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Change(change) => change.column(),
            Self::Backfill(b) => Some(b.column.as_str()),
            Self::PreScript(_) | Self::Rebuild(_) => None,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::PreScript(script) => format!("Run pre-script {}", script.name),
            Self::Change(change) => change.description(),
            Self::Backfill(b) => format!("Fill {}.{} with {}", b.table, b.column, b.value),
            Self::Rebuild(r) => format!("Rebuild table {}", r.new.name),
        }
    }

    /// Returns whether failures of this step leave the batch usable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backfill(_))
    }

    /// Advances a model snapshot past this step.
    pub fn apply_to(&self, state: &mut ModelState) -> Result<()> {
        match self {
            Self::PreScript(_) | Self::Backfill(_) => Ok(()),
            Self::Change(change) => state.apply(change),
            Self::Rebuild(rebuild) => {
                let mut table = rebuild.new.clone();
                table.rows = rebuild.old.rows.clone();
                state.replace_table(table)
            }
        }
    }
}

/// Steps that belong to one table (or to no table).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub table: Option<String>,
    pub steps: Vec<Step>,
}

/// Constraints and triggers switched off around a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintGuard {
    /// `(owning table, foreign key)` pairs.
    pub foreign_keys: Vec<(String, ForeignKey)>,
    pub triggers: Vec<Trigger>,
    /// `(owning table, check)` pairs.
    pub checks: Vec<(String, Check)>,
}

impl ConstraintGuard {
    /// Returns whether nothing needs to be switched off.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.foreign_keys.is_empty() && self.triggers.is_empty() && self.checks.is_empty()
    }
}

/// A group of units applied on one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub phase: Phase,
    pub units: Vec<Unit>,
    /// Contains column drops, table drops or rebuilds.
    pub destructive: bool,
    /// Units may run concurrently.
    pub parallel_eligible: bool,
    pub guard: ConstraintGuard,
}

impl Batch {
    /// Steps of the batch in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.units.iter().flat_map(|u| u.steps.iter())
    }

    /// Tables touched by the batch.
    #[must_use]
    pub fn tables(&self) -> BTreeSet<String> {
        self.steps().filter_map(Step::table).map(name_key).collect()
    }
}

/// Ordered batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationPlan {
    pub batches: Vec<Batch>,
}

impl MigrationPlan {
    /// Returns whether the plan does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// All steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.batches.iter().flat_map(Batch::steps)
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps().count()
    }
}

/// Options for the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Create tables and insert rows parent first.
    pub ensure_foreign_key_order: bool,
    /// Upper-cased names of tables known to hold no rows. Every other table
    /// is assumed to contain data.
    pub empty_tables: BTreeSet<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            ensure_foreign_key_order: true,
            empty_tables: BTreeSet::new(),
        }
    }
}

impl PlanOptions {
    /// Marks a table as known to be empty.
    #[must_use]
    pub fn empty_table(mut self, table: &str) -> Self {
        self.empty_tables.insert(name_key(table));
        self
    }
}

/// Orders changes into a [`MigrationPlan`].
#[derive(Clone)]
pub struct Planner {
    platform: PlatformInfo,
    options: PlanOptions,
    filter: Arc<dyn DatasetFilter>,
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("platform", &self.platform.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Planner {
    /// Creates a planner with default options and no dataset filter.
    #[must_use]
    pub fn new(platform: PlatformInfo) -> Self {
        Self {
            platform,
            options: PlanOptions::default(),
            filter: Arc::new(NoFilter),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the dataset filter used to scope backfills.
    #[must_use]
    pub fn with_dataset_filter(mut self, filter: Arc<dyn DatasetFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Plans `changes`, which transform `current` into `desired`.
    ///
    /// An empty change list yields an empty plan.
    pub fn plan(
        &self,
        current: &Database,
        desired: &Database,
        changes: &[Change],
    ) -> Result<MigrationPlan> {
        if changes.is_empty() {
            return Ok(MigrationPlan::default());
        }

        let mut builder = PlanBuilder::new(self, current, desired, changes);
        builder.pre_scripts();
        builder.companions();
        builder.drops();
        builder.structure()?;
        builder.data();
        builder.additions();
        let plan = builder.finish();

        info!(
            batches = plan.batches.len(),
            steps = plan.step_count(),
            "Migration planned"
        );
        for batch in &plan.batches {
            debug!(
                phase = %batch.phase,
                units = batch.units.len(),
                destructive = batch.destructive,
                parallel = batch.parallel_eligible,
                "Planned batch"
            );
        }
        Ok(plan)
    }
}

type ConstraintKey = (String, String);

fn constraint_key(table: &str, name: &str) -> ConstraintKey {
    (name_key(table), name_key(name))
}

/// Working state while a plan is built.
struct PlanBuilder<'a> {
    planner: &'a Planner,
    current: &'a Database,
    desired: &'a Database,
    changes: &'a [Change],
    rebuilds: BTreeSet<String>,
    removed_tables: BTreeSet<String>,
    added_tables: BTreeSet<String>,

    fk_drops: Vec<(String, ForeignKey)>,
    fk_adds: Vec<(String, ForeignKey)>,
    trigger_drops: Vec<Trigger>,
    trigger_adds: Vec<Trigger>,
    check_drops: Vec<(String, Check)>,
    check_adds: Vec<(String, Check)>,
    view_drops: Vec<View>,
    view_adds: Vec<View>,

    batches: BTreeMap<Phase, Vec<Unit>>,
}

impl<'a> PlanBuilder<'a> {
    fn new(
        planner: &'a Planner,
        current: &'a Database,
        desired: &'a Database,
        changes: &'a [Change],
    ) -> Self {
        let mut removed_tables = BTreeSet::new();
        let mut added_tables = BTreeSet::new();
        for change in changes {
            match change {
                Change::RemoveTable { table } => {
                    removed_tables.insert(name_key(&table.name));
                }
                Change::AddTable { table } => {
                    added_tables.insert(name_key(&table.name));
                }
                _ => {}
            }
        }

        let rebuilds = changes
            .iter()
            .filter(|c| match c {
                Change::ColumnDefinitionChange { delta, .. } => delta.rebuild_required,
                Change::ColumnOrderChange { .. } => true,
                _ => false,
            })
            .filter_map(Change::table)
            .map(name_key)
            .filter(|t| !removed_tables.contains(t) && !added_tables.contains(t))
            .collect();

        Self {
            planner,
            current,
            desired,
            changes,
            rebuilds,
            removed_tables,
            added_tables,
            fk_drops: Vec::new(),
            fk_adds: Vec::new(),
            trigger_drops: Vec::new(),
            trigger_adds: Vec::new(),
            check_drops: Vec::new(),
            check_adds: Vec::new(),
            view_drops: Vec::new(),
            view_adds: Vec::new(),
            batches: BTreeMap::new(),
        }
    }

    fn is_rebuilt(&self, table: &str) -> bool {
        self.rebuilds.contains(&name_key(table))
    }

    fn push_unit(&mut self, phase: Phase, table: Option<&str>, steps: Vec<Step>) {
        if steps.is_empty() {
            return;
        }
        self.batches.entry(phase).or_default().push(Unit {
            table: table.map(ToString::to_string),
            steps,
        });
    }

    /// Appends to the last unit of the phase when it belongs to the same table.
    fn push_step(&mut self, phase: Phase, table: Option<&str>, step: Step) {
        let units = self.batches.entry(phase).or_default();
        let same_table = units
            .last()
            .is_some_and(|u| u.table.as_deref().map(name_key) == table.map(name_key));
        match units.last_mut() {
            Some(unit) if same_table => unit.steps.push(step),
            _ => units.push(Unit {
                table: table.map(ToString::to_string),
                steps: vec![step],
            }),
        }
    }

    // ---- Pre-scripts ------------------------------------------------

    fn pre_scripts(&mut self) {
        let steps = self
            .desired
            .pre_scripts
            .iter()
            .cloned()
            .map(Step::PreScript)
            .collect();
        self.push_unit(Phase::PreScripts, None, steps);
    }

    // ---- Companion drops and re-creations ----------------------------

    fn companions(&mut self) {
        let mut fk_dropped = BTreeSet::new();
        let mut fk_added = BTreeSet::new();
        let mut trigger_dropped = BTreeSet::new();
        let mut trigger_added = BTreeSet::new();
        let mut check_dropped = BTreeSet::new();
        let mut check_added = BTreeSet::new();

        for change in self.changes {
            match change {
                Change::RemoveForeignKey { table, foreign_key } => {
                    fk_dropped.insert(constraint_key(table, &foreign_key.name));
                }
                Change::AddForeignKey { table, foreign_key } => {
                    fk_added.insert(constraint_key(table, &foreign_key.name));
                }
                Change::RemoveTrigger { trigger } => {
                    trigger_dropped.insert(name_key(&trigger.name));
                }
                Change::AddTrigger { trigger } => {
                    trigger_added.insert(name_key(&trigger.name));
                }
                Change::RemoveCheck { table, check } => {
                    check_dropped.insert(constraint_key(table, &check.name));
                }
                Change::AddCheck { table, check } => {
                    check_added.insert(constraint_key(table, &check.name));
                }
                _ => {}
            }
        }

        // Foreign keys referencing tables whose key changes or that are rebuilt.
        let mut key_tables: BTreeSet<String> = self.rebuilds.clone();
        for change in self.changes {
            if let Change::PrimaryKeyChange { table, .. } = change {
                key_tables.insert(name_key(table));
            }
        }
        for table in &key_tables {
            let mut affected: Vec<(String, ForeignKey)> = self
                .current
                .referencing_foreign_keys(table)
                .into_iter()
                .map(|(source, fk)| (source.name.clone(), fk.clone()))
                .collect();
            if self.rebuilds.contains(table) {
                if let Some(own) = self.current.get_table(table) {
                    affected.extend(
                        own.foreign_keys
                            .iter()
                            .map(|fk| (own.name.clone(), fk.clone())),
                    );
                }
            }
            for (source, fk) in affected {
                if self.removed_tables.contains(&name_key(&source)) {
                    continue;
                }
                let key = constraint_key(&source, &fk.name);
                if !fk_dropped.insert(key.clone()) {
                    continue;
                }
                self.fk_drops.push((source.clone(), fk.clone()));
                if fk_added.insert(key) {
                    self.fk_adds.push((source, fk));
                }
            }
        }

        // Triggers of rebuilt tables and triggers reading altered columns.
        let mut triggers: Vec<Trigger> = Vec::new();
        for table in &self.rebuilds {
            triggers.extend(self.current.triggers_on(table).cloned());
        }
        for change in self.changes {
            if let Change::RecreateTriggers { triggers: t, .. } = change {
                triggers.extend(t.iter().cloned());
            }
        }
        for trigger in triggers {
            let key = name_key(&trigger.name);
            if !trigger_dropped.insert(key.clone()) {
                continue;
            }
            let wanted = self.desired.get_trigger(&trigger.name).cloned();
            self.trigger_drops.push(trigger);
            if let Some(wanted) = wanted {
                if trigger_added.insert(key) {
                    self.trigger_adds.push(wanted);
                }
            }
        }

        // Views reading rebuilt tables.
        let touched: Vec<&str> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::RemoveView { view } | Change::AddView { view } => Some(view.name.as_str()),
                _ => None,
            })
            .collect();
        for view in &self.current.views {
            if touched.iter().any(|v| name_eq(v, &view.name))
                || !self
                    .rebuilds
                    .iter()
                    .any(|t| references_column(&view.statement, t))
            {
                continue;
            }
            self.view_drops.push(view.clone());
            if let Some(wanted) = self.desired.get_view(&view.name) {
                self.view_adds.push(wanted.clone());
            }
        }

        // Checks reading columns altered or dropped in place.
        for change in self.changes {
            let (table, column) = match change {
                Change::ColumnDefinitionChange { table, new, .. } => (table, new.name.as_str()),
                Change::RemoveColumn { table, column } => (table, column.as_str()),
                _ => continue,
            };
            if self.is_rebuilt(table) {
                continue;
            }
            let Some(existing) = self.current.get_table(table) else {
                continue;
            };
            for check in &existing.checks {
                if !references_column(&check.condition, column) {
                    continue;
                }
                let key = constraint_key(table, &check.name);
                if !check_dropped.insert(key.clone()) {
                    continue;
                }
                self.check_drops.push((table.clone(), check.clone()));
                let wanted = self
                    .desired
                    .get_table(table)
                    .and_then(|t| t.get_check(&check.name))
                    .cloned();
                if let Some(wanted) = wanted {
                    if check_added.insert(key) {
                        self.check_adds.push((table.clone(), wanted));
                    }
                }
            }
        }
    }

    // ---- Drops ----------------------------------------------------------

    fn drops(&mut self) {
        let mut dependents: Vec<(String, u8, Step)> = Vec::new();
        let mut objects: Vec<(String, u8, Step)> = Vec::new();

        for change in self.changes {
            let key = name_key(change.object_name());
            match change {
                Change::RemoveView { .. } => dependents.push((String::new(), 0, Step::Change(change.clone()))),
                Change::RemoveTrigger { .. } => dependents.push((key, 1, Step::Change(change.clone()))),
                Change::RemoveForeignKey { .. } => dependents.push((key, 2, Step::Change(change.clone()))),
                Change::RemoveCheck { .. } => dependents.push((key, 3, Step::Change(change.clone()))),
                Change::RemoveIndex { .. } => dependents.push((key, 4, Step::Change(change.clone()))),
                Change::RemoveColumn { table, .. } if !self.is_rebuilt(table) => {
                    objects.push((key, 0, Step::Change(change.clone())));
                }
                Change::RemoveTable { .. } => objects.push((key, 1, Step::Change(change.clone()))),
                Change::RemoveFunction { .. } => objects.push((key, 2, Step::Change(change.clone()))),
                Change::RemoveSequence { .. } => objects.push((key, 3, Step::Change(change.clone()))),
                _ => {}
            }
        }

        for view in &self.view_drops {
            dependents.push((
                String::new(),
                0,
                Step::Change(Change::RemoveView { view: view.clone() }),
            ));
        }
        for trigger in &self.trigger_drops {
            dependents.push((
                name_key(&trigger.table),
                1,
                Step::Change(Change::RemoveTrigger {
                    trigger: trigger.clone(),
                }),
            ));
        }
        for (table, fk) in &self.fk_drops {
            dependents.push((
                name_key(table),
                2,
                Step::Change(Change::remove_foreign_key(table, fk.clone())),
            ));
        }
        for (table, check) in &self.check_drops {
            dependents.push((
                name_key(table),
                3,
                Step::Change(Change::remove_check(table, check.clone())),
            ));
        }

        dependents.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        for (_, _, step) in dependents {
            let table = step.table().map(ToString::to_string);
            self.push_step(Phase::DropDependents, table.as_deref(), step);
        }

        objects.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        for (_, _, step) in objects {
            let table = step.table().map(ToString::to_string);
            self.push_step(Phase::DropObjects, table.as_deref(), step);
        }
    }

    // ---- Structure ------------------------------------------------------

    fn structure(&mut self) -> Result<()> {
        let changes = self.changes;
        let desired = self.desired;
        for change in changes {
            if matches!(change, Change::AddSequence { .. } | Change::AlterSequence { .. }) {
                self.push_step(Phase::Structure, None, Step::Change(change.clone()));
            }
        }

        let new_tables: Vec<&Table> = changes
            .iter()
            .filter_map(|c| match c {
                Change::AddTable { table } => Some(table),
                _ => None,
            })
            .collect();
        let ordered: Vec<&Table> = if self.planner.options.ensure_foreign_key_order {
            // Foreign keys are stripped from created tables; order by the
            // desired definitions so parents come first.
            let desired: Vec<&Table> = new_tables
                .iter()
                .filter_map(|t| desired.get_table(&t.name))
                .collect();
            dependency_order(&desired)
                .order
                .iter()
                .filter_map(|name| new_tables.iter().find(|t| name_eq(&t.name, name)).copied())
                .collect()
        } else {
            new_tables
        };
        for table in ordered {
            self.push_unit(
                Phase::Structure,
                Some(&table.name),
                vec![Step::Change(Change::AddTable {
                    table: table.clone(),
                })],
            );
        }

        let mut per_table: BTreeMap<String, Vec<&Change>> = BTreeMap::new();
        for change in changes {
            if matches!(
                change,
                Change::AddColumn { .. }
                    | Change::ColumnDefinitionChange { .. }
                    | Change::ColumnOrderChange { .. }
                    | Change::PrimaryKeyChange { .. }
            ) {
                if let Some(table) = change.table() {
                    per_table.entry(name_key(table)).or_default().push(change);
                }
            }
        }

        for (key, table_changes) in per_table {
            let name = table_changes
                .first()
                .and_then(|c| c.table())
                .unwrap_or(key.as_str())
                .to_string();
            if self.rebuilds.contains(&key) {
                let rebuild = self.rebuild(&name)?;
                self.push_unit(Phase::Structure, Some(&name), vec![Step::Rebuild(rebuild)]);
            } else {
                let (steps, not_null) = self.in_place_steps(&name, &table_changes);
                self.push_unit(Phase::Structure, Some(&name), steps);
                self.push_unit(Phase::NotNull, Some(&name), not_null);
            }
        }
        Ok(())
    }

    /// Structure steps of a table altered in place, and the NOT NULL
    /// steps of its added columns that must wait for the data phase.
    fn in_place_steps(&self, table: &str, changes: &[&Change]) -> (Vec<Step>, Vec<Step>) {
        let mut steps = Vec::new();
        let mut not_null = Vec::new();
        let mut added: Vec<(&Column, usize, Option<&String>)> = changes
            .iter()
            .filter_map(|c| match c {
                Change::AddColumn {
                    column,
                    position,
                    next_column,
                    ..
                } => Some((column, *position, next_column.as_ref())),
                _ => None,
            })
            .collect();
        added.sort_by_key(|(_, position, _)| *position);
        for (column, position, next) in added {
            let (add, tighten) = self.add_column_steps(table, column, position, next.cloned());
            steps.extend(add);
            not_null.extend(tighten);
        }

        for change in changes {
            if matches!(change, Change::ColumnDefinitionChange { .. }) {
                steps.push(Step::Change((*change).clone()));
            }
        }
        for change in changes {
            if matches!(change, Change::PrimaryKeyChange { .. }) {
                steps.push(Step::Change((*change).clone()));
            }
        }
        (steps, not_null)
    }

    /// Steps that add `column` to an existing table without breaking its
    /// rows. The NOT NULL step, if any, is returned apart: rows outside the
    /// dataset filter only get their values from the data phase.
    fn add_column_steps(
        &self,
        table: &str,
        column: &Column,
        position: usize,
        next: Option<String>,
    ) -> (Vec<Step>, Option<Step>) {
        let add = |column: Column| {
            Step::Change(Change::add_column(table, column, position, next.clone()))
        };
        let alter = |old: Column, new: Column, delta: ColumnDelta| {
            Step::Change(Change::ColumnDefinitionChange {
                table: table.to_string(),
                old,
                new,
                delta,
            })
        };

        let empty = self.planner.options.empty_tables.contains(&name_key(table));
        let initial = column.initial_value().map(ToString::to_string);
        if empty || column.auto_increment || (column.nullable && initial.is_none()) {
            return (vec![add(column.clone())], None);
        }

        let predicate = self
            .desired
            .get_table(table)
            .and_then(|t| table_predicate(t, self.planner.filter.as_ref()));

        let mut nullable = column.clone();
        nullable.nullable = true;
        nullable.default = None;
        let mut steps = Vec::new();

        let defaults_agree = column.on_create_default.is_none()
            || self.planner.platform.normalize_default(column.default.as_deref())
                == self
                    .planner
                    .platform
                    .normalize_default(column.on_create_default.as_deref());

        match initial {
            Some(value) if defaults_agree && predicate.is_none() && column.default.is_some() => {
                // The DDL fills existing rows with the default.
                let mut with_default = nullable.clone();
                with_default.default = Some(value);
                steps.push(add(with_default.clone()));
                nullable = with_default;
            }
            Some(value) => {
                steps.push(add(nullable.clone()));
                steps.push(Step::Backfill(Backfill {
                    table: table.to_string(),
                    column: column.name.clone(),
                    value,
                    predicate,
                }));
                if column.default.is_some() {
                    let mut with_default = nullable.clone();
                    with_default.default.clone_from(&column.default);
                    steps.push(alter(
                        nullable,
                        with_default.clone(),
                        ColumnDelta {
                            default_changed: true,
                            ..ColumnDelta::default()
                        },
                    ));
                    nullable = with_default;
                }
            }
            None => steps.push(add(nullable.clone())),
        }

        let not_null = (!column.nullable).then(|| {
            alter(
                nullable,
                column.clone(),
                ColumnDelta {
                    nullability_changed: true,
                    ..ColumnDelta::default()
                },
            )
        });
        (steps, not_null)
    }

    fn rebuild(&self, table: &str) -> Result<Rebuild> {
        let key = name_key(table);
        let old = self
            .current
            .get_table(table)
            .cloned()
            .ok_or_else(|| crate::error::SyncError::missing_table(table))?;

        let mut state = ModelState::new(self.current.clone());
        let mut ordered: Vec<&Change> = self
            .changes
            .iter()
            .filter(|c| c.table().is_some_and(|t| name_key(t) == key))
            .filter(|c| {
                matches!(
                    c,
                    Change::RemoveForeignKey { .. }
                        | Change::RemoveIndex { .. }
                        | Change::RemoveCheck { .. }
                        | Change::RemoveColumn { .. }
                        | Change::ColumnDefinitionChange { .. }
                        | Change::AddColumn { .. }
                        | Change::ColumnOrderChange { .. }
                        | Change::PrimaryKeyChange { .. }
                )
            })
            .collect();
        ordered.sort_by_key(|c| match c {
            Change::RemoveForeignKey { .. }
            | Change::RemoveIndex { .. }
            | Change::RemoveCheck { .. }
            | Change::RemoveColumn { .. } => (0, 0),
            Change::ColumnDefinitionChange { .. } => (1, 0),
            Change::AddColumn { position, .. } => (2, *position),
            Change::ColumnOrderChange { .. } => (3, 0),
            _ => (4, 0),
        });
        state.apply_all(ordered)?;

        let mut new = state
            .model()
            .get_table(table)
            .cloned()
            .ok_or_else(|| crate::error::SyncError::missing_table(table))?;
        new.foreign_keys.clear();
        new.rows = None;

        let desired = self.desired.get_table(table);
        if let Some(desired) = desired {
            new.module.clone_from(&desired.module);
            new.row_filter.clone_from(&desired.row_filter);
        }
        let initial_values = new
            .columns
            .iter()
            .filter(|c| old.get_column(&c.name).is_none())
            .filter_map(|c| c.initial_value().map(|v| (c.name.clone(), v.to_string())))
            .collect();
        let predicate = desired.and_then(|t| table_predicate(t, self.planner.filter.as_ref()));

        debug!(table = %table, "Table requires rebuild");
        Ok(Rebuild {
            old,
            new,
            initial_values,
            predicate,
        })
    }

    // ---- Data -----------------------------------------------------------

    fn data(&mut self) {
        let mut deletes: BTreeMap<String, Vec<Step>> = BTreeMap::new();
        let mut upserts: BTreeMap<String, Vec<Step>> = BTreeMap::new();
        let mut names: BTreeMap<String, String> = BTreeMap::new();

        for change in self.changes {
            let Some(table) = change.table() else { continue };
            let target = match change {
                Change::RemoveRow { .. } => &mut deletes,
                Change::AddRow { .. } | Change::ColumnDataChange { .. } => &mut upserts,
                _ => continue,
            };
            names.entry(name_key(table)).or_insert_with(|| table.to_string());
            target
                .entry(name_key(table))
                .or_default()
                .push(Step::Change(change.clone()));
        }
        if names.is_empty() {
            return;
        }

        let order: Vec<String> = if self.planner.options.ensure_foreign_key_order {
            let tables: Vec<&Table> = names
                .values()
                .filter_map(|n| self.desired.get_table(n).or_else(|| self.current.get_table(n)))
                .collect();
            dependency_order(&tables).order.iter().map(|n| name_key(n)).collect()
        } else {
            names.keys().cloned().collect()
        };

        for key in order.iter().rev() {
            if let Some(steps) = deletes.remove(key) {
                self.push_unit(Phase::Data, names.get(key).map(String::as_str), steps);
            }
        }
        for key in &order {
            if let Some(steps) = upserts.remove(key) {
                self.push_unit(Phase::Data, names.get(key).map(String::as_str), steps);
            }
        }
    }

    // ---- Additions ------------------------------------------------------

    fn additions(&mut self) {
        let mut constraints: Vec<(String, u8, Step)> = Vec::new();
        let mut foreign_keys: Vec<(String, ForeignKey)> = Vec::new();

        let changes = self.changes;
        for change in changes {
            match change {
                Change::AddFunction { .. } => {
                    self.push_step(Phase::Routines, None, Step::Change(change.clone()));
                }
                Change::AddIndex { table, .. } => {
                    constraints.push((name_key(table), 0, Step::Change(change.clone())));
                }
                Change::AddCheck { table, .. } => {
                    constraints.push((name_key(table), 1, Step::Change(change.clone())));
                }
                Change::AddTrigger { trigger } => {
                    constraints.push((name_key(&trigger.table), 2, Step::Change(change.clone())));
                }
                Change::AddForeignKey { table, foreign_key } => {
                    foreign_keys.push((table.clone(), foreign_key.clone()));
                }
                Change::AddView { .. } => {
                    self.push_step(Phase::Views, None, Step::Change(change.clone()));
                }
                _ => {}
            }
        }
        for view in std::mem::take(&mut self.view_adds) {
            self.push_step(Phase::Views, None, Step::Change(Change::AddView { view }));
        }
        for (table, check) in &self.check_adds {
            constraints.push((
                name_key(table),
                1,
                Step::Change(Change::add_check(table, check.clone())),
            ));
        }
        for trigger in &self.trigger_adds {
            constraints.push((
                name_key(&trigger.table),
                2,
                Step::Change(Change::AddTrigger {
                    trigger: trigger.clone(),
                }),
            ));
        }
        constraints.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        for (_, _, step) in constraints {
            let table = step.table().map(ToString::to_string);
            self.push_step(Phase::AddConstraints, table.as_deref(), step);
        }

        foreign_keys.extend(self.fk_adds.iter().cloned());
        self.foreign_keys(foreign_keys);
    }

    /// Foreign keys in dependency order of their source tables; tables on
    /// a reference cycle come last, by name.
    fn foreign_keys(&mut self, foreign_keys: Vec<(String, ForeignKey)>) {
        let mut by_table: BTreeMap<String, Vec<(String, ForeignKey)>> = BTreeMap::new();
        for (table, fk) in foreign_keys {
            by_table.entry(name_key(&table)).or_default().push((table, fk));
        }
        let tables: Vec<&Table> = self.desired.tables.iter().collect();
        let dependency = dependency_order(&tables);
        let mut order: Vec<String> = dependency
            .order
            .iter()
            .map(|n| name_key(n))
            .filter(|k| by_table.contains_key(k))
            .collect();
        let rest: Vec<String> = by_table
            .keys()
            .filter(|k| !order.contains(k))
            .cloned()
            .collect();
        order.extend(rest);

        for key in order {
            if let Some(mut fks) = by_table.remove(&key) {
                fks.sort_by_key(|(_, fk)| name_key(&fk.name));
                let table = fks[0].0.clone();
                let steps = fks
                    .into_iter()
                    .map(|(t, fk)| Step::Change(Change::add_foreign_key(t, fk)))
                    .collect();
                self.push_unit(Phase::ForeignKeys, Some(&table), steps);
            }
        }
    }

    // ---- Batches ---------------------------------------------------------

    fn finish(self) -> MigrationPlan {
        let batches = self
            .batches
            .iter()
            .filter(|(_, units)| !units.is_empty())
            .map(|(phase, units)| {
                let mut batch = Batch {
                    phase: *phase,
                    units: units.clone(),
                    destructive: false,
                    parallel_eligible: false,
                    guard: ConstraintGuard::default(),
                };
                let destructive = batch.steps().any(|s| {
                    matches!(s, Step::Rebuild(_))
                        || matches!(s, Step::Change(c) if c.is_destructive() && !matches!(c, Change::RemoveRow { .. }))
                });
                batch.destructive = destructive;
                batch.parallel_eligible = self.parallel_eligible(&batch);
                batch.guard = self.guard(&batch);
                batch
            })
            .collect();
        MigrationPlan { batches }
    }

    fn parallel_eligible(&self, batch: &Batch) -> bool {
        if batch.units.len() < 2
            || !matches!(batch.phase, Phase::AddConstraints | Phase::ForeignKeys)
        {
            return false;
        }
        let modifies: Vec<BTreeSet<String>> = batch
            .units
            .iter()
            .map(|u| u.steps.iter().filter_map(Step::table).map(name_key).collect())
            .collect();
        let touches: Vec<BTreeSet<String>> = batch
            .units
            .iter()
            .zip(&modifies)
            .map(|(unit, own)| {
                let mut all = own.clone();
                for step in &unit.steps {
                    if let Step::Change(Change::AddForeignKey { foreign_key, .. }) = step {
                        all.insert(name_key(&foreign_key.foreign_table));
                    }
                }
                all
            })
            .collect();

        (0..batch.units.len()).all(|i| {
            (0..batch.units.len())
                .filter(|j| *j != i)
                .all(|j| touches[i].is_disjoint(&modifies[j]))
        })
    }

    fn guard(&self, batch: &Batch) -> ConstraintGuard {
        let mut guard = ConstraintGuard::default();
        let tables: BTreeSet<String> = batch
            .tables()
            .into_iter()
            .filter(|t| !self.removed_tables.contains(t) && !self.added_tables.contains(t))
            .collect();

        let dropped_fks: BTreeSet<ConstraintKey> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::RemoveForeignKey { table, foreign_key } => {
                    Some(constraint_key(table, &foreign_key.name))
                }
                _ => None,
            })
            .chain(self.fk_drops.iter().map(|(t, fk)| constraint_key(t, &fk.name)))
            .collect();
        let dropped_triggers: BTreeSet<String> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::RemoveTrigger { trigger } => Some(name_key(&trigger.name)),
                _ => None,
            })
            .chain(self.trigger_drops.iter().map(|t| name_key(&t.name)))
            .collect();
        let dropped_checks: BTreeSet<ConstraintKey> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::RemoveCheck { table, check } => Some(constraint_key(table, &check.name)),
                _ => None,
            })
            .chain(self.check_drops.iter().map(|(t, c)| constraint_key(t, &c.name)))
            .collect();

        let surviving_triggers = |table: &String| {
            self.current
                .triggers_on(table)
                .filter(|t| !dropped_triggers.contains(&name_key(&t.name)))
                .cloned()
                .collect::<Vec<_>>()
        };

        let column_drops: BTreeSet<String> = batch
            .steps()
            .filter_map(|s| match s {
                Step::Change(Change::RemoveColumn { table, .. }) => Some(name_key(table)),
                _ => None,
            })
            .collect();

        match batch.phase {
            Phase::Data => {
                for table in &tables {
                    guard.triggers.extend(surviving_triggers(table));
                    if self.planner.options.ensure_foreign_key_order {
                        continue;
                    }
                    if let Some(t) = self.current.get_table(table) {
                        for fk in &t.foreign_keys {
                            if !dropped_fks.contains(&constraint_key(&t.name, &fk.name)) {
                                guard.foreign_keys.push((t.name.clone(), fk.clone()));
                            }
                        }
                    }
                }
            }
            Phase::DropObjects => {
                for table in tables.intersection(&column_drops) {
                    guard.triggers.extend(surviving_triggers(table));
                    for (source, fk) in self.current.referencing_foreign_keys(table) {
                        let key = constraint_key(&source.name, &fk.name);
                        if !dropped_fks.contains(&key)
                            && !self.removed_tables.contains(&name_key(&source.name))
                        {
                            guard.foreign_keys.push((source.name.clone(), fk.clone()));
                        }
                    }
                    if self.planner.platform.constraint_toggle == ConstraintToggle::DisableEnable {
                        if let Some(t) = self.current.get_table(table) {
                            for check in &t.checks {
                                if !dropped_checks.contains(&constraint_key(&t.name, &check.name)) {
                                    guard.checks.push((t.name.clone(), check.clone()));
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ModelComparator;
    use crate::dataset::StaticDatasetFilter;
    use crate::model::{Index, TriggerEvent};
    use crate::types::TypeCode;
    use crate::value::Row;

    fn parent() -> Table {
        Table::new("M_PRODUCT")
            .column(Column::new("M_PRODUCT_ID", TypeCode::Varchar).size(32).not_null())
            .column(Column::new("NAME", TypeCode::Varchar).size(60).not_null())
            .primary_key("M_PRODUCT_KEY", &["M_PRODUCT_ID"])
    }

    fn child() -> Table {
        Table::new("C_ORDERLINE")
            .column(Column::new("C_ORDERLINE_ID", TypeCode::Varchar).size(32).not_null())
            .column(Column::new("M_PRODUCT_ID", TypeCode::Varchar).size(32))
            .primary_key("C_ORDERLINE_KEY", &["C_ORDERLINE_ID"])
            .foreign_key(
                ForeignKey::new("C_ORDERLINE_PRODUCT", "M_PRODUCT")
                    .reference("M_PRODUCT_ID", "M_PRODUCT_ID"),
            )
    }

    fn plan_for(current: &Database, desired: &Database, planner: &Planner) -> MigrationPlan {
        let changes = ModelComparator::new(PlatformInfo::postgresql()).compare(current, desired);
        planner.plan(current, desired, &changes).unwrap()
    }

    fn pg_planner() -> Planner {
        Planner::new(PlatformInfo::postgresql())
    }

    fn position(plan: &MigrationPlan, pred: impl Fn(&Step) -> bool) -> usize {
        plan.steps().position(pred).unwrap()
    }

    #[test]
    fn test_empty_changes_empty_plan() {
        let m = Database::new("m").table(parent()).pre_script("ext", "SELECT 1");
        let plan = pg_planner().plan(&m, &m, &[]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_tables_before_foreign_keys() {
        let desired = Database::new("d").table(child()).table(parent());
        let plan = plan_for(&Database::new("c"), &desired, &pg_planner());

        let create_parent = position(&plan, |s| {
            matches!(s, Step::Change(Change::AddTable { table }) if table.name == "M_PRODUCT")
        });
        let create_child = position(&plan, |s| {
            matches!(s, Step::Change(Change::AddTable { table }) if table.name == "C_ORDERLINE")
        });
        let add_fk = position(&plan, |s| matches!(s, Step::Change(Change::AddForeignKey { .. })));
        assert!(create_parent < create_child);
        assert!(create_child < add_fk);
        assert_eq!(plan.batches.last().unwrap().phase, Phase::ForeignKeys);
    }

    #[test]
    fn test_drop_foreign_key_before_table() {
        let current = Database::new("c").table(parent()).table(child());
        let desired = Database::new("d").table(parent());
        let plan = plan_for(&current, &desired, &pg_planner());

        let drop_fk = position(&plan, |s| matches!(s, Step::Change(Change::RemoveForeignKey { .. })));
        let drop_table = position(&plan, |s| matches!(s, Step::Change(Change::RemoveTable { .. })));
        assert!(drop_fk < drop_table);
    }

    #[test]
    fn test_not_null_column_three_steps() {
        let current = Database::new("c").table(parent());
        let mut desired = current.clone();
        desired.tables[0].columns.push(
            Column::new("ISACTIVE", TypeCode::Char)
                .size(1)
                .not_null()
                .default("'Y'")
                .on_create_default("'N'"),
        );
        let plan = plan_for(&current, &desired, &pg_planner());
        let steps: Vec<&Step> = plan.steps().collect();

        assert_eq!(steps.len(), 4);
        assert!(matches!(steps[0], Step::Change(Change::AddColumn { column, .. }) if column.nullable && column.default.is_none()));
        assert!(matches!(steps[1], Step::Backfill(b) if b.value == "'N'" && b.predicate.is_none()));
        assert!(matches!(steps[2], Step::Change(Change::ColumnDefinitionChange { delta, .. }) if delta.default_changed));
        assert!(matches!(steps[3], Step::Change(Change::ColumnDefinitionChange { delta, new, .. }) if delta.nullability_changed && !new.nullable));
    }

    #[test]
    fn test_not_null_with_default_collapses() {
        let current = Database::new("c").table(parent());
        let mut desired = current.clone();
        desired.tables[0]
            .columns
            .push(Column::new("ISACTIVE", TypeCode::Char).size(1).not_null().default("'Y'"));
        let plan = plan_for(&current, &desired, &pg_planner());
        let steps: Vec<&Step> = plan.steps().collect();

        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Change(Change::AddColumn { column, .. }) if column.default.as_deref() == Some("'Y'") && column.nullable));
        assert!(matches!(steps[1], Step::Change(Change::ColumnDefinitionChange { delta, .. }) if delta.nullability_changed));
    }

    #[test]
    fn test_not_null_waits_for_managed_rows() {
        let mut current = Database::new("c").table(parent().module("core"));
        current.tables[0].rows = Some(vec![
            Row::new().with("M_PRODUCT_ID", "1").with("NAME", "A"),
            Row::new().with("M_PRODUCT_ID", "2").with("NAME", "B"),
        ]);
        let mut desired = current.clone();
        desired.tables[0].columns.push(
            Column::new("ISACTIVE", TypeCode::Char)
                .size(1)
                .not_null()
                .default("'Y'"),
        );
        desired.tables[0].rows = Some(vec![
            Row::new().with("M_PRODUCT_ID", "1").with("NAME", "A").with("ISACTIVE", "Y"),
            Row::new().with("M_PRODUCT_ID", "2").with("NAME", "B").with("ISACTIVE", "N"),
        ]);
        let filter = StaticDatasetFilter::new().module("core", "M_PRODUCT_ID = '1'");
        let planner = pg_planner().with_dataset_filter(Arc::new(filter));
        let plan = plan_for(&current, &desired, &planner);

        let fill = position(&plan, |s| {
            matches!(s, Step::Change(Change::ColumnDataChange { key, .. }) if key.text("M_PRODUCT_ID") == Some("2"))
        });
        let not_null = position(&plan, |s| {
            matches!(s, Step::Change(Change::ColumnDefinitionChange { delta, .. }) if delta.nullability_changed)
        });
        assert!(fill < not_null);
        let phases: Vec<Phase> = plan.batches.iter().map(|b| b.phase).collect();
        assert_eq!(phases, vec![Phase::Structure, Phase::Data, Phase::NotNull]);
    }

    #[test]
    fn test_empty_table_single_add() {
        let current = Database::new("c").table(parent());
        let mut desired = current.clone();
        desired.tables[0]
            .columns
            .push(Column::new("ISACTIVE", TypeCode::Char).size(1).not_null().default("'Y'"));
        let planner = pg_planner().with_options(PlanOptions::default().empty_table("m_product"));
        let plan = plan_for(&current, &desired, &planner);
        assert_eq!(plan.step_count(), 1);
    }

    #[test]
    fn test_dataset_filter_scopes_backfill() {
        let current = Database::new("c").table(parent().module("core"));
        let mut desired = current.clone();
        desired.tables[0].columns.push(
            Column::new("ISACTIVE", TypeCode::Char)
                .size(1)
                .not_null()
                .default("'Y'"),
        );
        let filter = StaticDatasetFilter::new().module("core", "AD_CLIENT_ID = '0'");
        let planner = pg_planner().with_dataset_filter(Arc::new(filter));
        let plan = plan_for(&current, &desired, &planner);

        let backfill = plan
            .steps()
            .find_map(|s| match s {
                Step::Backfill(b) => Some(b),
                _ => None,
            })
            .unwrap();
        assert_eq!(backfill.predicate.as_deref(), Some("AD_CLIENT_ID = '0'"));
        assert_eq!(backfill.value, "'Y'");
    }

    #[test]
    fn test_pre_scripts_first() {
        let current = Database::new("c");
        let desired = Database::new("d")
            .pre_script("citext", "CREATE EXTENSION IF NOT EXISTS citext")
            .table(
                Table::new("AD_USER")
                    .column(Column::new("EMAIL", TypeCode::Other("citext".into()))),
            );
        let plan = plan_for(&current, &desired, &pg_planner());
        assert_eq!(plan.batches[0].phase, Phase::PreScripts);
        assert!(matches!(plan.steps().next(), Some(Step::PreScript(_))));
    }

    #[test]
    fn test_primary_key_change_drops_incoming_foreign_keys() {
        let current = Database::new("c").table(parent()).table(child());
        let mut desired = current.clone();
        desired.tables[0].primary_key = Some(crate::model::PrimaryKey::new(
            "M_PRODUCT_KEY",
            &["M_PRODUCT_ID", "NAME"],
        ));
        let plan = plan_for(&current, &desired, &pg_planner());

        let drop_fk = position(&plan, |s| matches!(s, Step::Change(Change::RemoveForeignKey { .. })));
        let pk = position(&plan, |s| matches!(s, Step::Change(Change::PrimaryKeyChange { .. })));
        let add_fk = position(&plan, |s| matches!(s, Step::Change(Change::AddForeignKey { .. })));
        assert!(drop_fk < pk && pk < add_fk);
    }

    #[test]
    fn test_narrowing_rebuild_recreates_dependents() {
        let trigger = Trigger::new("M_PRODUCT_TRG", "M_PRODUCT", &[TriggerEvent::Insert], "BEGIN END;");
        let current = Database::new("c")
            .table(parent().index(Index::new("M_PRODUCT_NAME", &["NAME"])))
            .table(child())
            .trigger(trigger);
        let mut desired = current.clone();
        desired.tables[0].columns[1].size = Some(40);
        let plan = plan_for(&current, &desired, &pg_planner());

        let rebuild = plan
            .steps()
            .find_map(|s| match s {
                Step::Rebuild(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(rebuild.new.columns[1].size, Some(40));
        assert_eq!(rebuild.new.indexes.len(), 1);

        let drop_fk = position(&plan, |s| matches!(s, Step::Change(Change::RemoveForeignKey { .. })));
        let drop_trg = position(&plan, |s| matches!(s, Step::Change(Change::RemoveTrigger { .. })));
        let rebuilt = position(&plan, |s| matches!(s, Step::Rebuild(_)));
        let add_trg = position(&plan, |s| matches!(s, Step::Change(Change::AddTrigger { .. })));
        let add_fk = position(&plan, |s| matches!(s, Step::Change(Change::AddForeignKey { .. })));
        assert!(drop_fk < rebuilt && drop_trg < rebuilt);
        assert!(rebuilt < add_trg && rebuilt < add_fk);
        assert!(plan
            .batches
            .iter()
            .any(|b| b.phase == Phase::Structure && b.destructive));
    }

    #[test]
    fn test_rows_parent_first() {
        let mut current = Database::new("c").table(parent()).table(child());
        current.tables[0].rows = Some(Vec::new());
        current.tables[1].rows = Some(vec![Row::new().with("C_ORDERLINE_ID", "9")]);
        let mut desired = current.clone();
        desired.tables[0].rows = Some(vec![Row::new().with("M_PRODUCT_ID", "1").with("NAME", "A")]);
        desired.tables[1].rows = Some(vec![Row::new()
            .with("C_ORDERLINE_ID", "2")
            .with("M_PRODUCT_ID", "1")]);
        let plan = plan_for(&current, &desired, &pg_planner());

        let data = plan.batches.iter().find(|b| b.phase == Phase::Data).unwrap();
        let tables: Vec<&str> = data.units.iter().filter_map(|u| u.table.as_deref()).collect();
        assert_eq!(tables, vec!["C_ORDERLINE", "M_PRODUCT", "C_ORDERLINE"]);
        assert!(matches!(&data.units[0].steps[0], Step::Change(Change::RemoveRow { .. })));
    }

    #[test]
    fn test_column_drop_batch_guard() {
        let trigger = Trigger::new("M_PRODUCT_TRG", "M_PRODUCT", &[TriggerEvent::Insert], "BEGIN END;");
        let mut with_extra = parent();
        with_extra.columns.push(Column::new("OLD_COL", TypeCode::Integer));
        let current = Database::new("c").table(with_extra).table(child()).trigger(trigger.clone());
        let desired = Database::new("d").table(parent()).table(child()).trigger(trigger);
        let plan = plan_for(&current, &desired, &pg_planner());

        let batch = plan.batches.iter().find(|b| b.phase == Phase::DropObjects).unwrap();
        assert!(batch.destructive);
        assert_eq!(batch.guard.triggers.len(), 1);
        assert_eq!(batch.guard.foreign_keys.len(), 1);
    }

    #[test]
    fn test_parallel_eligibility() {
        let desired = Database::new("d")
            .table(parent().index(Index::new("M_PRODUCT_NAME", &["NAME"])))
            .table(Table::new("C_TAX").column(Column::new("NAME", TypeCode::Varchar).size(60)).index(Index::new("C_TAX_NAME", &["NAME"])));
        let plan = plan_for(&Database::new("c"), &desired, &pg_planner());
        let batch = plan.batches.iter().find(|b| b.phase == Phase::AddConstraints).unwrap();
        assert!(batch.parallel_eligible);

        let chain = Database::new("d").table(parent()).table(child());
        let plan = plan_for(&Database::new("c"), &chain, &pg_planner());
        let structure = plan.batches.iter().find(|b| b.phase == Phase::Structure).unwrap();
        assert!(!structure.parallel_eligible);
    }
}
