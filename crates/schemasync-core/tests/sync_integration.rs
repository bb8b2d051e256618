//! End-to-end tests: compare two models, plan the changes, render SQL and
//! replay the plan on the current model.

use std::sync::Arc;

use schemasync_core::prelude::*;

// =============================================================================
// Models
// =============================================================================

fn client() -> Table {
    Table::new("AD_CLIENT")
        .column(Column::new("AD_CLIENT_ID", TypeCode::Varchar).size(32).not_null())
        .column(Column::new("NAME", TypeCode::Varchar).size(60).not_null())
        .primary_key("AD_CLIENT_KEY", &["AD_CLIENT_ID"])
        .module("core")
}

fn org() -> Table {
    Table::new("AD_ORG")
        .column(Column::new("AD_ORG_ID", TypeCode::Varchar).size(32).not_null())
        .column(Column::new("AD_CLIENT_ID", TypeCode::Varchar).size(32).not_null())
        .column(Column::new("NAME", TypeCode::Varchar).size(60).not_null())
        .primary_key("AD_ORG_KEY", &["AD_ORG_ID"])
        .foreign_key(
            ForeignKey::new("AD_ORG_CLIENT", "AD_CLIENT").reference("AD_CLIENT_ID", "AD_CLIENT_ID"),
        )
        .index(Index::new("AD_ORG_NAME", &["NAME"]))
        .module("core")
}

fn model() -> Database {
    Database::new("model")
        .table(org())
        .table(client())
        .sequence(Sequence {
            name: "AD_SEQUENCE_NO".into(),
            start: 1000,
            increment: 1,
        })
        .view(View {
            name: "AD_ORG_V".into(),
            statement: "SELECT AD_ORG_ID, NAME FROM AD_ORG".into(),
        })
}

/// Compares, plans and replays; returns the plan and the resulting model.
fn migrate(platform: &PlatformInfo, current: &Database, desired: &Database) -> (MigrationPlan, Database) {
    let changes = ModelComparator::new(platform.clone()).compare(current, desired);
    let plan = Planner::new(platform.clone())
        .plan(current, desired, &changes)
        .unwrap();
    let mut state = ModelState::new(current.clone());
    for step in plan.steps() {
        step.apply_to(&mut state).unwrap();
    }
    (plan, state.into_model())
}

fn position(plan: &MigrationPlan, pred: impl Fn(&Step) -> bool) -> usize {
    plan.steps().position(pred).unwrap()
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_model_compared_with_itself_is_empty() {
    let model = model();
    for platform in [PlatformInfo::oracle(), PlatformInfo::postgresql()] {
        let changes = ModelComparator::new(platform).compare(&model, &model);
        assert!(changes.is_empty());
    }
}

#[test]
fn test_applied_plan_is_idempotent() {
    let platform = PlatformInfo::postgresql();
    let (plan, migrated) = migrate(&platform, &Database::new("live"), &model());
    assert!(!plan.is_empty());

    let again = ModelComparator::new(platform).compare(&migrated, &model());
    assert!(again.is_empty(), "unexpected changes: {again:?}");
}

#[test]
fn test_foreign_keys_follow_both_tables() {
    let platform = PlatformInfo::oracle();
    let (plan, _) = migrate(&platform, &Database::new("live"), &model());

    let add_fk = position(&plan, |s| {
        matches!(s, Step::Change(Change::AddForeignKey { .. }))
    });
    for table in ["AD_CLIENT", "AD_ORG"] {
        let create = position(&plan, |s| {
            matches!(s, Step::Change(Change::AddTable { table: t }) if t.name == table)
        });
        assert!(create < add_fk);
    }
    let view = position(&plan, |s| matches!(s, Step::Change(Change::AddView { .. })));
    assert!(add_fk < view);
}

#[test]
fn test_not_null_column_backfilled_before_constraint() {
    let platform = PlatformInfo::postgresql();
    let current = model();
    let mut desired = model();
    desired.get_table_mut("AD_CLIENT").unwrap().columns.push(
        Column::new("ISACTIVE", TypeCode::Char)
            .size(1)
            .not_null()
            .default("'Y'")
            .on_create_default("'N'"),
    );
    let (plan, migrated) = migrate(&platform, &current, &desired);

    let add = position(&plan, |s| matches!(s, Step::Change(Change::AddColumn { .. })));
    let fill = position(&plan, |s| matches!(s, Step::Backfill(b) if b.value == "'N'"));
    let not_null = position(&plan, |s| {
        matches!(s, Step::Change(Change::ColumnDefinitionChange { new, delta, .. }) if delta.nullability_changed && !new.nullable)
    });
    assert!(add < fill && fill < not_null);

    let script = SqlBuilder::new(platform.clone()).render_script(&plan, false).unwrap();
    assert!(script.contains("ALTER TABLE AD_CLIENT ADD COLUMN ISACTIVE CHAR(1);"));
    assert!(script.contains("UPDATE AD_CLIENT SET ISACTIVE = 'N' WHERE ISACTIVE IS NULL;"));
    assert!(script.contains("ALTER TABLE AD_CLIENT ALTER COLUMN ISACTIVE SET DEFAULT 'Y';"));
    assert!(script.contains("ALTER TABLE AD_CLIENT ALTER COLUMN ISACTIVE SET NOT NULL;"));

    // The on-create default is not part of the live model, so a second run
    // finds nothing to do.
    let again = ModelComparator::new(platform).compare(&migrated, &desired);
    assert!(again.is_empty(), "unexpected changes: {again:?}");
}

#[test]
fn test_dataset_filter_scopes_backfill_sql() {
    let platform = PlatformInfo::oracle();
    let current = model();
    let mut desired = model();
    desired.get_table_mut("AD_CLIENT").unwrap().columns.push(
        Column::new("ISACTIVE", TypeCode::Char).size(1).not_null().default("'Y'"),
    );
    let filter = StaticDatasetFilter::new().module("core", "AD_CLIENT_ID = '0'");
    let changes = ModelComparator::new(platform.clone()).compare(&current, &desired);
    let plan = Planner::new(platform.clone())
        .with_dataset_filter(Arc::new(filter))
        .plan(&current, &desired, &changes)
        .unwrap();

    let script = SqlBuilder::new(platform).render_script(&plan, false).unwrap();
    assert!(script.contains("ALTER TABLE AD_CLIENT ADD (ISACTIVE CHAR(1));"));
    assert!(script.contains(
        "UPDATE AD_CLIENT SET ISACTIVE = 'Y' WHERE ISACTIVE IS NULL AND (AD_CLIENT_ID = '0');"
    ));
    assert!(script.contains("ALTER TABLE AD_CLIENT MODIFY (ISACTIVE NOT NULL);"));
}

#[test]
fn test_column_order_ignored_unless_managed() {
    let current = model();
    let mut desired = model();
    desired.get_table_mut("AD_ORG").unwrap().columns.swap(1, 2);

    let unmanaged = ModelComparator::new(PlatformInfo::postgresql()).compare(&current, &desired);
    assert!(unmanaged.is_empty());

    let platform = PlatformInfo::postgresql().column_order_managed(true);
    let (plan, migrated) = migrate(&platform, &current, &desired);
    assert!(plan.steps().any(|s| matches!(s, Step::Rebuild(_))));
    let names: Vec<&str> = migrated
        .get_table("AD_ORG")
        .unwrap()
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["AD_ORG_ID", "NAME", "AD_CLIENT_ID"]);
    let again = ModelComparator::new(platform).compare(&migrated, &desired);
    assert!(again.is_empty(), "unexpected changes: {again:?}");
}

#[test]
fn test_pre_script_runs_first() {
    let platform = PlatformInfo::postgresql();
    let desired = model().pre_script("uuid", "CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\"");
    let (plan, _) = migrate(&platform, &Database::new("live"), &desired);
    assert!(matches!(plan.steps().next(), Some(Step::PreScript(p)) if p.name == "uuid"));

    let script = SqlBuilder::new(platform).render_script(&plan, false).unwrap();
    let pre = script.find("CREATE EXTENSION").unwrap();
    let table = script.find("CREATE TABLE").unwrap();
    assert!(pre < table);
}

#[test]
fn test_identifier_overflow_is_an_error() {
    let platform = PlatformInfo::oracle();
    let desired = Database::new("model").table(
        Table::new("AD_TABLE_WITH_A_VERY_LONG_NAME_INDEED")
            .column(Column::new("ID", TypeCode::Integer)),
    );
    let (plan, _) = migrate(&platform, &Database::new("live"), &desired);
    let err = SqlBuilder::new(platform)
        .render_script(&plan, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::IdentifierTooLong { max: 30, .. }));
}

#[test]
fn test_partial_index_unsupported_on_oracle() {
    let mut desired = model();
    desired.get_table_mut("AD_ORG").unwrap().indexes.push(
        Index::new("AD_ORG_ACTIVE", &["NAME"]).condition("NAME IS NOT NULL"),
    );
    let platform = PlatformInfo::oracle();
    let (plan, _) = migrate(&platform, &model(), &desired);

    let builder = SqlBuilder::new(platform);
    let err = builder.render_script(&plan, false).unwrap_err();
    assert!(matches!(err, SyncError::UnsupportedChange { .. }));
    let script = builder.render_script(&plan, true).unwrap();
    assert!(script.contains("-- skipped:"));
}

#[test]
fn test_seed_rows_parent_first() {
    let platform = PlatformInfo::postgresql();
    let mut current = model();
    for table in &mut current.tables {
        table.rows = Some(Vec::new());
    }
    let mut desired = current.clone();
    desired.get_table_mut("AD_CLIENT").unwrap().rows = Some(vec![Row::new()
        .with("AD_CLIENT_ID", "0")
        .with("NAME", "System")]);
    desired.get_table_mut("AD_ORG").unwrap().rows = Some(vec![Row::new()
        .with("AD_ORG_ID", "0")
        .with("AD_CLIENT_ID", "0")
        .with("NAME", "*")]);

    let (plan, migrated) = migrate(&platform, &current, &desired);
    let script = SqlBuilder::new(platform.clone()).render_script(&plan, false).unwrap();
    let client = script.find("INSERT INTO AD_CLIENT").unwrap();
    let org = script.find("INSERT INTO AD_ORG").unwrap();
    assert!(client < org);

    let again = ModelComparator::new(platform).compare(&migrated, &desired);
    assert!(again.is_empty(), "unexpected changes: {again:?}");
}

#[test]
fn test_plan_serializes() {
    let platform = PlatformInfo::postgresql();
    let (plan, _) = migrate(&platform, &Database::new("live"), &model());
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["batches"][0]["phase"], "Structure");
}
