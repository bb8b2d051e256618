//! Data-migration statements run against in-memory SQLite.

use std::sync::Arc;

use schemasync::prelude::*;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn memory_pool() -> SqlitePool {
    // One connection, so every statement sees the same in-memory database.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

fn product() -> Table {
    Table::new("M_PRODUCT")
        .column(Column::new("M_PRODUCT_ID", TypeCode::Varchar).size(32).not_null())
        .column(Column::new("AD_CLIENT_ID", TypeCode::Varchar).size(32).not_null())
        .primary_key("M_PRODUCT_KEY", &["M_PRODUCT_ID"])
}

async fn seed(conn: &mut impl SqlConnection) {
    conn.execute(
        "CREATE TABLE M_PRODUCT (M_PRODUCT_ID VARCHAR(32) NOT NULL PRIMARY KEY, \
         AD_CLIENT_ID VARCHAR(32) NOT NULL)",
    )
    .await
    .unwrap();
    conn.execute("INSERT INTO M_PRODUCT VALUES ('1', '0'), ('2', '1000')")
        .await
        .unwrap();
}

/// Runs the column additions and backfills of a plan; the remaining
/// statements use ALTER COLUMN forms SQLite lacks.
async fn run_row_steps(conn: &mut impl SqlConnection, plan: &MigrationPlan) {
    let builder = SqlBuilder::new(PlatformInfo::postgresql());
    for step in plan.steps() {
        let runnable = matches!(
            step,
            Step::Backfill(_) | Step::Change(Change::AddColumn { .. })
        );
        if runnable {
            for sql in builder.render(step).unwrap() {
                conn.execute(&sql).await.unwrap();
            }
        }
    }
}

async fn values(conn: &mut impl SqlConnection) -> Vec<Option<String>> {
    conn.query("SELECT M_PRODUCT_ID, ISACTIVE FROM M_PRODUCT ORDER BY M_PRODUCT_ID")
        .await
        .unwrap()
        .iter()
        .map(|r| r.text("ISACTIVE").map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_backfill_only_touches_managed_rows() {
    let pool = memory_pool().await;
    let mut conn = ConnectionPool::acquire(&pool).await.unwrap();
    seed(&mut conn).await;

    let current = Database::new("live").table(product());
    let mut desired = current.clone();
    desired.tables[0].columns.push(
        Column::new("ISACTIVE", TypeCode::Char)
            .size(1)
            .not_null()
            .default("'Y'"),
    );
    let changes = ModelComparator::new(PlatformInfo::postgresql()).compare(&current, &desired);
    let plan = Planner::new(PlatformInfo::postgresql())
        .with_dataset_filter(Arc::new(
            StaticDatasetFilter::new().table("M_PRODUCT", "AD_CLIENT_ID = '0'"),
        ))
        .plan(&current, &desired, &changes)
        .unwrap();

    run_row_steps(&mut conn, &plan).await;

    assert_eq!(values(&mut conn).await, vec![Some("Y".to_string()), None]);
}

#[tokio::test]
async fn test_on_create_default_fills_existing_rows() {
    let pool = memory_pool().await;
    let mut conn = ConnectionPool::acquire(&pool).await.unwrap();
    seed(&mut conn).await;

    let current = Database::new("live").table(product());
    let mut desired = current.clone();
    desired.tables[0].columns.push(
        Column::new("ISACTIVE", TypeCode::Char)
            .size(1)
            .default("'A'")
            .on_create_default("'B'"),
    );
    let comparator = ModelComparator::new(PlatformInfo::postgresql());
    let changes = comparator.compare(&current, &desired);
    let plan = Planner::new(PlatformInfo::postgresql())
        .plan(&current, &desired, &changes)
        .unwrap();

    run_row_steps(&mut conn, &plan).await;
    assert_eq!(
        values(&mut conn).await,
        vec![Some("B".to_string()), Some("B".to_string())]
    );

    // Replaying the plan on the model leaves nothing to do.
    let mut state = ModelState::new(current);
    for step in plan.steps() {
        step.apply_to(&mut state).unwrap();
    }
    assert!(comparator.compare(state.model(), &desired).is_empty());
}

#[tokio::test]
async fn test_new_table_rows_take_on_create_default() {
    let pool = memory_pool().await;
    let mut conn = ConnectionPool::acquire(&pool).await.unwrap();

    let desired = Database::new("model").table(
        Table::new("T")
            .column(Column::new("ID", TypeCode::Varchar).size(32).not_null())
            .column(
                Column::new("M4", TypeCode::Char)
                    .size(1)
                    .default("'A'")
                    .on_create_default("'B'"),
            )
            .primary_key("T_KEY", &["ID"])
            .row(Row::new().with("ID", "1")),
    );
    let current = Database::new("live");
    let comparator = ModelComparator::new(PlatformInfo::postgresql());
    let changes = comparator.compare(&current, &desired);
    let plan = Planner::new(PlatformInfo::postgresql())
        .plan(&current, &desired, &changes)
        .unwrap();

    let builder = SqlBuilder::new(PlatformInfo::postgresql());
    for step in plan.steps() {
        for sql in builder.render(step).unwrap() {
            conn.execute(&sql).await.unwrap();
        }
    }
    // Rows inserted later by other means still get the standing default.
    conn.execute("INSERT INTO T (ID) VALUES ('2')").await.unwrap();

    let rows = conn.query("SELECT ID, M4 FROM T ORDER BY ID").await.unwrap();
    let m4: Vec<Option<&str>> = rows.iter().map(|r| r.text("M4")).collect();
    assert_eq!(m4, vec![Some("B"), Some("A")]);

    let mut state = ModelState::new(current);
    for step in plan.steps() {
        step.apply_to(&mut state).unwrap();
    }
    assert!(comparator.compare(state.model(), &desired).is_empty());
}
