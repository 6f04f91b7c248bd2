//! Store protocol tests against a scratch database.
//!
//! Exercises the reset protocol and the fixture loader directly, without the
//! deployment. Each test gets a fresh database from `DATABASE_URL` and creates
//! only the tables it needs, so absent tables are part of the setup.

#![cfg(feature = "database")]

use market_e2e::reset::{StatementOutcome, TruncationPlan, PLAN_VERSION};
use market_e2e::seed::{self, NewProduct, NewUser, ProductStatus, Role, SeedError, UserId};
use market_e2e::stores::{self, Store};
use sqlx::{PgConnection, PgPool};

async fn create_users_table(conn: &mut PgConnection) {
    sqlx::query(
        r#"
        CREATE TABLE users (
            id BIGSERIAL PRIMARY KEY,
            username VARCHAR(255) NOT NULL UNIQUE,
            email VARCHAR(255) NOT NULL UNIQUE,
            password VARCHAR(255) NOT NULL,
            first_name VARCHAR(255),
            last_name VARCHAR(255),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .expect("create users");
}

async fn create_user_roles_table(conn: &mut PgConnection, allowed: &str) {
    let ddl = format!(
        "CREATE TABLE user_roles (
            user_id BIGINT NOT NULL REFERENCES users(id),
            role VARCHAR(32) NOT NULL CHECK (role IN ({}))
        )",
        allowed
    );
    sqlx::query(&ddl)
        .execute(&mut *conn)
        .await
        .expect("create user_roles");
}

async fn create_catalog_tables(conn: &mut PgConnection) {
    sqlx::query(
        r#"
        CREATE TABLE shops (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            avatar_url VARCHAR(512),
            seller_id BIGINT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .expect("create shops");

    sqlx::query(
        r#"
        CREATE TABLE products (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            price DOUBLE PRECISION NOT NULL,
            image_url VARCHAR(512),
            shop_id BIGINT NOT NULL REFERENCES shops(id),
            seller_id BIGINT NOT NULL,
            status VARCHAR(32) NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .expect("create products");
}

async fn rows(conn: &mut PgConnection, table: &str) -> i64 {
    stores::count_rows(conn, table).await.expect("count rows")
}

#[sqlx::test(migrations = false)]
async fn test_reset_empties_present_tables_and_skips_absent_ones(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;
    create_user_roles_table(&mut conn, "'USER', 'SELLER', 'MODERATOR'").await;

    seed::create_user(&mut conn, &NewUser::unique("user", vec![Role::User]))
        .await
        .expect("seed user");
    assert_eq!(rows(&mut conn, "users").await, 1);
    assert_eq!(rows(&mut conn, "user_roles").await, 1);

    let plan = TruncationPlan::default();
    let report = plan.reset_store(Store::User, &mut conn).await;

    assert!(report.is_clean(), "No statement should fail: {:?}", report);
    assert_eq!(report.entries.len(), plan.tables().len());

    let truncated: Vec<&str> = report.truncated().map(|e| e.table.as_str()).collect();
    assert_eq!(truncated, vec!["user_roles", "users"]);
    assert!(report
        .entries
        .iter()
        .filter(|e| e.table != "users" && e.table != "user_roles")
        .all(|e| e.outcome == StatementOutcome::MissingTable));

    assert_eq!(rows(&mut conn, "users").await, 0);
    assert_eq!(rows(&mut conn, "user_roles").await, 0);
}

#[sqlx::test(migrations = false)]
async fn test_failed_statement_does_not_stop_reset(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    for ddl in [
        "CREATE TABLE carts (id BIGSERIAL PRIMARY KEY, user_id BIGINT NOT NULL)",
        "CREATE TABLE orders (id BIGSERIAL PRIMARY KEY, user_id BIGINT NOT NULL)",
        "INSERT INTO carts (user_id) VALUES (1), (2)",
        "INSERT INTO orders (user_id) VALUES (1)",
        // TRUNCATE rejects views, so this entry fails with something other
        // than an undefined table
        "CREATE VIEW order_summary AS SELECT * FROM orders",
    ] {
        sqlx::query(ddl).execute(&mut *conn).await.expect("setup");
    }

    let plan = TruncationPlan::new(
        PLAN_VERSION,
        vec![Store::Order],
        vec![
            "carts".to_string(),
            "order_summary".to_string(),
            "orders".to_string(),
        ],
    )
    .expect("valid plan");
    let report = plan.reset_store(Store::Order, &mut conn).await;

    let outcomes: Vec<&StatementOutcome> = report.entries.iter().map(|e| &e.outcome).collect();
    assert_eq!(outcomes[0], &StatementOutcome::Truncated);
    assert!(matches!(outcomes[1], StatementOutcome::Failed(_)), "got {:?}", outcomes[1]);
    assert_eq!(outcomes[2], &StatementOutcome::Truncated);
    assert!(!report.is_clean());
    assert_eq!(report.failures().count(), 1);

    // Truncations on either side of the failure are committed
    assert_eq!(rows(&mut conn, "carts").await, 0);
    assert_eq!(rows(&mut conn, "orders").await, 0);

    // The failed transaction was rolled back, so the connection is usable
    let one: i32 = sqlx::query_scalar("SELECT 1")
        .fetch_one(&mut *conn)
        .await
        .expect("connection should accept queries after a failed statement");
    assert_eq!(one, 1);
}

#[sqlx::test(migrations = false)]
async fn test_reset_twice_yields_same_empty_state(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;
    create_catalog_tables(&mut conn).await;

    let seller = seed::create_user(&mut conn, &NewUser::unique("seller", vec![]))
        .await
        .expect("seed seller");
    let shop = seed::create_shop(&mut conn, "E2E Shop", seller)
        .await
        .expect("seed shop");
    seed::create_product(
        &mut conn,
        &NewProduct::new("Pending Product", shop, seller, ProductStatus::Pending),
    )
    .await
    .expect("seed product");

    let plan = TruncationPlan::default();
    let first = plan.reset_store(Store::Product, &mut conn).await;
    let second = plan.reset_store(Store::Product, &mut conn).await;

    assert_eq!(first, second);
    assert!(plan
        .non_empty_tables(Store::Product, &mut conn)
        .await
        .expect("count tables")
        .is_empty());
}

#[sqlx::test(migrations = false)]
async fn test_user_is_kept_when_role_table_is_absent(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;

    let user = NewUser::unique("seller", vec![Role::Seller, Role::User]);
    let id = seed::create_user(&mut conn, &user)
        .await
        .expect("User should be created without a role table");

    assert!(id.0 > 0);
    let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(id.0)
        .fetch_one(&mut *conn)
        .await
        .expect("user row committed");
    assert_eq!(username, user.username);
}

#[sqlx::test(migrations = false)]
async fn test_failed_role_insert_rolls_back_user(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;
    create_user_roles_table(&mut conn, "'USER'").await;

    let result =
        seed::create_user(&mut conn, &NewUser::unique("moderator", vec![Role::Moderator])).await;

    assert!(matches!(result, Err(SeedError::Database { .. })));
    assert_eq!(rows(&mut conn, "users").await, 0);
}

#[sqlx::test(migrations = false)]
async fn test_fixture_error_surfaces_for_missing_table(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");

    let result = seed::create_shop(&mut conn, "E2E Shop", UserId(1)).await;

    let err = result.expect_err("shops table does not exist");
    assert!(err.to_string().contains("insert fixture shop"));
}

#[sqlx::test(migrations = false)]
async fn test_fixture_ids_are_distinct_and_positive(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;

    let mut ids = Vec::new();
    for (kind, role) in [("user", Role::User), ("seller", Role::Seller), ("moderator", Role::Moderator)] {
        ids.push(
            seed::create_user(&mut conn, &NewUser::unique(kind, vec![role]))
                .await
                .expect("seed user"),
        );
    }

    assert!(ids.iter().all(|id| id.0 > 0));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[sqlx::test(migrations = false)]
async fn test_validate_store_reports_live_schema(pool: PgPool) {
    let mut conn = pool.acquire().await.expect("acquire");
    create_users_table(&mut conn).await;

    let plan = TruncationPlan::default();
    let report = plan
        .validate_store(Store::User, &mut conn)
        .await
        .expect("schema lookup");

    assert_eq!(report.present, vec![(Store::User, "users".to_string())]);
    assert_eq!(report.missing.len(), plan.tables().len() - 1);

    let drift = report.ensure_covered(&plan).expect_err("most tables are absent");
    assert!(drift.to_string().contains("order_items"));
}
