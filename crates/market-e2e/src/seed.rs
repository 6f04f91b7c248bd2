//! Fixture data loader.
//!
//! Inserts minimal, valid rows straight into the service databases to set up
//! preconditions that would otherwise take several gateway calls. Each
//! operation runs in one transaction: it either commits completely and
//! returns the generated id, or rolls back and returns the error.
//!
//! Rows are never cleaned up here; the next reset pass removes them.

use crate::stores;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bcrypt-shaped placeholder; fixture users never log in with a password.
pub const FIXTURE_PASSWORD_HASH: &str = "$2a$10$e2ehashedpassword";
pub const FIXTURE_PRODUCT_PRICE: f64 = 100.00;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> SeedError {
    move |source| SeedError::Database { operation, source }
}

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(UserId);
entity_id!(ShopId);
entity_id!(ProductId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Seller,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Seller => "SELLER",
            Role::Moderator => "MODERATOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "PENDING",
            ProductStatus::Approved => "APPROVED",
            ProductStatus::Rejected => "REJECTED",
        }
    }
}

/// Short random token embedded in fixture names to avoid collisions.
pub fn unique_token() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
}

impl NewUser {
    /// `e2e_<kind>_<token>` with a matching `@example.com` email.
    pub fn unique(kind: &str, roles: Vec<Role>) -> Self {
        let username = format!("e2e_{}_{}", kind, unique_token());
        Self {
            email: format!("{}@example.com", username),
            username,
            roles,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub shop_id: ShopId,
    pub seller_id: UserId,
    pub status: ProductStatus,
    pub price: f64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, shop_id: ShopId, seller_id: UserId, status: ProductStatus) -> Self {
        Self {
            name: name.into(),
            shop_id,
            seller_id,
            status,
            price: FIXTURE_PRODUCT_PRICE,
        }
    }
}

/// Commit `tx` if `result` is Ok, otherwise roll it back and pass the error on.
async fn finish<T>(
    tx: Transaction<'_, Postgres>,
    result: Result<T, SeedError>,
) -> Result<T, SeedError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(db_error("commit fixture"))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(target: "e2e.seed", error = %rollback_err, "Rollback of failed fixture failed");
            }
            Err(e)
        }
    }
}

/// Insert a user and its role assignments into the user store.
///
/// Roles go in under a savepoint. If the role table does not exist in this
/// deployment, the remaining roles are skipped and the user row is still
/// committed.
pub async fn create_user(conn: &mut PgConnection, user: &NewUser) -> Result<UserId, SeedError> {
    let mut tx = conn.begin().await.map_err(db_error("begin user fixture"))?;
    let result = insert_user(&mut tx, user).await;
    let id = finish(tx, result).await?;

    debug!(target: "e2e.seed", user_id = %id, username = %user.username, "Created fixture user");
    Ok(id)
}

async fn insert_user(tx: &mut Transaction<'_, Postgres>, user: &NewUser) -> Result<UserId, SeedError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users (username, email, password, first_name, last_name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING id::bigint
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(FIXTURE_PASSWORD_HASH)
    .bind("Test")
    .bind("User")
    .fetch_one(&mut **tx)
    .await
    .map_err(db_error("insert fixture user"))?;

    let id = UserId(id);
    insert_roles(tx, id, &user.roles).await?;
    Ok(id)
}

async fn insert_roles(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    roles: &[Role],
) -> Result<(), SeedError> {
    if roles.is_empty() {
        return Ok(());
    }

    let mut savepoint = Connection::begin(&mut **tx)
        .await
        .map_err(db_error("open role savepoint"))?;

    for role in roles {
        let inserted = sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id.0)
            .bind(role.as_str())
            .execute(&mut *savepoint)
            .await;

        match inserted {
            Ok(_) => {}
            Err(e) if stores::is_undefined_table(&e) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(db_error("roll back role savepoint"))?;
                info!(
                    target: "e2e.seed",
                    user_id = %user_id,
                    "No user_roles table in this deployment, roles skipped"
                );
                return Ok(());
            }
            Err(e) => return Err(db_error("insert fixture role")(e)),
        }
    }

    savepoint
        .commit()
        .await
        .map_err(db_error("release role savepoint"))
}

/// Insert a shop owned by `seller_id` into the product store.
pub async fn create_shop(
    conn: &mut PgConnection,
    name: &str,
    seller_id: UserId,
) -> Result<ShopId, SeedError> {
    let mut tx = conn.begin().await.map_err(db_error("begin shop fixture"))?;

    let result = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO shops (name, description, avatar_url, seller_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, NOW(), NOW())
        RETURNING id::bigint
        "#,
    )
    .bind(name)
    .bind("Test shop")
    .bind(None::<String>)
    .bind(seller_id.0)
    .fetch_one(&mut *tx)
    .await
    .map(ShopId)
    .map_err(db_error("insert fixture shop"));

    let id = finish(tx, result).await?;

    debug!(target: "e2e.seed", shop_id = %id, seller_id = %seller_id, "Created fixture shop");
    Ok(id)
}

/// Insert a product in the given moderation status into the product store.
pub async fn create_product(
    conn: &mut PgConnection,
    product: &NewProduct,
) -> Result<ProductId, SeedError> {
    let mut tx = conn.begin().await.map_err(db_error("begin product fixture"))?;

    let result = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO products
            (name, description, price, image_url, shop_id, seller_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        RETURNING id::bigint
        "#,
    )
    .bind(&product.name)
    .bind("Test product")
    .bind(product.price)
    .bind(None::<String>)
    .bind(product.shop_id.0)
    .bind(product.seller_id.0)
    .bind(product.status.as_str())
    .fetch_one(&mut *tx)
    .await
    .map(ProductId)
    .map_err(db_error("insert fixture product"));

    let id = finish(tx, result).await?;

    debug!(
        target: "e2e.seed",
        product_id = %id,
        status = product.status.as_str(),
        "Created fixture product"
    );
    Ok(id)
}
