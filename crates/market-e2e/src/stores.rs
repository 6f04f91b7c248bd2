//! Per-service database handles.
//!
//! Each bounded context owns its own PostgreSQL database. The harness keeps
//! exactly one connection per store for the lifetime of a test context; the
//! reset protocol, the fixture loader and test bodies all share it. Nothing
//! spans stores transactionally.

use crate::config::{StoreConfig, StoreConfigs};
use secrecy::ExposeSecret;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// PostgreSQL SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// One backing store per bounded-context service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Store {
    User,
    Product,
    Order,
    Moderation,
}

impl Store {
    pub const ALL: [Store; 4] = [Store::User, Store::Product, Store::Order, Store::Moderation];

    pub fn name(&self) -> &'static str {
        match self {
            Store::User => "user",
            Store::Product => "product",
            Store::Order => "order",
            Store::Moderation => "moderation",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to {store} store at {host}:{port}/{database}: {source}")]
    Connect {
        store: Store,
        host: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query against {store} store failed: {source}")]
    Query {
        store: Store,
        #[source]
        source: sqlx::Error,
    },
}

/// Open a single connection to one store.
pub async fn connect_store(store: Store, config: &StoreConfig) -> Result<PgConnection, StoreError> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.username)
        .password(config.password.expose_secret());

    let conn = PgConnection::connect_with(&options)
        .await
        .map_err(|source| StoreError::Connect {
            store,
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            source,
        })?;

    debug!(
        target: "e2e.stores",
        store = %store,
        database = %config.database,
        "Connected to store"
    );

    Ok(conn)
}

/// The session's database handles, one persistent connection per store.
pub struct StoreHandles {
    user: PgConnection,
    product: PgConnection,
    order: PgConnection,
    moderation: PgConnection,
}

impl StoreHandles {
    /// Connect to every store. Fails on the first store that cannot be reached.
    pub async fn connect(configs: &StoreConfigs) -> Result<Self, StoreError> {
        Ok(Self {
            user: connect_store(Store::User, configs.get(Store::User)).await?,
            product: connect_store(Store::Product, configs.get(Store::Product)).await?,
            order: connect_store(Store::Order, configs.get(Store::Order)).await?,
            moderation: connect_store(Store::Moderation, configs.get(Store::Moderation)).await?,
        })
    }

    pub fn get_mut(&mut self, store: Store) -> &mut PgConnection {
        match store {
            Store::User => &mut self.user,
            Store::Product => &mut self.product,
            Store::Order => &mut self.order,
            Store::Moderation => &mut self.moderation,
        }
    }

    /// Close every connection, logging (not returning) close failures.
    pub async fn close(self) {
        let handles = [
            (Store::User, self.user),
            (Store::Product, self.product),
            (Store::Order, self.order),
            (Store::Moderation, self.moderation),
        ];

        for (store, conn) in handles {
            if let Err(e) = conn.close().await {
                warn!(target: "e2e.stores", store = %store, error = %e, "Failed to close store connection");
            }
        }
    }
}

/// Whether an error is PostgreSQL reporting a missing table.
pub fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}

/// Check whether `table` exists in the connection's current schema.
pub async fn table_exists(conn: &mut PgConnection, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(conn)
    .await
}

/// Count the rows of `table`. The name must already be a validated identifier.
pub async fn count_rows(conn: &mut PgConnection, table: &str) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM \"{}\"", table);
    sqlx::query_scalar::<_, i64>(&sql).fetch_one(conn).await
}
