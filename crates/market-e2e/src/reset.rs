//! State reset protocol.
//!
//! Before every test the harness empties all mutable tables across all stores
//! so no test observes state left behind by an earlier one. The truncation
//! plan is an ordered table list (children before parents) applied to every
//! store in a fixed store order.
//!
//! Each (store, statement) pair runs in its own transaction and is committed
//! on its own. Stores only hold some of the listed tables, so a table the
//! store does not have is skipped quietly, at debug level. Any other failing
//! statement is rolled back and logged as a warning, and the protocol moves on
//! to the next one; earlier truncations stay committed. A reset never fails
//! the test run.
//!
//! The table list mirrors the schema of the services under test, which this
//! repository does not own. [`TruncationPlan::validate`] checks it against the
//! live schema at session start so drift is reported before any test runs,
//! not discovered later as a stream of per-statement warnings.

use crate::stores::{self, Store, StoreError, StoreHandles};
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Version of [`DEFAULT_TABLES`]. Bump whenever the list changes.
///
/// v2 added `moderation_audit`, v3 added `user_roles`.
pub const PLAN_VERSION: u32 = 3;

/// Mutable tables of the system under test, in foreign-key order.
pub const DEFAULT_TABLES: &[&str] = &[
    "order_items",
    "orders",
    "carts",
    "moderation_audit",
    "moderation_actions",
    "products",
    "shops",
    "user_roles",
    "users",
];

/// Order in which stores are reset.
pub const DEFAULT_STORE_ORDER: [Store; 4] =
    [Store::Order, Store::Moderation, Store::Product, Store::User];

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Truncation plan has no tables")]
    Empty,

    #[error("Truncation plan has no stores")]
    NoStores,

    #[error("Invalid table name in truncation plan: {0:?}")]
    InvalidTable(String),

    #[error("Table {0:?} appears more than once in the truncation plan")]
    DuplicateTable(String),

    #[error("Truncation plan v{version} names tables missing from every store: {tables:?}")]
    SchemaDrift { version: u32, tables: Vec<String> },
}

/// Whether `name` is a plain lowercase SQL identifier safe to splice into a
/// statement.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `TRUNCATE` statement for one table.
pub fn truncate_statement(table: &str) -> String {
    format!("TRUNCATE TABLE \"{}\" CASCADE", table)
}

/// Outcome of one (store, statement) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Truncated,
    /// The table does not exist in this store's schema.
    MissingTable,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetEntry {
    pub store: Store,
    pub table: String,
    pub outcome: StatementOutcome,
}

/// Everything one reset pass did, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub entries: Vec<ResetEntry>,
}

impl ResetReport {
    pub fn truncated(&self) -> impl Iterator<Item = &ResetEntry> {
        self.entries
            .iter()
            .filter(|e| e.outcome == StatementOutcome::Truncated)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResetEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, StatementOutcome::Failed(_)))
    }

    /// True when no statement failed for a reason other than a missing table.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Result of checking the plan against the live schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub present: Vec<(Store, String)>,
    pub missing: Vec<(Store, String)>,
}

impl SchemaReport {
    /// Tables of the plan that exist in no store at all.
    pub fn unknown_tables(&self, plan: &TruncationPlan) -> Vec<String> {
        plan.tables()
            .iter()
            .filter(|table| !self.present.iter().any(|(_, t)| t == *table))
            .cloned()
            .collect()
    }

    /// Fail if any table of the plan exists in no store.
    pub fn ensure_covered(&self, plan: &TruncationPlan) -> Result<(), PlanError> {
        let unknown = self.unknown_tables(plan);
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PlanError::SchemaDrift {
                version: plan.version(),
                tables: unknown,
            })
        }
    }
}

/// Ordered table list applied to every store, children before parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationPlan {
    version: u32,
    store_order: Vec<Store>,
    tables: Vec<String>,
}

impl Default for TruncationPlan {
    fn default() -> Self {
        Self {
            version: PLAN_VERSION,
            store_order: DEFAULT_STORE_ORDER.to_vec(),
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TruncationPlan {
    /// Build a plan, rejecting empty lists, duplicates and unsafe identifiers.
    pub fn new(
        version: u32,
        store_order: Vec<Store>,
        tables: Vec<String>,
    ) -> Result<Self, PlanError> {
        if tables.is_empty() {
            return Err(PlanError::Empty);
        }
        if store_order.is_empty() {
            return Err(PlanError::NoStores);
        }

        for (i, table) in tables.iter().enumerate() {
            if !is_valid_identifier(table) {
                return Err(PlanError::InvalidTable(table.clone()));
            }
            if tables.iter().skip(i + 1).any(|t| t == table) {
                return Err(PlanError::DuplicateTable(table.clone()));
            }
        }

        Ok(Self {
            version,
            store_order,
            tables,
        })
    }

    /// Default store order with the configured table list.
    pub fn from_tables(tables: Vec<String>) -> Result<Self, PlanError> {
        Self::new(PLAN_VERSION, DEFAULT_STORE_ORDER.to_vec(), tables)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn store_order(&self) -> &[Store] {
        &self.store_order
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Every (store, statement) pair in execution order.
    pub fn statements(&self) -> Vec<(Store, String)> {
        self.store_order
            .iter()
            .flat_map(|store| {
                self.tables
                    .iter()
                    .map(move |table| (*store, truncate_statement(table)))
            })
            .collect()
    }

    /// Run the full protocol against every store in store order.
    pub async fn execute(&self, handles: &mut StoreHandles) -> ResetReport {
        let mut report = ResetReport::default();

        for store in &self.store_order {
            let conn = handles.get_mut(*store);
            report
                .entries
                .extend(self.reset_store(*store, conn).await.entries);
        }

        info!(
            target: "e2e.reset",
            plan_version = self.version,
            truncated = report.truncated().count(),
            failed = report.failures().count(),
            "Reset protocol complete"
        );

        report
    }

    /// Run every statement of the plan against a single store.
    pub async fn reset_store(&self, store: Store, conn: &mut PgConnection) -> ResetReport {
        let mut report = ResetReport::default();

        for table in &self.tables {
            let outcome = match truncate_committed(conn, &truncate_statement(table)).await {
                Ok(()) => StatementOutcome::Truncated,
                Err(e) if stores::is_undefined_table(&e) => {
                    debug!(target: "e2e.reset", store = %store, table = %table, "Table not in store, skipped");
                    StatementOutcome::MissingTable
                }
                Err(e) => {
                    warn!(
                        target: "e2e.reset",
                        store = %store,
                        table = %table,
                        error = %e,
                        "Reset statement failed, continuing"
                    );
                    StatementOutcome::Failed(e.to_string())
                }
            };

            report.entries.push(ResetEntry {
                store,
                table: table.clone(),
                outcome,
            });
        }

        report
    }

    /// Check which tables of the plan exist in which store.
    pub async fn validate(&self, handles: &mut StoreHandles) -> Result<SchemaReport, StoreError> {
        let mut report = SchemaReport::default();

        for store in &self.store_order {
            let conn = handles.get_mut(*store);
            let store_report = self.validate_store(*store, conn).await?;
            report.present.extend(store_report.present);
            report.missing.extend(store_report.missing);
        }

        let unknown = report.unknown_tables(self);
        if unknown.is_empty() {
            info!(
                target: "e2e.reset",
                plan_version = self.version,
                tables = self.tables.len(),
                "Truncation plan matches live schema"
            );
        } else {
            warn!(
                target: "e2e.reset",
                plan_version = self.version,
                unknown = ?unknown,
                "Truncation plan names tables missing from every store"
            );
        }

        Ok(report)
    }

    pub async fn validate_store(
        &self,
        store: Store,
        conn: &mut PgConnection,
    ) -> Result<SchemaReport, StoreError> {
        let mut report = SchemaReport::default();

        for table in &self.tables {
            let exists = stores::table_exists(conn, table)
                .await
                .map_err(|source| StoreError::Query { store, source })?;

            if exists {
                report.present.push((store, table.clone()));
            } else {
                report.missing.push((store, table.clone()));
            }
        }

        Ok(report)
    }

    /// Tables of the plan that still hold rows in the given store.
    pub async fn non_empty_tables(
        &self,
        store: Store,
        conn: &mut PgConnection,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut non_empty = Vec::new();

        for table in &self.tables {
            let exists = stores::table_exists(conn, table)
                .await
                .map_err(|source| StoreError::Query { store, source })?;
            if !exists {
                continue;
            }

            let rows = stores::count_rows(conn, table)
                .await
                .map_err(|source| StoreError::Query { store, source })?;
            if rows > 0 {
                non_empty.push((table.clone(), rows));
            }
        }

        Ok(non_empty)
    }
}

/// Execute one statement in its own transaction and commit it.
async fn truncate_committed(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;

    match sqlx::query(sql).execute(&mut *tx).await {
        Ok(_) => tx.commit().await,
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(target: "e2e.reset", error = %rollback_err, "Rollback after failed statement failed");
            }
            Err(e)
        }
    }
}
