//! Session lifecycle and per-test context.
//!
//! A [`TestSession`] owns the deployment for a whole run: it brings the
//! environment up, waits for readiness, checks the truncation plan against the
//! live schema, and tears everything down at the end. Any failure before the
//! first test is fatal.
//!
//! A [`TestContext`] is what a single test works with. Creating one connects
//! to every store and runs the reset protocol, so each test starts from empty
//! tables. The same store handles then serve the fixture loader and the test
//! body.

use crate::config::{ConfigError, HarnessConfig};
use crate::environment::{EnvironmentController, EnvironmentError};
use crate::fixtures::{ModerationClient, OrderClient, ProductClient, UserClient};
use crate::readiness::{ReadinessError, ReadinessProber};
use crate::reset::{PlanError, ResetReport, SchemaReport, TruncationPlan};
use crate::seed::{
    self, NewProduct, NewUser, ProductId, ProductStatus, Role, SeedError, ShopId, UserId,
};
use crate::stores::{Store, StoreError, StoreHandles};
use sqlx::PgConnection;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid harness configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Deployment command failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Deployment not ready: {0}")]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Truncation plan rejected: {0}")]
    Plan(#[from] PlanError),

    #[error("Fixture creation failed: {0}")]
    Seed(#[from] SeedError),

    #[error("Staged bring-up needs E2E_CONFIG_SERVER_URL")]
    NoConfigServer,
}

/// Owns the deployment for one test run.
pub struct TestSession {
    config: HarnessConfig,
    environment: EnvironmentController,
    prober: ReadinessProber,
    plan: TruncationPlan,
}

impl TestSession {
    pub fn new(config: HarnessConfig) -> Result<Self, SessionError> {
        let plan = TruncationPlan::from_tables(config.truncate_tables.clone())?;
        let environment = EnvironmentController::new(&config);
        let prober = ReadinessProber::new(&config)?;

        Ok(Self {
            config,
            environment,
            prober,
            plan,
        })
    }

    pub fn from_env() -> Result<Self, SessionError> {
        Self::new(HarnessConfig::from_env()?)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn plan(&self) -> &TruncationPlan {
        &self.plan
    }

    /// Start the deployment and wait until it can serve tests.
    ///
    /// A staged bring-up starts the configuration service alone, waits for it,
    /// then starts everything else.
    #[instrument(skip(self), name = "e2e.session.bring_up")]
    pub async fn bring_up(&self, staged: bool) -> Result<SchemaReport, SessionError> {
        if staged {
            let config_server = self
                .config
                .config_server
                .as_ref()
                .ok_or(SessionError::NoConfigServer)?;

            self.environment.start_service(&config_server.service).await?;
            self.prober.wait_for_config_server().await?;
            self.environment.launch().await?;
            self.prober.wait_for_services().await?;
        } else {
            self.environment.start().await?;
            self.prober.wait_for_deployment().await?;
        }

        let report = self.validate_plan().await?;
        info!(target: "e2e.session", staged, "Session ready");
        Ok(report)
    }

    /// Probe an already running deployment and validate the truncation plan
    /// against its schema.
    pub async fn check(&self) -> Result<SchemaReport, SessionError> {
        self.prober.wait_for_deployment().await?;
        self.validate_plan().await
    }

    async fn validate_plan(&self) -> Result<SchemaReport, SessionError> {
        let mut handles = StoreHandles::connect(&self.config.stores).await?;
        let validated = self.plan.validate(&mut handles).await;
        handles.close().await;

        let report = validated?;
        report.ensure_covered(&self.plan)?;
        Ok(report)
    }

    /// Run the reset protocol once against every store.
    pub async fn reset(&self) -> Result<ResetReport, SessionError> {
        let mut handles = StoreHandles::connect(&self.config.stores).await?;
        let report = self.plan.execute(&mut handles).await;
        handles.close().await;
        Ok(report)
    }

    /// Tear down the deployment. Never fails.
    pub async fn tear_down(&self) {
        self.environment.stop().await;
        info!(target: "e2e.session", "Session torn down");
    }
}

/// Per-test view of a running deployment.
///
/// Holds one connection per store plus a client per service. Construction
/// resets every store.
///
/// The handles are opened per test rather than once per session: each
/// `#[tokio::test]` runs on its own runtime, and a connection cannot outlive
/// the runtime that opened it.
pub struct TestContext {
    plan: TruncationPlan,
    stores: StoreHandles,
    last_reset: ResetReport,
    users: UserClient,
    products: ProductClient,
    orders: OrderClient,
    moderation: ModerationClient,
}

impl TestContext {
    /// Build a context from `E2E_*` environment variables.
    pub async fn setup() -> Result<Self, SessionError> {
        Self::with_config(&HarnessConfig::from_env()?).await
    }

    pub async fn with_config(config: &HarnessConfig) -> Result<Self, SessionError> {
        let plan = TruncationPlan::from_tables(config.truncate_tables.clone())?;
        let mut stores = StoreHandles::connect(&config.stores).await?;
        let last_reset = plan.execute(&mut stores).await;

        if !last_reset.is_clean() {
            warn!(
                target: "e2e.session",
                failures = last_reset.failures().count(),
                "Reset finished with failed statements"
            );
        }

        Ok(Self {
            plan,
            stores,
            last_reset,
            users: UserClient::new(&config.gateway_url),
            products: ProductClient::new(&config.gateway_url),
            orders: OrderClient::new(&config.gateway_url),
            moderation: ModerationClient::new(&config.gateway_url),
        })
    }

    pub fn users(&self) -> &UserClient {
        &self.users
    }

    pub fn products(&self) -> &ProductClient {
        &self.products
    }

    pub fn orders(&self) -> &OrderClient {
        &self.orders
    }

    pub fn moderation(&self) -> &ModerationClient {
        &self.moderation
    }

    pub fn plan(&self) -> &TruncationPlan {
        &self.plan
    }

    /// Report of the most recent reset pass.
    pub fn last_reset(&self) -> &ResetReport {
        &self.last_reset
    }

    pub fn stores(&mut self) -> &mut StoreHandles {
        &mut self.stores
    }

    pub fn store_mut(&mut self, store: Store) -> &mut PgConnection {
        self.stores.get_mut(store)
    }

    /// Run the reset protocol again, mid-test.
    pub async fn reset(&mut self) -> &ResetReport {
        self.last_reset = self.plan.execute(&mut self.stores).await;
        &self.last_reset
    }

    async fn user_with_role(&mut self, kind: &str, role: Role) -> Result<UserId, SeedError> {
        let user = NewUser::unique(kind, vec![role]);
        seed::create_user(self.stores.get_mut(Store::User), &user).await
    }

    /// A plain buyer account.
    pub async fn user(&mut self) -> Result<UserId, SeedError> {
        self.user_with_role("user", Role::User).await
    }

    pub async fn seller(&mut self) -> Result<UserId, SeedError> {
        self.user_with_role("seller", Role::Seller).await
    }

    pub async fn moderator(&mut self) -> Result<UserId, SeedError> {
        self.user_with_role("moderator", Role::Moderator).await
    }

    pub async fn shop(&mut self, seller_id: UserId) -> Result<ShopId, SeedError> {
        let name = format!("E2E Shop {}", seed::unique_token());
        seed::create_shop(self.stores.get_mut(Store::Product), &name, seller_id).await
    }

    /// A product waiting for moderation.
    pub async fn product_pending(
        &mut self,
        shop_id: ShopId,
        seller_id: UserId,
    ) -> Result<ProductId, SeedError> {
        let product = NewProduct::new(
            format!("Pending Product {}", seed::unique_token()),
            shop_id,
            seller_id,
            ProductStatus::Pending,
        );
        seed::create_product(self.stores.get_mut(Store::Product), &product).await
    }

    /// A product that already passed moderation.
    pub async fn product_approved(
        &mut self,
        shop_id: ShopId,
        seller_id: UserId,
    ) -> Result<ProductId, SeedError> {
        let product = NewProduct::new(
            format!("Approved Product {}", seed::unique_token()),
            shop_id,
            seller_id,
            ProductStatus::Approved,
        );
        seed::create_product(self.stores.get_mut(Store::Product), &product).await
    }

    /// Close every store connection.
    pub async fn close(self) {
        self.stores.close().await;
    }
}
