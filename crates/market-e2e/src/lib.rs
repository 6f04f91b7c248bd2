//! Marketplace End-to-End Test Harness
//!
//! This crate brings up the marketplace deployment (user, product, order and
//! moderation services behind a discovery-aware gateway, each with its own
//! PostgreSQL store), waits until it is ready, and drives black-box scenarios
//! through the gateway. Every test starts from empty stores and seeds only the
//! rows it needs.
//!
//! # Features
//!
//! - `smoke`: Deployment health and the end-to-end happy path (1min)
//! - `regression`: Per-service scenario suites (2-3min)
//! - `error_handling`: Gateway behaviour on invalid input and unknown routes
//! - `reset`: Reset protocol against the live stores
//! - `database`: Store protocol tests against a scratch database (`DATABASE_URL`)
//! - `all`: Every suite that needs the live deployment
//!
//! # Prerequisites
//!
//! 1. Docker with compose, and the deployment's `docker-compose.yml`
//! 2. Deployment running: `market-e2e up` (or `market-e2e run` for a full session)
//! 3. Store ports reachable: user (5401), product (5402), order (5403), moderation (5404)
//!
//! # Usage
//!
//! ```bash
//! # Bring up, run the smoke suite, tear down
//! cargo run -p market-e2e -- run --features smoke
//!
//! # Against an already running deployment
//! cargo test -p market-e2e --features all -- --test-threads=1
//!
//! # Store protocol only (needs a scratch Postgres)
//! DATABASE_URL=postgres://localhost/e2e cargo test -p market-e2e --features database
//! ```

pub mod config;
pub mod environment;
pub mod eventual;
pub mod fixtures;
pub mod readiness;
pub mod reset;
pub mod seed;
pub mod services;
pub mod session;
pub mod stores;

pub use config::HarnessConfig;
pub use session::{SessionError, TestContext, TestSession};
