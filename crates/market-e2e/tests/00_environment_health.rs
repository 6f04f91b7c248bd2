//! P0 Smoke Tests: Deployment health
//!
//! Validates that the gateway, the discovery registry and every service are
//! reachable and registered before anything else runs.

#![cfg(feature = "smoke")]

use market_e2e::readiness::ReadinessProber;
use market_e2e::services::SERVICES;
use market_e2e::stores::StoreHandles;
use market_e2e::HarnessConfig;
use serial_test::serial;

fn config() -> HarnessConfig {
    HarnessConfig::from_env().expect("E2E_* environment should be valid")
}

#[tokio::test]
#[serial]
async fn test_gateway_is_healthy() {
    let prober = ReadinessProber::new(&config()).expect("Failed to build prober");

    prober
        .wait_for_gateway()
        .await
        .expect("Gateway should report healthy - is the deployment up?");
}

#[tokio::test]
#[serial]
async fn test_discovery_registry_is_reachable() {
    let prober = ReadinessProber::new(&config()).expect("Failed to build prober");

    prober
        .wait_for_discovery()
        .await
        .expect("Discovery registry should be reachable");
}

#[tokio::test]
#[serial]
async fn test_every_service_is_routed_through_gateway() {
    let prober = ReadinessProber::new(&config()).expect("Failed to build prober");

    for service in &SERVICES {
        let health = prober
            .wait_for_service(service)
            .await
            .unwrap_or_else(|e| panic!("{} should be routable: {}", service.name, e));

        assert_eq!(
            health.status, "UP",
            "{} reported status {}",
            service.name, health.status
        );
    }
}

#[tokio::test]
#[serial]
async fn test_every_store_accepts_connections() {
    let config = config();

    let handles = StoreHandles::connect(&config.stores)
        .await
        .expect("Every store should accept the harness credentials");
    handles.close().await;
}
