//! Readiness probing for the deployment.
//!
//! All probes share one primitive, [`poll_until`]: run an attempt, and if it
//! asks to retry, sleep for the fixed interval and try again until the
//! deadline passes. Probes differ only in how they classify a response:
//!
//! - direct component probes (configuration service, gateway, discovery
//!   registry) retry on any failure;
//! - through-gateway service probes retry on connection errors and on
//!   `503 Service Unavailable` (the service has not registered with discovery
//!   yet), and abort on any other non-success status.
//!
//! Probes run one after another and never concurrently. A probe that runs out
//! of time is fatal for the session.

use crate::config::{HarnessConfig, ProbeTimings};
use crate::services::{ServiceDescriptor, SERVICES};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("{probe} not ready after {elapsed:?} (deadline {deadline:?}): {last_error}")]
    Timeout {
        probe: String,
        deadline: Duration,
        elapsed: Duration,
        last_error: String,
    },

    #[error("{probe} failed: {reason}")]
    Failed { probe: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fixed-interval polling bounded by a total deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// What one polling attempt concluded.
#[derive(Debug)]
pub enum Attempt<T> {
    Ready(T),
    /// Transient condition, try again after the interval.
    Retry(String),
    /// Permanent condition, stop polling.
    Abort(String),
}

/// Poll `attempt` until it is ready, aborts, or the deadline passes.
///
/// The first attempt runs immediately. The sleep before each later attempt is
/// capped at the time left, so a probe never overruns its deadline by more
/// than one attempt.
pub async fn poll_until<T, F, Fut>(
    probe: &str,
    policy: PollPolicy,
    mut attempt: F,
) -> Result<T, ReadinessError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let remaining = policy.deadline.saturating_sub(start.elapsed());

        let last_error = match attempt(remaining).await {
            Attempt::Ready(value) => {
                debug!(target: "e2e.readiness", probe, attempts, elapsed = ?start.elapsed(), "Probe succeeded");
                return Ok(value);
            }
            Attempt::Abort(reason) => {
                return Err(ReadinessError::Failed {
                    probe: probe.to_string(),
                    reason,
                });
            }
            Attempt::Retry(reason) => reason,
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.deadline {
            return Err(ReadinessError::Timeout {
                probe: probe.to_string(),
                deadline: policy.deadline,
                elapsed,
                last_error,
            });
        }

        debug!(target: "e2e.readiness", probe, attempts, reason = %last_error, "Probe not ready, retrying");

        sleep(policy.interval.min(policy.deadline - elapsed)).await;
    }
}

/// Any non-success status is worth another try.
pub fn retry_any_failure(_status: StatusCode) -> bool {
    true
}

/// Only 503 is transient: the service has not registered with discovery yet.
pub fn retry_unregistered(status: StatusCode) -> bool {
    status == StatusCode::SERVICE_UNAVAILABLE
}

/// Spring Boot actuator health payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// GET `url` once and classify the result.
///
/// Transport errors are always retryable; non-success statuses are retried
/// only if `retryable` says so.
pub async fn check_endpoint(
    client: &Client,
    url: &str,
    timeout: Duration,
    retryable: fn(StatusCode) -> bool,
) -> Attempt<reqwest::Response> {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return Attempt::Retry(format!("request failed: {}", e)),
    };

    let status = response.status();
    if status.is_success() {
        Attempt::Ready(response)
    } else if retryable(status) {
        Attempt::Retry(format!("status {}", status))
    } else {
        Attempt::Abort(format!("unexpected status {}", status))
    }
}

/// Probes the deployment's readiness endpoints.
pub struct ReadinessProber {
    client: Client,
    timings: ProbeTimings,
    gateway_url: String,
    discovery_url: String,
    config_server_url: Option<String>,
}

impl ReadinessProber {
    pub fn new(config: &HarnessConfig) -> Result<Self, ReadinessError> {
        let client = Client::builder()
            .timeout(config.probes.request_timeout)
            .build()?;

        Ok(Self {
            client,
            timings: config.probes,
            gateway_url: config.gateway_url.clone(),
            discovery_url: config.discovery_url.clone(),
            config_server_url: config.config_server.as_ref().map(|c| c.url.clone()),
        })
    }

    fn policy(&self, deadline: Duration) -> PollPolicy {
        PollPolicy::new(self.timings.interval, deadline)
    }

    fn request_timeout(&self, remaining: Duration) -> Duration {
        // reqwest rejects a zero timeout as an immediate error
        self.timings
            .request_timeout
            .min(remaining)
            .max(Duration::from_millis(100))
    }

    /// Poll `url` until it returns a success status.
    pub async fn wait_for_url(
        &self,
        probe: &str,
        url: &str,
        deadline: Duration,
        retryable: fn(StatusCode) -> bool,
    ) -> Result<(), ReadinessError> {
        poll_until(probe, self.policy(deadline), move |remaining| async move {
            match check_endpoint(&self.client, url, self.request_timeout(remaining), retryable).await {
                Attempt::Ready(_) => Attempt::Ready(()),
                Attempt::Retry(reason) => Attempt::Retry(reason),
                Attempt::Abort(reason) => Attempt::Abort(reason),
            }
        })
        .await
    }

    /// Wait for the configuration service's actuator health.
    ///
    /// A no-op when no configuration service is configured.
    #[instrument(skip_all, name = "e2e.readiness.config_server")]
    pub async fn wait_for_config_server(&self) -> Result<(), ReadinessError> {
        let Some(base) = &self.config_server_url else {
            return Ok(());
        };

        let url = format!("{}/actuator/health", base);
        self.wait_for_url(
            "config server",
            &url,
            self.timings.config_server_deadline,
            retry_any_failure,
        )
        .await?;

        info!(target: "e2e.readiness", url = %url, "Config server healthy");
        Ok(())
    }

    /// Wait for the discovery registry's root page.
    #[instrument(skip_all, name = "e2e.readiness.discovery")]
    pub async fn wait_for_discovery(&self) -> Result<(), ReadinessError> {
        let url = format!("{}/", self.discovery_url);
        self.wait_for_url(
            "discovery registry",
            &url,
            self.timings.discovery_deadline,
            retry_any_failure,
        )
        .await?;

        info!(target: "e2e.readiness", url = %url, "Discovery registry reachable");
        Ok(())
    }

    /// Wait for the gateway's own actuator health.
    #[instrument(skip_all, name = "e2e.readiness.gateway")]
    pub async fn wait_for_gateway(&self) -> Result<(), ReadinessError> {
        let url = format!("{}/actuator/health", self.gateway_url);
        self.wait_for_url("gateway", &url, self.timings.gateway_deadline, retry_any_failure)
            .await?;

        info!(target: "e2e.readiness", url = %url, "Gateway healthy");
        Ok(())
    }

    /// Wait until the gateway routes to `service_id` and its health reports a
    /// status.
    pub async fn wait_for_service_id(&self, service_id: &str) -> Result<HealthStatus, ReadinessError> {
        wait_for_routed_service(
            &self.client,
            &self.gateway_url,
            service_id,
            self.policy(self.timings.service_deadline),
            self.timings.request_timeout,
        )
        .await
    }

    pub async fn wait_for_service(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<HealthStatus, ReadinessError> {
        self.wait_for_service_id(service.service_id).await
    }

    /// Run every probe in order: configuration service (staged only),
    /// discovery registry, gateway, then each service through the gateway.
    ///
    /// Later probes assume earlier ones succeeded and do not re-check them.
    pub async fn wait_for_deployment(&self) -> Result<(), ReadinessError> {
        self.wait_for_config_server().await?;
        self.wait_for_services().await
    }

    /// Everything after the configuration service: discovery registry,
    /// gateway, then each service through the gateway.
    pub async fn wait_for_services(&self) -> Result<(), ReadinessError> {
        self.wait_for_discovery().await?;
        self.wait_for_gateway().await?;

        for service in &SERVICES {
            self.wait_for_service(service).await?;
        }

        info!(target: "e2e.readiness", services = SERVICES.len(), "Deployment ready");
        Ok(())
    }
}

/// Poll `<gateway>/<service_id>/actuator/health` until it answers 200 with a
/// JSON `status` field.
///
/// 503 and connection errors are retried; any other non-success status aborts.
#[instrument(skip(client, gateway_url, policy, request_timeout), name = "e2e.readiness.service")]
pub async fn wait_for_routed_service(
    client: &Client,
    gateway_url: &str,
    service_id: &str,
    policy: PollPolicy,
    request_timeout: Duration,
) -> Result<HealthStatus, ReadinessError> {
    let url = format!("{}/{}/actuator/health", gateway_url, service_id);
    let probe = format!("service {}", service_id);

    let health = poll_until(&probe, policy, move |remaining| {
        let url = url.clone();
        async move {
            let timeout = request_timeout.min(remaining).max(Duration::from_millis(100));
            match check_endpoint(client, &url, timeout, retry_unregistered).await {
                Attempt::Ready(response) => match response.json::<HealthStatus>().await {
                    Ok(health) => Attempt::Ready(health),
                    Err(e) => Attempt::Retry(format!("health body without status: {}", e)),
                },
                Attempt::Retry(reason) => Attempt::Retry(reason),
                Attempt::Abort(reason) => Attempt::Abort(reason),
            }
        }
    })
    .await?;

    info!(
        target: "e2e.readiness",
        service_id,
        status = %health.status,
        "Service registered and healthy"
    );

    Ok(health)
}
