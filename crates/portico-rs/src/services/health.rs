//! Periodic health probing of load-balancer targets.
//!
//! Each load balancer with probing enabled owns one prober task. Every cycle
//! the prober issues one request per target, concurrently, with an
//! independent deadline per probe; a slow or failing target never delays the
//! others. A target is healthy iff the probe status matches the expected
//! status and, when configured, the body contains the expected substring.
//! Results flip the target's health bit, which the next selection observes.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::models::route::HealthCheckConfig;
use crate::services::load_balancer::{LoadBalancer, TargetState};

/// Handle to a prober task; aborts the task when dropped.
#[derive(Debug)]
pub struct ProbeHandle {
    handle: JoinHandle<()>,
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Health prober bound to one load balancer.
pub struct HealthProber {
    client: Client,
    config: HealthCheckConfig,
}

impl HealthProber {
    pub fn new(config: HealthCheckConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create health check HTTP client");
        Self { client, config }
    }

    /// Spawns the probe loop for a balancer.
    ///
    /// The task holds only a weak reference to the balancer, so it winds down
    /// on its own when the route is dropped; the returned handle aborts it
    /// eagerly on shutdown.
    pub fn spawn(self, balancer: &Arc<LoadBalancer>) -> ProbeHandle {
        let weak: Weak<LoadBalancer> = Arc::downgrade(balancer);
        let interval = Duration::from_millis(self.config.interval_ms.max(100));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(balancer) = weak.upgrade() else {
                    break;
                };
                self.probe_cycle(&balancer).await;
            }
        });

        ProbeHandle { handle }
    }

    /// Probes every target once, concurrently.
    async fn probe_cycle(&self, balancer: &Arc<LoadBalancer>) {
        let targets = balancer.targets();
        let probes = targets.iter().map(|target| self.probe_target(target));
        futures::future::join_all(probes).await;
    }

    async fn probe_target(&self, target: &Arc<TargetState>) {
        let url = format!(
            "{}{}",
            target.url().trim_end_matches('/'),
            self.config.path
        );
        let method = reqwest::Method::from_bytes(self.config.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let started = Instant::now();
        let healthy = match self.client.request(method, &url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status != self.config.expected_status {
                    warn!(
                        target: "health",
                        "Probe {} returned {} (expected {}) in {:?}",
                        url,
                        status,
                        self.config.expected_status,
                        started.elapsed()
                    );
                    false
                } else if let Some(expected_body) = &self.config.expected_body {
                    match response.text().await {
                        Ok(body) => {
                            let matched = body.contains(expected_body);
                            if !matched {
                                warn!(
                                    target: "health",
                                    "Probe {} body did not contain expected content",
                                    url
                                );
                            }
                            matched
                        }
                        Err(e) => {
                            warn!(target: "health", "Probe {} body read failed: {}", url, e);
                            false
                        }
                    }
                } else {
                    true
                }
            }
            Err(e) => {
                warn!(
                    target: "health",
                    "Probe {} failed after {:?}: {}",
                    url,
                    started.elapsed(),
                    e
                );
                false
            }
        };

        let was_healthy = target.is_healthy();
        target.set_healthy(healthy);
        target.mark_health_checked();

        if healthy != was_healthy {
            debug!(
                target: "health",
                "Target {} health changed: {} -> {}",
                target.url(),
                was_healthy,
                healthy
            );
        }
    }
}
