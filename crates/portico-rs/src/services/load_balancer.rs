//! Load balancing across upstream target pools.
//!
//! The load balancer is the sole owner of target state: health bits, active
//! connection counts, cumulative request/error/latency counters and sticky
//! session bindings all live here. The request pipeline and the health prober
//! refer to targets by URL; nothing outside this module mutates a counter
//! directly.
//!
//! # Selection
//!
//! `select` filters the pool down to healthy targets, then applies two fast
//! paths before any strategy runs: an empty healthy set yields `None`, a
//! single healthy target is returned as-is. Sticky-session bindings are
//! honored ahead of strategy dispatch when the bound target is still healthy.
//!
//! # Concurrency
//!
//! Counters are atomics; the pool itself sits behind an `RwLock` and is only
//! write-locked by `add_target`/`remove_target`. The round-robin counter
//! advances exactly once per selection, including under contention.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde::Serialize;

use crate::models::route::{
    LoadBalancerConfig, LoadBalancingStrategy, StickySessionConfig, TargetConfig,
};
use crate::services::session::SessionStore;

/// Runtime state for one upstream target. Identity is the URL.
#[derive(Debug)]
pub struct TargetState {
    url: String,
    weight: u32,
    healthy: std::sync::atomic::AtomicBool,
    active_connections: AtomicI64,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    total_response_ms: AtomicU64,
    last_used_ms: AtomicU64,
    last_health_check_ms: AtomicU64,
}

impl TargetState {
    fn new(config: &TargetConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            weight: config.weight,
            healthy: std::sync::atomic::AtomicBool::new(true),
            active_connections: AtomicI64::new(0),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_response_ms: AtomicU64::new(0),
            last_used_ms: AtomicU64::new(0),
            last_health_check_ms: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in milliseconds, derived from the cumulative
    /// counters so it always equals `total_response_ms / total_requests`.
    pub fn avg_response_ms(&self) -> f64 {
        let requests = self.total_requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.total_response_ms.load(Ordering::Relaxed) as f64 / requests as f64
    }

    fn mark_used(&self) {
        self.last_used_ms
            .store(chrono::Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn mark_health_checked(&self) {
        self.last_health_check_ms
            .store(chrono::Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

/// RAII pairing of connection accounting.
///
/// Increments the target's active connection count on creation and decrements
/// exactly once on drop, so the pair holds even when the request future is
/// dropped mid-flight or a handler panics.
#[derive(Debug)]
pub struct ConnectionGuard {
    target: Arc<TargetState>,
}

impl ConnectionGuard {
    pub fn new(target: Arc<TargetState>) -> Self {
        target.active_connections.fetch_add(1, Ordering::Relaxed);
        Self { target }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = self.target.active_connections.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "connection counter underflow");
    }
}

/// Session cookie material attached to a selection under sticky routing.
#[derive(Debug, Clone)]
pub struct SessionAssignment {
    pub id: String,
    pub cookie_name: String,
    pub is_new: bool,
}

/// Result of a successful target selection.
#[derive(Debug)]
pub struct Selection {
    pub target: Arc<TargetState>,
    pub session: Option<SessionAssignment>,
}

#[derive(Debug)]
struct StickyRuntime {
    settings: StickySessionConfig,
    store: Arc<SessionStore>,
}

/// Per-target statistics included in a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStats {
    pub url: String,
    pub weight: u32,
    pub healthy: bool,
    pub active_connections: i64,
    pub requests: u64,
    pub errors: u64,
    pub avg_response_ms: f64,
    pub last_used_ms: u64,
}

/// Point-in-time view of a load balancer.
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStats {
    pub strategy: String,
    pub total_requests: u64,
    pub healthy_targets: usize,
    pub total_targets: usize,
    pub targets: Vec<TargetStats>,
}

/// Load balancer for one route's target pool.
#[derive(Debug)]
pub struct LoadBalancer {
    name: String,
    strategy: LoadBalancingStrategy,
    targets: RwLock<Vec<Arc<TargetState>>>,
    rr_counter: AtomicUsize,
    total_selections: AtomicU64,
    sticky: Option<StickyRuntime>,
}

impl LoadBalancer {
    /// Builds a balancer from route configuration.
    pub fn new(name: String, config: &LoadBalancerConfig) -> Arc<Self> {
        let targets = config
            .targets
            .iter()
            .map(|t| Arc::new(TargetState::new(t)))
            .collect();

        let sticky = config
            .sticky_session
            .as_ref()
            .filter(|s| s.enabled)
            .map(|settings| StickyRuntime {
                store: SessionStore::new(Duration::from_millis(settings.ttl_ms)),
                settings: settings.clone(),
            });

        Arc::new(Self {
            name,
            strategy: config.strategy,
            targets: RwLock::new(targets),
            rr_counter: AtomicUsize::new(0),
            total_selections: AtomicU64::new(0),
            sticky,
        })
    }

    /// Builds a single-target balancer for routes configured with `target`.
    pub fn single(name: String, url: &str) -> Arc<Self> {
        let config = LoadBalancerConfig {
            strategy: LoadBalancingStrategy::RoundRobin,
            targets: vec![TargetConfig {
                url: url.to_string(),
                weight: 1,
                meta: None,
            }],
            health_check: None,
            sticky_session: None,
        };
        Self::new(name, &config)
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Session store backing sticky routing, when enabled.
    pub fn session_store(&self) -> Option<&Arc<SessionStore>> {
        self.sticky.as_ref().map(|s| &s.store)
    }

    /// Cookie settings for sticky routing, when enabled.
    pub fn sticky_settings(&self) -> Option<&StickySessionConfig> {
        self.sticky.as_ref().map(|s| &s.settings)
    }

    /// All targets, regardless of health. Used by the health prober.
    pub fn targets(&self) -> Vec<Arc<TargetState>> {
        self.targets.read().unwrap().clone()
    }

    /// Selects a healthy target for a request.
    ///
    /// `client_key` feeds hash-affine strategies; `session_id` is the value
    /// of the sticky cookie when the client presented one.
    pub fn select(&self, client_key: &str, session_id: Option<&str>) -> Option<Selection> {
        let healthy: Vec<Arc<TargetState>> = self
            .targets
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.is_healthy())
            .cloned()
            .collect();

        if healthy.is_empty() {
            warn!("Load balancer {} has no healthy targets", self.name);
            return None;
        }

        // A presented, unexpired binding to a currently healthy target wins
        // over any strategy.
        if let Some(sticky) = &self.sticky {
            if let Some(session_id) = session_id {
                if let Some(bound_url) = sticky.store.lookup(session_id) {
                    if let Some(target) = healthy.iter().find(|t| t.url == bound_url) {
                        sticky.store.bind(session_id, &bound_url);
                        self.total_selections.fetch_add(1, Ordering::Relaxed);
                        target.mark_used();
                        return Some(Selection {
                            target: target.clone(),
                            session: Some(SessionAssignment {
                                id: session_id.to_string(),
                                cookie_name: sticky.settings.cookie_name.clone(),
                                is_new: false,
                            }),
                        });
                    }
                    debug!(
                        "Sticky binding for {} points at unavailable target {}, reselecting",
                        self.name, bound_url
                    );
                }
            }
        }

        let target = if healthy.len() == 1 {
            healthy[0].clone()
        } else {
            match self.strategy {
                LoadBalancingStrategy::RoundRobin => self.pick_round_robin(&healthy),
                LoadBalancingStrategy::Random => {
                    healthy[rand::thread_rng().gen_range(0..healthy.len())].clone()
                }
                LoadBalancingStrategy::Weighted => self.pick_weighted(&healthy),
                LoadBalancingStrategy::LeastConnections => Self::pick_least_connections(&healthy),
                LoadBalancingStrategy::WeightedLeastConnections => {
                    Self::pick_weighted_least_connections(&healthy)
                }
                LoadBalancingStrategy::IpHash => {
                    let index = fnv1a_32(client_key) as usize % healthy.len();
                    healthy[index].clone()
                }
                LoadBalancingStrategy::P2c => Self::pick_power_of_two(&healthy),
                LoadBalancingStrategy::Latency => self.pick_latency(&healthy),
            }
        };

        let session = self.sticky.as_ref().map(|sticky| {
            let id = SessionStore::generate_id();
            sticky.store.bind(&id, &target.url);
            SessionAssignment {
                id,
                cookie_name: sticky.settings.cookie_name.clone(),
                is_new: true,
            }
        });

        self.total_selections.fetch_add(1, Ordering::Relaxed);
        target.mark_used();
        Some(Selection { target, session })
    }

    fn pick_round_robin(&self, healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        let index = self.rr_counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        healthy[index].clone()
    }

    fn pick_weighted(&self, healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        let total: u64 = healthy.iter().map(|t| t.weight as u64).sum();
        if total == 0 {
            // Config validation rejects all-zero pools for the weighted
            // strategy; runtime health filtering can still produce one.
            return self.pick_round_robin(healthy);
        }

        let mut roll = rand::thread_rng().gen_range(0..total);
        for target in healthy {
            let weight = target.weight as u64;
            if roll < weight {
                return target.clone();
            }
            roll -= weight;
        }
        healthy[healthy.len() - 1].clone()
    }

    fn pick_least_connections(healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        let mut best = &healthy[0];
        for candidate in &healthy[1..] {
            let by_connections = candidate.connections().cmp(&best.connections());
            let better = match by_connections {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => {
                    candidate.avg_response_ms() < best.avg_response_ms()
                }
                std::cmp::Ordering::Greater => false,
            };
            if better {
                best = candidate;
            }
        }
        best.clone()
    }

    fn pick_weighted_least_connections(healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        let score = |t: &TargetState| (t.connections() + 1) as f64 / t.weight.max(1) as f64;

        let mut best = &healthy[0];
        for candidate in &healthy[1..] {
            let (candidate_score, best_score) = (score(candidate), score(best));
            let better = candidate_score < best_score
                || (candidate_score == best_score
                    && candidate.avg_response_ms() < best.avg_response_ms());
            if better {
                best = candidate;
            }
        }
        best.clone()
    }

    fn pick_power_of_two(healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        let mut rng = rand::thread_rng();
        let first = rng.gen_range(0..healthy.len());
        let mut second = rng.gen_range(0..healthy.len() - 1);
        if second >= first {
            second += 1;
        }

        let (a, b) = (&healthy[first], &healthy[second]);
        let winner = match a.connections().cmp(&b.connections()) {
            std::cmp::Ordering::Less => a,
            std::cmp::Ordering::Greater => b,
            std::cmp::Ordering::Equal => {
                if a.avg_response_ms() <= b.avg_response_ms() {
                    a
                } else {
                    b
                }
            }
        };
        winner.clone()
    }

    fn pick_latency(&self, healthy: &[Arc<TargetState>]) -> Arc<TargetState> {
        if healthy.iter().all(|t| t.requests() == 0) {
            return self.pick_round_robin(healthy);
        }

        let mut best = &healthy[0];
        for candidate in &healthy[1..] {
            if candidate.avg_response_ms() < best.avg_response_ms() {
                best = candidate;
            }
        }
        best.clone()
    }

    /// Adds a target to the pool. New targets start healthy.
    pub fn add_target(&self, config: TargetConfig) {
        let mut targets = self.targets.write().unwrap();
        let url = config.url.trim_end_matches('/');
        if targets.iter().any(|t| t.url == url) {
            warn!("Load balancer {} already has target {}", self.name, url);
            return;
        }
        targets.push(Arc::new(TargetState::new(&config)));
    }

    /// Removes a target by URL. Existing session bindings to it are left to
    /// expire; lookups simply stop resolving against the pool.
    pub fn remove_target(&self, url: &str) {
        let url = url.trim_end_matches('/');
        self.targets.write().unwrap().retain(|t| t.url != url);
    }

    /// Flips a target's health bit.
    pub fn set_health(&self, url: &str, healthy: bool) {
        let url = url.trim_end_matches('/');
        let targets = self.targets.read().unwrap();
        if let Some(target) = targets.iter().find(|t| t.url == url) {
            target.set_healthy(healthy);
        }
    }

    /// Adjusts a target's active connection count by `delta`.
    ///
    /// Prefer [`ConnectionGuard`] on the request path; this entry point
    /// exists for embedders doing their own accounting. Never drives the
    /// count negative.
    pub fn adjust_connections(&self, url: &str, delta: i64) {
        let url = url.trim_end_matches('/');
        let targets = self.targets.read().unwrap();
        if let Some(target) = targets.iter().find(|t| t.url == url) {
            let mut current = target.active_connections.load(Ordering::Relaxed);
            loop {
                let next = (current + delta).max(0);
                match target.active_connections.compare_exchange_weak(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }
    }

    /// Records a completed upstream call against a target.
    pub fn record_response(&self, url: &str, duration: Duration, is_error: bool) {
        let url = url.trim_end_matches('/');
        let targets = self.targets.read().unwrap();
        if let Some(target) = targets.iter().find(|t| t.url == url) {
            target.total_requests.fetch_add(1, Ordering::Relaxed);
            target
                .total_response_ms
                .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
            if is_error {
                target.total_errors.fetch_add(1, Ordering::Relaxed);
            }
            target.mark_used();
        }
    }

    /// Point-in-time statistics for the pool.
    pub fn snapshot(&self) -> LoadBalancerStats {
        let targets = self.targets.read().unwrap();
        let target_stats: Vec<TargetStats> = targets
            .iter()
            .map(|t| TargetStats {
                url: t.url.clone(),
                weight: t.weight,
                healthy: t.is_healthy(),
                active_connections: t.connections(),
                requests: t.requests(),
                errors: t.total_errors.load(Ordering::Relaxed),
                avg_response_ms: t.avg_response_ms(),
                last_used_ms: t.last_used_ms.load(Ordering::Relaxed),
            })
            .collect();

        LoadBalancerStats {
            strategy: format!("{:?}", self.strategy),
            total_requests: self.total_selections.load(Ordering::Relaxed),
            healthy_targets: target_stats.iter().filter(|t| t.healthy).count(),
            total_targets: target_stats.len(),
            targets: target_stats,
        }
    }
}

/// Stable 32-bit FNV-1a hash, used for client-affine selection.
fn fnv1a_32(data: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in data.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool(urls: &[(&str, u32)], strategy: LoadBalancingStrategy) -> Arc<LoadBalancer> {
        let config = LoadBalancerConfig {
            strategy,
            targets: urls
                .iter()
                .map(|(url, weight)| TargetConfig {
                    url: url.to_string(),
                    weight: *weight,
                    meta: None,
                })
                .collect(),
            health_check: None,
            sticky_session: None,
        };
        LoadBalancer::new("test".to_string(), &config)
    }

    #[test]
    fn round_robin_is_balanced() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1)],
            LoadBalancingStrategy::RoundRobin,
        );

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..6 {
            let selection = lb.select("10.0.0.1", None).unwrap();
            *counts.entry(selection.target.url().to_string()).or_default() += 1;
        }

        assert_eq!(counts["http://a:80"], 3);
        assert_eq!(counts["http://b:80"], 3);
    }

    #[test]
    fn round_robin_alternates_in_insertion_order() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1)],
            LoadBalancingStrategy::RoundRobin,
        );
        let order: Vec<String> = (0..4)
            .map(|_| lb.select("c", None).unwrap().target.url().to_string())
            .collect();
        assert_eq!(order, ["http://a:80", "http://b:80", "http://a:80", "http://b:80"]);
    }

    #[test]
    fn empty_and_unhealthy_pools_yield_nothing() {
        let lb = pool(&[("http://a:80", 1)], LoadBalancingStrategy::RoundRobin);
        lb.set_health("http://a:80", false);
        assert!(lb.select("c", None).is_none());

        lb.remove_target("http://a:80");
        assert!(lb.select("c", None).is_none());
    }

    #[test]
    fn single_healthy_target_bypasses_strategy() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1)],
            LoadBalancingStrategy::Random,
        );
        lb.set_health("http://b:80", false);

        for _ in 0..5 {
            let selection = lb.select("c", None).unwrap();
            assert_eq!(selection.target.url(), "http://a:80");
        }
    }

    #[test]
    fn weighted_distribution_tracks_weights() {
        let lb = pool(
            &[("http://a:80", 5), ("http://b:80", 2), ("http://c:80", 1)],
            LoadBalancingStrategy::Weighted,
        );

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..160 {
            let selection = lb.select("client", None).unwrap();
            *counts.entry(selection.target.url().to_string()).or_default() += 1;
        }

        let a = counts.get("http://a:80").copied().unwrap_or(0);
        let c = counts.get("http://c:80").copied().unwrap_or(0);
        assert!(a >= 50 && a <= 135, "dominant target got {a}");
        assert!(c >= 4, "lightest target got {c}");
        assert_eq!(counts.len(), 3, "every target should receive traffic");
    }

    #[test]
    fn zero_weight_targets_are_excluded_from_weighted_selection() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 0)],
            LoadBalancingStrategy::Weighted,
        );
        for _ in 0..20 {
            let selection = lb.select("client", None).unwrap();
            assert_eq!(selection.target.url(), "http://a:80");
        }
    }

    #[test]
    fn ip_hash_is_stable_per_client() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1), ("http://c:80", 1)],
            LoadBalancingStrategy::IpHash,
        );

        let first = lb.select("203.0.113.7", None).unwrap().target.url().to_string();
        for _ in 0..10 {
            let again = lb.select("203.0.113.7", None).unwrap();
            assert_eq!(again.target.url(), first);
        }
    }

    #[test]
    fn least_connections_prefers_idle_target() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1)],
            LoadBalancingStrategy::LeastConnections,
        );

        let busy = lb.select("c", None).unwrap().target;
        let _guard_one = ConnectionGuard::new(busy.clone());
        let _guard_two = ConnectionGuard::new(busy.clone());

        let selection = lb.select("c", None).unwrap();
        assert_ne!(selection.target.url(), busy.url());
    }

    #[test]
    fn connection_guard_pairs_increment_and_decrement() {
        let lb = pool(&[("http://a:80", 1)], LoadBalancingStrategy::LeastConnections);
        let target = lb.select("c", None).unwrap().target;

        assert_eq!(target.connections(), 0);
        {
            let _guard = ConnectionGuard::new(target.clone());
            assert_eq!(target.connections(), 1);
            {
                let _inner = ConnectionGuard::new(target.clone());
                assert_eq!(target.connections(), 2);
            }
            assert_eq!(target.connections(), 1);
        }
        assert_eq!(target.connections(), 0);
    }

    #[test]
    fn p2c_picks_the_less_loaded_of_two() {
        let lb = pool(
            &[("http://a:80", 1), ("http://b:80", 1)],
            LoadBalancingStrategy::P2c,
        );

        let busy = lb.targets()[0].clone();
        let _guards: Vec<ConnectionGuard> =
            (0..3).map(|_| ConnectionGuard::new(busy.clone())).collect();

        // With two targets, p2c always compares both; the loaded one loses.
        for _ in 0..10 {
            let selection = lb.select("c", None).unwrap();
            assert_eq!(selection.target.url(), "http://b:80");
        }
    }

    #[test]
    fn latency_strategy_prefers_faster_target() {
        let lb = pool(
            &[("http://slow:80", 1), ("http://fast:80", 1)],
            LoadBalancingStrategy::Latency,
        );

        lb.record_response("http://slow:80", Duration::from_millis(200), false);
        lb.record_response("http://fast:80", Duration::from_millis(20), false);

        for _ in 0..5 {
            let selection = lb.select("c", None).unwrap();
            assert_eq!(selection.target.url(), "http://fast:80");
        }
    }

    #[test]
    fn average_latency_is_cumulative_over_requests() {
        let lb = pool(&[("http://a:80", 1)], LoadBalancingStrategy::RoundRobin);
        lb.record_response("http://a:80", Duration::from_millis(100), false);
        lb.record_response("http://a:80", Duration::from_millis(300), true);

        let stats = lb.snapshot();
        let target = &stats.targets[0];
        assert_eq!(target.requests, 2);
        assert_eq!(target.errors, 1);
        assert!((target.avg_response_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sticky_sessions_pin_the_client() {
        let config = LoadBalancerConfig {
            strategy: LoadBalancingStrategy::RoundRobin,
            targets: vec![
                TargetConfig {
                    url: "http://a:80".to_string(),
                    weight: 1,
                    meta: None,
                },
                TargetConfig {
                    url: "http://b:80".to_string(),
                    weight: 1,
                    meta: None,
                },
            ],
            health_check: None,
            sticky_session: Some(StickySessionConfig::default()),
        };
        let lb = LoadBalancer::new("sticky".to_string(), &config);

        let first = lb.select("client", None).unwrap();
        let assignment = first.session.clone().unwrap();
        assert!(assignment.is_new);
        assert_eq!(assignment.cookie_name, "lb-session");
        let pinned = first.target.url().to_string();

        // Round-robin would alternate; the cookie must keep us pinned.
        for _ in 0..4 {
            let again = lb.select("client", Some(&assignment.id)).unwrap();
            assert_eq!(again.target.url(), pinned);
            assert!(!again.session.as_ref().unwrap().is_new);
        }

        // Once the pinned target goes unhealthy the binding is ignored.
        lb.set_health(&pinned, false);
        let rerouted = lb.select("client", Some(&assignment.id)).unwrap();
        assert_ne!(rerouted.target.url(), pinned);
    }

    #[test]
    fn snapshot_reports_pool_shape() {
        let lb = pool(
            &[("http://a:80", 2), ("http://b:80", 1)],
            LoadBalancingStrategy::Weighted,
        );
        lb.set_health("http://b:80", false);

        let stats = lb.snapshot();
        assert_eq!(stats.total_targets, 2);
        assert_eq!(stats.healthy_targets, 1);
        assert_eq!(stats.strategy, "Weighted");
    }

    #[test]
    fn add_and_remove_targets() {
        let lb = pool(&[("http://a:80", 1)], LoadBalancingStrategy::RoundRobin);
        lb.add_target(TargetConfig {
            url: "http://b:80/".to_string(),
            weight: 1,
            meta: None,
        });
        assert_eq!(lb.snapshot().total_targets, 2);

        // Duplicate URLs are ignored.
        lb.add_target(TargetConfig {
            url: "http://b:80".to_string(),
            weight: 3,
            meta: None,
        });
        assert_eq!(lb.snapshot().total_targets, 2);

        lb.remove_target("http://a:80");
        assert_eq!(lb.snapshot().total_targets, 1);
    }

    #[test]
    fn adjust_connections_never_goes_negative() {
        let lb = pool(&[("http://a:80", 1)], LoadBalancingStrategy::LeastConnections);
        lb.adjust_connections("http://a:80", 2);
        assert_eq!(lb.targets()[0].connections(), 2);

        lb.adjust_connections("http://a:80", -5);
        assert_eq!(lb.targets()[0].connections(), 0);
    }

    #[test]
    fn fnv_hash_is_deterministic() {
        assert_eq!(fnv1a_32("203.0.113.7"), fnv1a_32("203.0.113.7"));
        assert_ne!(fnv1a_32("203.0.113.7"), fnv1a_32("203.0.113.8"));
    }
}
