//! Circuit breaker for upstream call protection.
//!
//! Each route owns one breaker. After `failure_threshold` consecutive
//! failures the circuit opens and calls are rejected immediately; once
//! `reset_timeout` has elapsed a single probe call is admitted. The probe's
//! outcome decides between closing the circuit and re-opening it.
//!
//! Admission checks and state transitions share one mutex-guarded critical
//! section so concurrent requests observe a consistent state machine. The
//! half-open state admits exactly one in-flight probe; further calls are
//! rejected until the probe resolves.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

/// State of a circuit breaker.
///
/// * `Closed` - normal operation, calls pass through
/// * `Open` - circuit tripped, calls rejected without executing
/// * `HalfOpen` - testing recovery with a single probe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Runtime thresholds, converted from the serde-level config.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub per_call_timeout: Duration,
}

impl From<&crate::models::route::CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &crate::models::route::CircuitBreakerConfig) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            per_call_timeout: Duration::from_millis(config.per_call_timeout_ms),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&crate::models::route::CircuitBreakerConfig::default())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed. Resolve it with `on_success` or `on_failure`.
    Permitted,
    /// The circuit is open (or a half-open probe is already in flight).
    Rejected,
}

/// Per-route circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: String, settings: BreakerSettings) -> Self {
        Self {
            name,
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Attempts to admit a call.
    ///
    /// In the open state the reset deadline is evaluated here: once elapsed
    /// the breaker moves to half-open and this call becomes the probe.
    pub fn try_acquire(&self) -> Admission {
        if !self.settings.enabled {
            return Admission::Permitted;
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Admission::Permitted,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.settings.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("Circuit breaker {} half-open, admitting probe", self.name);
                    Admission::Permitted
                } else {
                    debug!("Circuit breaker {} open, rejecting call", self.name);
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    debug!(
                        "Circuit breaker {} probe in flight, rejecting call",
                        self.name
                    );
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Permitted
                }
            }
        }
    }

    /// Records a successful call.
    pub fn on_success(&self) {
        if !self.settings.enabled {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                info!("Circuit breaker {} closed, upstream recovered", self.name);
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn on_failure(&self) {
        if !self.settings.enabled {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.settings.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        "Circuit breaker {} opened after {} consecutive failures",
                        self.name, inner.failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                warn!("Circuit breaker {} re-opened, probe failed", self.name);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        if !self.settings.enabled {
            return CircuitState::Closed;
        }
        self.inner.lock().unwrap().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }
}
