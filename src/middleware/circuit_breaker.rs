//! Circuit breaker decorator
//!
//! Counts consecutive failures of the wrapped provider. Once the threshold is
//! reached the circuit opens and calls fail fast with [`LlmError::CircuitOpen`]
//! without touching the backend. After the reset timeout a single trial call
//! is let through (half-open); its outcome closes or re-opens the circuit.
//!
//! Streaming calls are passed through unprotected.

use crate::config::ProviderOptions;
use crate::core_types::{CallContext, ChatRequest, ChatResponse, PacketStream, Provider};
use crate::error::{LlmError, LlmResult};
use crate::logging::{log_debug, log_info, log_warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Thresholds for the circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerPolicy {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial is allowed
    pub reset_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if service recovered
}

/// Mutable breaker bookkeeping, only touched under the breaker's lock
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            trial_in_flight: false,
        }
    }

    /// Decide whether a call may proceed, moving Open -> HalfOpen when the
    /// reset timeout has elapsed. The caller that triggers the transition
    /// owns the single trial.
    fn admit(&mut self, policy: &BreakerPolicy) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::HalfOpen => Admission::Rejected,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_time
                    .map(|at| at.elapsed() >= policy.reset_timeout)
                    .unwrap_or(true);
                if elapsed && !self.trial_in_flight {
                    log_debug!(
                        circuit_breaker = "transitioning_to_half_open",
                        reset_timeout_ms = policy.reset_timeout.as_millis() as u64,
                        "Circuit breaker attempting recovery"
                    );
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    Admission::Trial
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            log_info!(
                circuit_breaker = "recovered",
                "Circuit breaker trial succeeded, returning to closed state"
            );
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_time = None;
        self.trial_in_flight = false;
    }

    fn record_failure(&mut self, policy: &BreakerPolicy) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_time = Some(Instant::now());
        self.trial_in_flight = false;

        log_debug!(
            failure_count = self.failure_count,
            failure_threshold = policy.failure_threshold,
            "Circuit breaker recorded failure"
        );

        if self.state == CircuitState::HalfOpen || self.failure_count >= policy.failure_threshold {
            if self.state != CircuitState::Open {
                log_warn!(
                    circuit_breaker = "opened",
                    failure_count = self.failure_count,
                    failure_threshold = policy.failure_threshold,
                    reset_timeout_ms = policy.reset_timeout.as_millis() as u64,
                    "Circuit breaker opened due to repeated failures"
                );
            }
            self.state = CircuitState::Open;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
    Rejected,
}

/// Returns an abandoned trial (caller dropped the future) to the open state so
/// the next call can try again.
struct TrialGuard<'a> {
    state: &'a Mutex<BreakerState>,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock();
        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Open;
            state.trial_in_flight = false;
        }
    }
}

/// Provider decorator that fast-fails while the backend is unhealthy
#[derive(Debug)]
pub struct CircuitBreaker<P> {
    inner: P,
    policy: BreakerPolicy,
    state: Mutex<BreakerState>,
}

impl<P: Provider> CircuitBreaker<P> {
    pub fn new(inner: P, policy: BreakerPolicy) -> Self {
        Self {
            inner,
            policy,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Current circuit state
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for CircuitBreaker<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        // Lock is released before the inner call so concurrent calls are not serialized
        let admission = self.state.lock().admit(&self.policy);
        let mut trial = match admission {
            Admission::Rejected => return Err(LlmError::circuit_open(self.inner.name())),
            Admission::Normal => None,
            Admission::Trial => Some(TrialGuard {
                state: &self.state,
                settled: false,
            }),
        };

        let result = self.inner.generate(ctx, request).await;

        if let Some(guard) = trial.as_mut() {
            guard.settled = true;
        }
        {
            let mut state = self.state.lock();
            match &result {
                Ok(_) => state.record_success(),
                Err(_) => state.record_failure(&self.policy),
            }
        }
        result
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        self.inner.generate_stream(ctx, request).await
    }

    fn name(&self) -> String {
        format!("{} (Protected)", self.inner.name())
    }
}
