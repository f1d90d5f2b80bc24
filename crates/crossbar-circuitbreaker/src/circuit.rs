use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls flow; outcomes are recorded in the sliding window.
    Closed = 0,
    /// Calls are rejected until the open window elapses.
    Open = 1,
    /// A bounded number of probe calls are admitted.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// One recorded outcome in the sliding window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    pub failure: bool,
    pub slow: bool,
}

/// Fixed-size ring buffer over the last N call outcomes.
struct Window {
    slots: Box<[CallOutcome]>,
    cursor: usize,
    filled: usize,
}

impl Window {
    fn new(size: usize) -> Self {
        Self {
            slots: vec![CallOutcome::default(); size.max(1)].into_boxed_slice(),
            cursor: 0,
            filled: 0,
        }
    }

    fn record(&mut self, outcome: CallOutcome) {
        self.slots[self.cursor] = outcome;
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.filled = (self.filled + 1).min(self.slots.len());
    }

    /// (total, failures, slow successes)
    fn stats(&self) -> (usize, usize, usize) {
        let mut failures = 0;
        let mut slow_ok = 0;
        for slot in self.slots.iter().take(self.filled) {
            if slot.failure {
                failures += 1;
            } else if slot.slow {
                slow_ok += 1;
            }
        }
        (self.filled, failures, slow_ok)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.filled = 0;
    }

    fn contents(&self) -> Vec<CallOutcome> {
        let mut out = Vec::with_capacity(self.filled);
        // Oldest first: walk from cursor when full, from 0 otherwise.
        if self.filled == self.slots.len() {
            for i in 0..self.filled {
                out.push(self.slots[(self.cursor + i) % self.slots.len()]);
            }
        } else {
            out.extend_from_slice(&self.slots[..self.filled]);
        }
        out
    }
}

struct Core {
    state: CircuitState,
    last_transition: Instant,
    window: Window,
    half_open_successes: usize,
    half_open_failures: usize,
}

/// Rejection returned while the circuit refuses calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit open, retry in {retry_in:?}")]
pub struct OpenRejection {
    /// Time until the breaker next admits a probe. Zero when the breaker is
    /// half-open and all probe slots are taken.
    pub retry_in: Duration,
}

/// Point-in-time view of a breaker, for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub window: Vec<CallOutcome>,
    pub window_cursor: usize,
    pub total_calls: usize,
    pub failure_count: usize,
    pub slow_call_count: usize,
    pub failure_rate: f64,
    pub seconds_since_transition: f64,
    pub permitted_probes: usize,
    pub probes_in_flight: usize,
}

/// The breaker itself. Shared across calls via `Arc`.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    core: Mutex<Core>,
    // Mirror of `core.state` for non-blocking reads by the gate and snapshots.
    state_cell: AtomicU8,
    // Probe admission is CAS-bounded here, never derived from window counts:
    // at most `permitted_probes` half-open calls may be in flight at once.
    half_open_inflight: AtomicUsize,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        let window_size = config.sliding_window_size;
        Arc::new(Self {
            config,
            core: Mutex::new(Core {
                state: CircuitState::Closed,
                last_transition: Instant::now(),
                window: Window::new(window_size),
                half_open_successes: 0,
                half_open_failures: 0,
            }),
            state_cell: AtomicU8::new(CircuitState::Closed as u8),
            half_open_inflight: AtomicUsize::new(0),
        })
    }

    /// Current state. Lock-free; may trail a transition by one call.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_cell.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Gate check. Returns a permit the caller must resolve with exactly one
    /// of `record_success`, `record_failure` or `cancel`; dropping the permit
    /// unresolved counts as cancellation.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CircuitPermit, OpenRejection> {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                self.config.events.emit(&CircuitBreakerEvent::CallPermitted {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    state: core.state,
                });
                Ok(CircuitPermit::new(Arc::clone(self), false))
            }
            CircuitState::Open => {
                let elapsed = core.last_transition.elapsed();
                if elapsed >= self.config.wait_duration_in_open {
                    self.transition(&mut core, CircuitState::HalfOpen);
                    drop(core);
                    self.acquire_probe()
                } else {
                    self.config.events.emit(&CircuitBreakerEvent::CallRejected {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                    });
                    metrics::counter!("circuitbreaker_calls_rejected_total", "circuitbreaker" => self.config.name.clone())
                        .increment(1);
                    Err(OpenRejection {
                        retry_in: self.config.wait_duration_in_open - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                drop(core);
                self.acquire_probe()
            }
        }
    }

    fn acquire_probe(self: &Arc<Self>) -> Result<CircuitPermit, OpenRejection> {
        let permitted = self.config.permitted_probes;
        let mut current = self.half_open_inflight.load(Ordering::Acquire);
        loop {
            if current >= permitted {
                self.config.events.emit(&CircuitBreakerEvent::CallRejected {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                });
                return Err(OpenRejection {
                    retry_in: Duration::ZERO,
                });
            }
            match self.half_open_inflight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.config.events.emit(&CircuitBreakerEvent::CallPermitted {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        state: CircuitState::HalfOpen,
                    });
                    return Ok(CircuitPermit::new(Arc::clone(self), true));
                }
                Err(observed) => current = observed,
            }
        }
    }

    fn record(&self, failure: bool, duration: Duration, probe: bool) {
        let slow = self
            .config
            .slow_call_threshold
            .map(|t| duration >= t)
            .unwrap_or(false);

        let mut core = self.core.lock();

        if slow {
            self.config.events.emit(&CircuitBreakerEvent::SlowCallDetected {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                duration,
                state: core.state,
            });
            metrics::counter!("circuitbreaker_slow_calls_total", "circuitbreaker" => self.config.name.clone())
                .increment(1);
        }

        let event = if failure {
            CircuitBreakerEvent::FailureRecorded {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: core.state,
            }
        } else {
            CircuitBreakerEvent::SuccessRecorded {
                pattern_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: core.state,
            }
        };
        self.config.events.emit(&event);
        metrics::counter!(
            "circuitbreaker_calls_total",
            "circuitbreaker" => self.config.name.clone(),
            "outcome" => if failure { "failure" } else { "success" }
        )
        .increment(1);

        if probe {
            self.release_probe_slot();
            // Probe outcomes are tracked apart from the window.
            if core.state == CircuitState::HalfOpen {
                if failure {
                    core.half_open_failures += 1;
                    self.transition(&mut core, CircuitState::Open);
                } else {
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.config.permitted_probes {
                        self.transition(&mut core, CircuitState::Closed);
                    }
                }
            }
            return;
        }

        if core.state != CircuitState::Closed {
            // A non-probe call that straddled a transition; nothing to record.
            return;
        }

        core.window.record(CallOutcome { failure, slow });
        self.evaluate_window(&mut core);
    }

    fn release_cancelled(&self, probe: bool) {
        if probe {
            self.release_probe_slot();
        }
        // Cancelled attempts leave the window untouched.
    }

    // Floors at zero: a transition out of half-open clears the counter while
    // probes may still be resolving.
    fn release_probe_slot(&self) {
        let mut current = self.half_open_inflight.load(Ordering::Acquire);
        while current > 0 {
            match self.half_open_inflight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn evaluate_window(&self, core: &mut Core) {
        let (total, failures, slow_ok) = core.window.stats();
        if total < self.config.minimum_number_of_calls {
            return;
        }
        let effective = if self.config.slow_call_threshold.is_some() {
            failures + slow_ok
        } else {
            failures
        };
        let rate = effective as f64 / total as f64;
        if rate >= self.config.failure_rate_threshold {
            self.transition(core, CircuitState::Open);
        }
    }

    fn transition(&self, core: &mut Core, to: CircuitState) {
        if core.state == to {
            return;
        }
        let from = core.state;
        self.config.events.emit(&CircuitBreakerEvent::StateTransition {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            from_state: from,
            to_state: to,
        });
        tracing::info!(
            circuit = %self.config.name,
            from = ?from,
            to = ?to,
            "circuit state transition"
        );
        metrics::counter!(
            "circuitbreaker_transitions_total",
            "circuitbreaker" => self.config.name.clone(),
            "to" => match to {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            }
        )
        .increment(1);

        core.state = to;
        core.last_transition = Instant::now();
        core.half_open_successes = 0;
        core.half_open_failures = 0;
        if to == CircuitState::Closed {
            core.window.reset();
        }
        self.state_cell.store(to as u8, Ordering::Release);
        if to != CircuitState::HalfOpen {
            self.half_open_inflight.store(0, Ordering::Release);
        }
    }

    /// Forces the breaker open, e.g. for maintenance windows.
    pub fn force_open(&self) {
        let mut core = self.core.lock();
        self.transition(&mut core, CircuitState::Open);
    }

    /// Forces the breaker closed without waiting for probes.
    pub fn force_closed(&self) {
        let mut core = self.core.lock();
        self.transition(&mut core, CircuitState::Closed);
    }

    /// Resets to closed and clears the window.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        if core.state == CircuitState::Closed {
            core.window.reset();
        } else {
            self.transition(&mut core, CircuitState::Closed);
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let core = self.core.lock();
        let (total, failures, slow_ok) = core.window.stats();
        let failure_rate = if total > 0 {
            failures as f64 / total as f64
        } else {
            0.0
        };
        CircuitSnapshot {
            state: core.state,
            window: core.window.contents(),
            window_cursor: core.window.cursor,
            total_calls: total,
            failure_count: failures,
            slow_call_count: slow_ok,
            failure_rate,
            seconds_since_transition: core.last_transition.elapsed().as_secs_f64(),
            permitted_probes: self.config.permitted_probes,
            probes_in_flight: self.half_open_inflight.load(Ordering::Acquire),
        }
    }
}

/// A gate admission. Must be resolved exactly once.
pub struct CircuitPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    resolved: bool,
}

impl std::fmt::Debug for CircuitPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitPermit")
            .field("probe", &self.probe)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl CircuitPermit {
    fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            resolved: false,
        }
    }

    /// True when this call was admitted as a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self, duration: Duration) {
        self.resolved = true;
        self.breaker.record(false, duration, self.probe);
    }

    pub fn record_failure(mut self, duration: Duration) {
        self.resolved = true;
        self.breaker.record(true, duration, self.probe);
    }

    /// The attempt was cancelled; no outcome is recorded.
    pub fn cancel(mut self) {
        self.resolved = true;
        self.breaker.release_cancelled(self.probe);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.release_cancelled(self.probe);
        }
    }
}
