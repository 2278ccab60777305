use crate::error::OrderError;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls fail fast until the timeout elapses.
    Open,
    /// A bounded number of trial calls decide whether to close again.
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Trial calls allowed while half-open; this many consecutive successes
    /// close the breaker.
    pub max_requests: u32,
    /// Length of the closed-state counting window. Zero never resets.
    pub interval: Duration,
    /// How long the breaker stays open before allowing trial calls.
    pub timeout: Duration,
    /// Consecutive failures in the closed state that trip the breaker.
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            failure_threshold: 5,
        }
    }
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Rejected without invoking the operation.
    Open,
    /// The operation ran and failed.
    Inner(E),
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    requests: u32,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Failure isolation for one outbound dependency.
///
/// Each external service gets its own instance, shared by every caller of
/// that service. Results of calls that started in an earlier generation
/// (before a state change) are ignored.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        let expiry = (!config.interval.is_zero()).then(|| now + config.interval);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Runs `op` unless the breaker is open, recording its outcome.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_call()?;
        let result = op().await;
        self.after_call(generation, result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// [`execute`](Self::execute) for operations that already speak
    /// [`OrderError`]; an open breaker becomes [`OrderError::CircuitOpen`].
    pub async fn call<T, F, Fut>(&self, op: F) -> crate::error::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        self.execute(op).await.map_err(|err| match err {
            BreakerError::Open => OrderError::CircuitOpen { service: self.name },
            BreakerError::Inner(err) => err,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn before_call<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            BreakerState::Open => return Err(BreakerError::Open),
            BreakerState::HalfOpen if inner.counts.requests >= self.config.max_requests => {
                return Err(BreakerError::Open);
            }
            _ => {}
        }

        inner.counts.requests += 1;
        Ok(inner.generation)
    }

    fn after_call(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        if success {
            inner.counts.consecutive_successes += 1;
            inner.counts.consecutive_failures = 0;
            if inner.state == BreakerState::HalfOpen
                && inner.counts.consecutive_successes >= self.config.max_requests
            {
                self.transition(&mut inner, BreakerState::Closed, now);
            }
        } else {
            inner.counts.consecutive_failures += 1;
            inner.counts.consecutive_successes = 0;
            match inner.state {
                BreakerState::Closed
                    if inner.counts.consecutive_failures >= self.config.failure_threshold =>
                {
                    self.transition(&mut inner, BreakerState::Open, now);
                }
                BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open, now),
                _ => {}
            }
        }
    }

    /// Applies time-based transitions: a closed window rolls over, an open
    /// breaker becomes half-open once its timeout expires.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            BreakerState::Closed if expired => self.new_generation(inner, now),
            BreakerState::Open if expired => self.transition(inner, BreakerState::HalfOpen, now),
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);

        match to {
            BreakerState::Open => {
                warn!(breaker = self.name, ?from, ?to, "circuit breaker opened");
            }
            _ => info!(breaker = self.name, ?from, ?to, "circuit breaker state changed"),
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed => {
                (!self.config.interval.is_zero()).then(|| now + self.config.interval)
            }
            BreakerState::Open => Some(now + self.config.timeout),
            BreakerState::HalfOpen => None,
        };
    }
}
