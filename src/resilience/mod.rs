//! Failure isolation for calls to external services.

pub mod circuit_breaker;

use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// One breaker per external dependency, so a failing catalog service never
/// blocks payment-link requests.
#[derive(Debug)]
pub struct Breakers {
    pub catalog: CircuitBreaker,
    pub identity: CircuitBreaker,
    pub payment: CircuitBreaker,
    pub invoice: CircuitBreaker,
}

impl Breakers {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            catalog: CircuitBreaker::new("catalog", config.clone()),
            identity: CircuitBreaker::new("identity", config.clone()),
            payment: CircuitBreaker::new("payment", config.clone()),
            invoice: CircuitBreaker::new("invoice", config.clone()),
        }
    }
}
