//! Resilience around the classifier:
//! - circuit breaker per provider
//! - per-audit token budget and usage accounting
//!
//! Retry with backoff lives in the classifier bridge itself (`backon`).

mod budget;
mod circuit_breaker;

pub use budget::{TokenBudget, UsageMeter};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
