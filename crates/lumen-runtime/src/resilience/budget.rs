//! Per-audit token budget and classifier usage accounting.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use lumen_core::ClassifierUsage;

use crate::providers::TokenUsage;

/// Token allowance for one audit.
pub struct TokenBudget {
    /// `None` means unbounded
    pub max_tokens: Option<u32>,

    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: Option<u32>) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Claim `tokens` up front. Fails without claiming anything when they
    /// do not fit, so concurrent callers can never jointly overrun the limit.
    pub fn try_reserve(&self, tokens: u32) -> bool {
        let max = self.max_tokens;
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let next = used.saturating_add(tokens);
                match max {
                    Some(max) if next > max => None,
                    _ => Some(next),
                }
            })
            .is_ok()
    }

    /// Replace a reservation with what the call actually used.
    pub fn settle(&self, reserved: u32, actual: u32) {
        if actual >= reserved {
            self.used.fetch_add(actual - reserved, Ordering::SeqCst);
        } else {
            self.release(reserved - actual);
        }
    }

    /// Give back a reservation that was never spent.
    pub fn release(&self, tokens: u32) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(tokens))
            });
    }

    pub fn remaining(&self) -> u32 {
        match self.max_tokens {
            Some(max) => max.saturating_sub(self.used()),
            None => u32::MAX,
        }
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Tracks classifier spend for one audit.
///
/// Shared by every alt-text item in the audit; counters end up in the
/// report's `classifier_usage`.
pub struct UsageMeter {
    budget: TokenBudget,
    usage: RwLock<ClassifierUsage>,
}

impl UsageMeter {
    pub fn new(token_budget: Option<u32>) -> Self {
        Self {
            budget: TokenBudget::new(token_budget),
            usage: RwLock::new(ClassifierUsage::default()),
        }
    }

    /// Reserve an estimated call; `false` when the budget cannot cover it.
    pub fn reserve(&self, estimate: u32) -> bool {
        self.budget.try_reserve(estimate)
    }

    /// Return the reservation of a call that got no response.
    pub fn release(&self, estimate: u32) {
        self.budget.release(estimate);
    }

    /// Count a completed call, charging its real usage against the
    /// `reserved` estimate.
    pub fn record_call(&self, reserved: u32, usage: &TokenUsage) {
        self.budget.settle(reserved, usage.total());
        let mut counters = self.usage.write();
        counters.calls += 1;
        counters.input_tokens += u64::from(usage.prompt_tokens);
        counters.output_tokens += u64::from(usage.completion_tokens);
    }

    pub fn record_cache_hit(&self) {
        self.usage.write().cache_hits += 1;
    }

    pub fn record_failure(&self) {
        self.usage.write().failures += 1;
    }

    pub fn snapshot(&self) -> ClassifierUsage {
        *self.usage.read()
    }

    pub fn remaining_tokens(&self) -> u32 {
        self.budget.remaining()
    }
}

impl Default for UsageMeter {
    fn default() -> Self {
        Self::new(None)
    }
}
