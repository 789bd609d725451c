//! Running token and cost counters keyed by (provider, model).

use crate::gateway::types::GenerationResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UsageKey {
    pub provider: String,
    pub model: String,
}

impl UsageKey {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    /// Completed calls, successful or not.
    pub calls: u64,
    pub failed_calls: u64,
    pub attempts: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Accumulated cost in USD.
    pub cost: f64,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Counts one successful call.
    pub fn add_result(&mut self, result: &GenerationResult) {
        self.calls += 1;
        self.attempts += u64::from(result.attempts);
        self.input_tokens += result.usage.input_tokens;
        self.output_tokens += result.usage.output_tokens;
        self.cost += result.cost;
    }

    /// Counts one call that ended in an error.
    pub fn add_failure(&mut self) {
        self.calls += 1;
        self.failed_calls += 1;
    }

    pub fn absorb(&mut self, other: &UsageTotals) {
        self.calls += other.calls;
        self.failed_calls += other.failed_calls;
        self.attempts += other.attempts;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// Shared counter updated by every concurrent Gateway call.
#[derive(Debug, Default)]
pub struct UsageLedger {
    entries: Mutex<BTreeMap<UsageKey, UsageTotals>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        key: &UsageKey,
        attempts: u32,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    ) {
        self.update(key, |t| {
            t.calls += 1;
            t.attempts += u64::from(attempts);
            t.input_tokens += input_tokens;
            t.output_tokens += output_tokens;
            t.cost += cost;
        });
    }

    pub fn record_failure(&self, key: &UsageKey, attempts: u32) {
        self.update(key, |t| {
            t.calls += 1;
            t.failed_calls += 1;
            t.attempts += u64::from(attempts);
        });
    }

    fn update(&self, key: &UsageKey, apply: impl FnOnce(&mut UsageTotals)) {
        // A poisoned lock still holds consistent counters; keep counting.
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(entries.entry(key.clone()).or_default());
    }

    pub fn snapshot(&self) -> BTreeMap<UsageKey, UsageTotals> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn total(&self) -> UsageTotals {
        self.snapshot()
            .values()
            .fold(UsageTotals::default(), |mut acc, t| {
                acc.absorb(t);
                acc
            })
    }

    pub fn total_cost(&self) -> f64 {
        self.total().cost
    }
}
