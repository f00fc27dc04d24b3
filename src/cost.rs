//! Decision-service usage and cost accounting.
//!
//! Each fallback consultation reports its token usage here, and the
//! executor checks the tracker against the run's cost cap before spending
//! more.

use crate::config;
use crate::decision::DecisionTier;

/// USD per 1k tokens for each decision tier
#[derive(Debug, Clone, Copy)]
pub struct TierPricing {
    /// Default (fast) tier price
    pub default_per_1k: f64,
    /// Escalated (strong) tier price
    pub escalated_per_1k: f64,
}

impl Default for TierPricing {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            default_per_1k: cfg.decision.price_default_per_1k,
            escalated_per_1k: cfg.decision.price_escalated_per_1k,
        }
    }
}

impl TierPricing {
    /// Price of `tokens` tokens at the given tier
    pub fn cost_usd(&self, tier: DecisionTier, tokens: u64) -> f64 {
        let per_1k = match tier {
            DecisionTier::Default => self.default_per_1k,
            DecisionTier::Escalated => self.escalated_per_1k,
        };
        per_1k * tokens as f64 / 1_000.0
    }
}

/// Accumulates decision-service spend across one playback run
#[derive(Debug, Clone)]
pub struct CostTracker {
    pricing: TierPricing,
    spent_usd: f64,
    tokens: u64,
    calls: u32,
}

impl CostTracker {
    /// Create a tracker with the given pricing table
    pub fn new(pricing: TierPricing) -> Self {
        Self {
            pricing,
            spent_usd: 0.0,
            tokens: 0,
            calls: 0,
        }
    }

    /// Record one consultation's token usage
    pub fn record_usage(&mut self, tier: DecisionTier, tokens: u64) {
        self.spent_usd += self.pricing.cost_usd(tier, tokens);
        self.tokens += tokens;
        self.calls += 1;
    }

    /// True once cumulative spend exceeds the cap
    pub fn is_over_budget(&self, cap_usd: f64) -> bool {
        self.spent_usd > cap_usd
    }

    /// Cumulative spend in USD
    pub fn total_usd(&self) -> f64 {
        self.spent_usd
    }

    /// Cumulative tokens across all consultations
    pub fn total_tokens(&self) -> u64 {
        self.tokens
    }

    /// Number of consultations recorded
    pub fn call_count(&self) -> u32 {
        self.calls
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(TierPricing::default())
    }
}
