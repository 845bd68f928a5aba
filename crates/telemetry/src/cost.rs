//! Running cost bookkeeping and budget checks.
//!
//! Pure arithmetic, no I/O. The orchestrator feeds token usage and tool-call
//! deltas in; budgets are checked against the running totals.

use orcha_core::ModelPricing;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Snapshot of the running totals for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTracking {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u32,
    /// Estimated spend in USD.
    pub estimated_cost: f64,
}

impl CostTracking {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Optional hard ceilings. A ceiling is hit as soon as the running total
/// reaches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,

    /// Input plus output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
}

impl Budget {
    pub fn is_unlimited(&self) -> bool {
        self.max_cost.is_none() && self.max_tokens.is_none() && self.max_tool_calls.is_none()
    }
}

/// Which ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetResource {
    Cost,
    Tokens,
    ToolCalls,
}

impl std::fmt::Display for BudgetResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cost => write!(f, "cost"),
            Self::Tokens => write!(f, "tokens"),
            Self::ToolCalls => write!(f, "tool_calls"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetViolation {
    pub resource: BudgetResource,
    pub current: f64,
    pub limit: f64,
}

impl std::fmt::Display for BudgetViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} >= {}", self.resource, self.current, self.limit)
    }
}

/// Result of [`CostTracker::check_budget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub within_budget: bool,
    pub violations: Vec<BudgetViolation>,
}

/// Accumulates token usage and tool-call costs for one session.
///
/// `estimated_cost` is the token-derived cost plus the sum of tool-call
/// deltas. It never decreases except through [`CostTracker::reset`].
#[derive(Debug, Clone)]
pub struct CostTracker {
    tracking: CostTracking,
    rates: ModelPricing,
    /// Token cost accrued under earlier rates.
    banked_token_cost: f64,
    /// Token counts at the last rate switch.
    rated_from: (u64, u64),
    tool_cost: f64,
}

impl CostTracker {
    pub fn new(rates: ModelPricing) -> Self {
        Self {
            tracking: CostTracking::default(),
            rates,
            banked_token_cost: 0.0,
            rated_from: (0, 0),
            tool_cost: 0.0,
        }
    }

    pub fn rates(&self) -> ModelPricing {
        self.rates
    }

    /// Current totals.
    pub fn tracking(&self) -> CostTracking {
        self.tracking
    }

    pub fn update_token_usage(&mut self, input_delta: u64, output_delta: u64) {
        self.tracking.input_tokens += input_delta;
        self.tracking.output_tokens += output_delta;
        self.recompute();
    }

    /// Count one tool call and add its cost.
    pub fn increment_tool_calls(&mut self, cost_delta: f64) {
        self.tracking.tool_calls += 1;
        if cost_delta.is_finite() && cost_delta >= 0.0 {
            self.tool_cost += cost_delta;
        } else {
            warn!(cost_delta, "Ignoring invalid tool cost delta");
        }
        self.recompute();
    }

    /// Switch to new rates. Tokens already counted keep their old price.
    pub fn set_rates(&mut self, rates: ModelPricing) {
        self.banked_token_cost += self.unbanked_token_cost();
        self.rated_from = (self.tracking.input_tokens, self.tracking.output_tokens);
        self.rates = rates;
        self.recompute();
    }

    /// Evaluate every configured ceiling independently.
    pub fn check_budget(&self, budget: &Budget) -> BudgetStatus {
        let mut violations = Vec::new();
        let t = &self.tracking;

        if let Some(limit) = budget.max_cost {
            if t.estimated_cost >= limit {
                violations.push(BudgetViolation {
                    resource: BudgetResource::Cost,
                    current: t.estimated_cost,
                    limit,
                });
            }
        }
        if let Some(limit) = budget.max_tokens {
            if t.total_tokens() >= limit {
                violations.push(BudgetViolation {
                    resource: BudgetResource::Tokens,
                    current: t.total_tokens() as f64,
                    limit: limit as f64,
                });
            }
        }
        if let Some(limit) = budget.max_tool_calls {
            if t.tool_calls >= limit {
                violations.push(BudgetViolation {
                    resource: BudgetResource::ToolCalls,
                    current: f64::from(t.tool_calls),
                    limit: f64::from(limit),
                });
            }
        }

        BudgetStatus {
            within_budget: violations.is_empty(),
            violations,
        }
    }

    /// Zero all counters. Rates are kept.
    pub fn reset(&mut self) {
        self.tracking = CostTracking::default();
        self.banked_token_cost = 0.0;
        self.rated_from = (0, 0);
        self.tool_cost = 0.0;
    }

    fn unbanked_token_cost(&self) -> f64 {
        self.rates.cost(
            self.tracking.input_tokens - self.rated_from.0,
            self.tracking.output_tokens - self.rated_from.1,
        )
    }

    fn recompute(&mut self) {
        self.tracking.estimated_cost =
            self.banked_token_cost + self.unbanked_token_cost() + self.tool_cost;
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(ModelPricing::FALLBACK)
    }
}
