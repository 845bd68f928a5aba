//! Cost tracking and budget enforcement for Orcha.
//!
//! Provides real-time cost estimation with built-in model pricing, and
//! budget ceilings that halt runaway API spend.

pub mod cost;
pub mod pricing;

pub use cost::{Budget, BudgetResource, BudgetStatus, BudgetViolation, CostTracker, CostTracking};
pub use orcha_core::ModelPricing;
pub use pricing::PricingTable;
