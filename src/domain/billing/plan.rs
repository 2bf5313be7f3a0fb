//! Subscription plan catalog.
//!
//! Maps processor price ids to plan metadata, including the periodic
//! credit allotment. The binary builds the catalog from configuration at
//! startup; [`PlanCatalog::standard`] carries the stock ClipMint plans.

use serde::{Deserialize, Serialize};

/// A subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Stable plan code ("pro", "enterprise").
    pub code: String,

    /// Display name for notifications and API responses.
    pub name: String,

    /// Processor price id this plan is sold under.
    pub price_id: String,

    /// Monthly price in cents.
    pub monthly_price_cents: i64,

    /// Credits granted at activation and on every renewal.
    pub monthly_credits: i64,
}

impl Plan {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        price_id: impl Into<String>,
        monthly_price_cents: i64,
        monthly_credits: i64,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            price_id: price_id.into(),
            monthly_price_cents,
            monthly_credits,
        }
    }
}

/// Lookup table of the plans this deployment sells.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog from explicit plans.
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// The stock ClipMint plans with placeholder price ids.
    ///
    /// Deployments override the price ids through configuration so the
    /// catalog matches the prices created in the processor dashboard.
    pub fn standard() -> Self {
        Self::new(vec![
            Plan::new("pro", "Pro", "price_clipmint_pro_monthly", 1900, 200),
            Plan::new(
                "enterprise",
                "Enterprise",
                "price_clipmint_enterprise_monthly",
                8900,
                1000,
            ),
        ])
    }

    /// Replace the monthly credits for one plan code.
    ///
    /// Unknown codes are ignored; the catalog only sells what it knows.
    pub fn with_monthly_credits(mut self, code: &str, credits: i64) -> Self {
        if let Some(plan) = self.plans.iter_mut().find(|p| p.code == code) {
            plan.monthly_credits = credits;
        }
        self
    }

    /// Look up a plan by its stable code.
    pub fn by_code(&self, code: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.code == code)
    }

    /// Look up a plan by processor price id.
    pub fn by_price_id(&self, price_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.price_id == price_id)
    }

    /// All plans, in catalog order.
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
