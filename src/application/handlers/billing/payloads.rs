//! Typed views of the webhook payload objects the billing handlers read.
//!
//! Stripe event payloads are polymorphic: `StripeEvent.data.object` stays
//! raw JSON until a handler knows which shape to expect. These structs
//! capture only the fields our pipeline uses; everything else in the
//! provider's (much larger) objects is ignored on deserialize.
//!
//! Subscription-shaped payloads (`customer.subscription.*`) deserialize to
//! [`crate::ports::GatewaySubscription`] directly, which is also the type
//! the reconciler serializes into synthetic repair events, so both delivery
//! paths parse identically.

use serde::Deserialize;

use crate::domain::foundation::UserId;

/// Session mode reported on `checkout.session.completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Recurring subscription checkout.
    Subscription,

    /// One-time payment (credit pack purchase).
    Payment,

    /// Payment-method setup, no charge.
    Setup,

    /// Mode we do not recognize.
    #[serde(other)]
    #[default]
    Unknown,
}

/// The slice of a checkout session object we act on.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    /// Provider's session id (cs_xxx).
    pub id: String,

    #[serde(default)]
    pub mode: CheckoutMode,

    /// Provider customer id, absent for guest payment-mode sessions.
    #[serde(default)]
    pub customer: Option<String>,

    /// Provider subscription id, present in subscription mode.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Payment intent id, present in payment mode.
    #[serde(default)]
    pub payment_intent: Option<String>,

    /// Total charged, in the smallest currency unit.
    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Metadata we attached when creating the session.
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

impl CheckoutSessionObject {
    /// The internal user this session belongs to, parsed from metadata.
    ///
    /// Returns `None` when the metadata key is absent or not a valid
    /// user id (e.g. a session created outside this application).
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata
            .user_id
            .as_deref()
            .and_then(|raw| UserId::new(raw).ok())
    }

    /// Credits sold by a payment-mode session, if the session carries any.
    ///
    /// Stripe metadata values are always strings; a missing or
    /// non-numeric value yields `None`.
    pub fn credits(&self) -> Option<i64> {
        self.metadata
            .credits
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|credits| *credits > 0)
    }
}

/// Metadata attached to checkout sessions at creation time.
///
/// All values arrive as strings per the provider's metadata model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub plan_code: Option<String>,

    /// Credit count for one-time credit pack purchases.
    #[serde(default)]
    pub credits: Option<String>,
}

/// The slice of an invoice object we act on.
///
/// `invoice.upcoming` events carry an invoice that has not been created
/// yet and therefore has no id; the field defaults to empty.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    /// Provider subscription id; absent on one-off invoices.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Amount collected, in the smallest currency unit.
    #[serde(default)]
    pub amount_paid: i64,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Billing period this invoice covers (Unix timestamps).
    pub period_start: i64,
    pub period_end: i64,

    /// How many collection attempts the provider has made.
    #[serde(default)]
    pub attempt_count: u32,

    /// When the provider will retry a failed payment (Unix timestamp).
    #[serde(default)]
    pub next_payment_attempt: Option<i64>,
}

fn default_currency() -> String {
    "usd".to_string()
}
