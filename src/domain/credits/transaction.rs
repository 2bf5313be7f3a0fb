//! Credit transaction types.
//!
//! Every change to a user's balance is recorded as a transaction row.
//! Handlers build a [`NewCreditTransaction`] request; the ledger applies it
//! and materializes the [`CreditTransaction`] row with balance snapshots.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, TransactionId, UserId, ValidationError};

/// Upper bound on a single transaction, guards against corrupted payloads
/// applying absurd grants.
pub const MAX_CREDITS_PER_TRANSACTION: i64 = 1_000_000;

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// User bought credits (one-time payment).
    Purchase,

    /// Credits deducted for a content-generation action.
    Usage,

    /// Refund of previously spent credits.
    Refund,

    /// Granted credits: signup bonus or periodic plan allotment.
    Bonus,
}

impl TransactionType {
    /// Returns true if this transaction type adds credits.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Purchase | TransactionType::Refund | TransactionType::Bonus
        )
    }

    /// Returns true if this transaction type removes credits.
    pub fn is_debit(&self) -> bool {
        matches!(self, TransactionType::Usage)
    }

    /// Returns the wire name of this transaction type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Usage => "usage",
            TransactionType::Refund => "refund",
            TransactionType::Bonus => "bonus",
        }
    }
}

/// A validated request to post a transaction to the ledger.
///
/// `credits` is always a positive magnitude; the sign is derived from the
/// transaction type when the ledger applies it. The idempotency key makes
/// retried business operations collapse onto one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCreditTransaction {
    /// The user whose balance is affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Number of credits, always positive.
    pub credits: i64,

    /// Business-level deduplication key, unique per user.
    pub idempotency_key: String,

    /// Human-readable description.
    pub description: String,

    /// Originating external event or request id, if any.
    pub reference: Option<String>,
}

impl NewCreditTransaction {
    /// Create a purchase request (user bought a credit pack).
    pub fn purchase(
        user_id: UserId,
        credits: i64,
        idempotency_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::validated(
            user_id,
            TransactionType::Purchase,
            credits,
            idempotency_key,
            description,
        )
    }

    /// Create a usage request (credits spent on an action).
    pub fn usage(
        user_id: UserId,
        credits: i64,
        idempotency_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::validated(
            user_id,
            TransactionType::Usage,
            credits,
            idempotency_key,
            description,
        )
    }

    /// Create a refund request for previously spent credits.
    pub fn refund(
        user_id: UserId,
        credits: i64,
        idempotency_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::validated(
            user_id,
            TransactionType::Refund,
            credits,
            idempotency_key,
            reason,
        )
    }

    /// Create a bonus request (signup bonus, goodwill credits).
    pub fn bonus(
        user_id: UserId,
        credits: i64,
        idempotency_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::validated(
            user_id,
            TransactionType::Bonus,
            credits,
            idempotency_key,
            reason,
        )
    }

    /// Create a periodic plan allotment request.
    ///
    /// Posted as a bonus with a description derived from the plan name. The
    /// caller supplies a period-scoped idempotency key so the grant lands
    /// once no matter which webhook claims the period first.
    pub fn plan_grant(
        user_id: UserId,
        credits: i64,
        plan_name: &str,
        idempotency_key: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::validated(
            user_id,
            TransactionType::Bonus,
            credits,
            idempotency_key,
            format!("Monthly {} plan credit grant", plan_name),
        )
    }

    /// Attach the originating external event or request id.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// The signed balance delta this request represents.
    ///
    /// Negative for usage, positive for everything else.
    pub fn signed_amount(&self) -> i64 {
        if self.transaction_type.is_debit() {
            -self.credits
        } else {
            self.credits
        }
    }

    fn validated(
        user_id: UserId,
        transaction_type: TransactionType,
        credits: i64,
        idempotency_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !(1..=MAX_CREDITS_PER_TRANSACTION).contains(&credits) {
            return Err(ValidationError::out_of_range(
                "credits",
                1,
                MAX_CREDITS_PER_TRANSACTION,
                credits,
            ));
        }

        let idempotency_key = idempotency_key.into();
        if idempotency_key.trim().is_empty() {
            return Err(ValidationError::empty_field("idempotency_key"));
        }

        Ok(Self {
            user_id,
            transaction_type,
            credits,
            idempotency_key,
            description: description.into(),
            reference: None,
        })
    }
}

/// A posted ledger row.
///
/// `amount` is signed (negative for usage). `balance_before` and
/// `balance_after` snapshot the available balance around this row, which
/// makes the ledger replayable and auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID.
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Signed credit delta. Positive = credit, negative = debit.
    pub amount: i64,

    /// Available balance before this transaction.
    pub balance_before: i64,

    /// Available balance after this transaction.
    pub balance_after: i64,

    /// Business-level deduplication key, unique per user.
    pub idempotency_key: String,

    /// Human-readable description.
    pub description: String,

    /// Originating external event or request id, if any.
    pub reference: Option<String>,

    /// When the transaction was posted.
    pub created_at: Timestamp,
}

impl CreditTransaction {
    /// Materialize a ledger row from an applied request.
    pub fn record(
        request: &NewCreditTransaction,
        balance_before: i64,
        balance_after: i64,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id: request.user_id.clone(),
            transaction_type: request.transaction_type,
            amount: request.signed_amount(),
            balance_before,
            balance_after,
            idempotency_key: request.idempotency_key.clone(),
            description: request.description.clone(),
            reference: request.reference.clone(),
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    // ============================================================
    // TransactionType Tests
    // ============================================================

    #[test]
    fn transaction_type_is_credit_debit() {
        assert!(TransactionType::Purchase.is_credit());
        assert!(TransactionType::Refund.is_credit());
        assert!(TransactionType::Bonus.is_credit());
        assert!(!TransactionType::Usage.is_credit());

        assert!(TransactionType::Usage.is_debit());
        assert!(!TransactionType::Purchase.is_debit());
    }

    #[test]
    fn transaction_type_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionType::Purchase).unwrap();
        assert_eq!(json, "\"purchase\"");

        let parsed: TransactionType = serde_json::from_str("\"usage\"").unwrap();
        assert_eq!(parsed, TransactionType::Usage);
    }

    #[test]
    fn as_str_matches_serde_names() {
        for tx_type in [
            TransactionType::Purchase,
            TransactionType::Usage,
            TransactionType::Refund,
            TransactionType::Bonus,
        ] {
            let json = serde_json::to_string(&tx_type).unwrap();
            assert_eq!(json, format!("\"{}\"", tx_type.as_str()));
        }
    }

    // ============================================================
    // NewCreditTransaction Tests
    // ============================================================

    #[test]
    fn purchase_request_has_positive_signed_amount() {
        let request = NewCreditTransaction::purchase(
            test_user_id(),
            200,
            "purchase:pi_123",
            "Purchased 200 credits",
        )
        .unwrap();

        assert_eq!(request.transaction_type, TransactionType::Purchase);
        assert_eq!(request.signed_amount(), 200);
    }

    #[test]
    fn usage_request_has_negative_signed_amount() {
        let request =
            NewCreditTransaction::usage(test_user_id(), 2, "clip:render-42", "Clip render")
                .unwrap();

        assert_eq!(request.transaction_type, TransactionType::Usage);
        assert_eq!(request.signed_amount(), -2);
    }

    #[test]
    fn plan_grant_is_a_bonus_with_plan_description() {
        let request = NewCreditTransaction::plan_grant(
            test_user_id(),
            200,
            "Pro",
            "period-grant:sub_123:1704067200",
        )
        .unwrap();

        assert_eq!(request.transaction_type, TransactionType::Bonus);
        assert!(request.description.contains("Pro"));
        assert_eq!(request.signed_amount(), 200);
    }

    #[test]
    fn zero_credits_rejected() {
        let result = NewCreditTransaction::usage(test_user_id(), 0, "key", "noop");
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn negative_credits_rejected() {
        let result = NewCreditTransaction::bonus(test_user_id(), -5, "key", "bad");
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn oversized_credits_rejected() {
        let result = NewCreditTransaction::purchase(
            test_user_id(),
            MAX_CREDITS_PER_TRANSACTION + 1,
            "key",
            "too big",
        );
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn blank_idempotency_key_rejected() {
        let result = NewCreditTransaction::usage(test_user_id(), 1, "   ", "spend");
        assert!(matches!(result, Err(ValidationError::EmptyField { .. })));
    }

    #[test]
    fn with_reference_attaches_origin() {
        let request = NewCreditTransaction::bonus(test_user_id(), 3, "signup:user-123", "Welcome")
            .unwrap()
            .with_reference("evt_abc");

        assert_eq!(request.reference, Some("evt_abc".to_string()));
    }

    // ============================================================
    // CreditTransaction Tests
    // ============================================================

    #[test]
    fn record_snapshots_balances() {
        let request =
            NewCreditTransaction::usage(test_user_id(), 2, "clip:render-7", "Clip render")
                .unwrap();

        let row = CreditTransaction::record(&request, 5, 3);

        assert_eq!(row.amount, -2);
        assert_eq!(row.balance_before, 5);
        assert_eq!(row.balance_after, 3);
        assert_eq!(row.idempotency_key, "clip:render-7");
        assert_eq!(row.transaction_type, TransactionType::Usage);
    }

    #[test]
    fn record_preserves_reference() {
        let request = NewCreditTransaction::purchase(
            test_user_id(),
            100,
            "purchase:pi_999",
            "Purchased 100 credits",
        )
        .unwrap()
        .with_reference("evt_pi_999");

        let row = CreditTransaction::record(&request, 0, 100);

        assert_eq!(row.reference, Some("evt_pi_999".to_string()));
        assert_eq!(row.amount, 100);
    }

    #[test]
    fn records_get_unique_ids() {
        let request =
            NewCreditTransaction::bonus(test_user_id(), 3, "signup:user-123", "Welcome").unwrap();

        let a = CreditTransaction::record(&request, 0, 3);
        let b = CreditTransaction::record(&request, 0, 3);

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn transaction_serde_round_trip() {
        let request =
            NewCreditTransaction::refund(test_user_id(), 2, "refund:evt_1", "Failed render")
                .unwrap();
        let row = CreditTransaction::record(&request, 1, 3);

        let json = serde_json::to_string(&row).unwrap();
        let parsed: CreditTransaction = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, row);
        assert!(json.contains("\"refund\""));
    }
}
