//! PostgreSQL implementation of the credit ledger.
//!
//! `apply` runs inside a single database transaction. The user's balance row
//! is locked with `SELECT ... FOR UPDATE` before anything else, which
//! serializes all writers for that user: the idempotency check, the refund
//! cap check, and the balance arithmetic all see a frozen ledger. Balance
//! arithmetic itself is delegated to [`CreditBalance::apply`] so the
//! overdraft and refund invariants live in exactly one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::domain::credits::{
    CreditBalance, CreditTransaction, NewCreditTransaction, TransactionType,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, TransactionId, UserId};
use crate::ports::{CreditLedger, LedgerReceipt};

/// PostgreSQL credit ledger backed by `credit_balances` and
/// `credit_transactions`.
pub struct PostgresCreditLedger {
    pool: PgPool,
}

impl PostgresCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensure a balance row exists and lock it for the rest of the
    /// transaction.
    async fn lock_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> Result<CreditBalance, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO credit_balances (user_id, total_credits, used_credits, version, created_at, updated_at)
            VALUES ($1, 0, 0, 0, now(), now())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to initialize credit balance: {}", e),
            )
        })?;

        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT user_id, total_credits, used_credits, version, created_at, updated_at
            FROM credit_balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to lock credit balance: {}", e),
            )
        })?;

        CreditBalance::try_from(row)
    }

    /// Validate a refund against the usage row it references.
    ///
    /// The referenced transaction must exist, belong to the same user, and be
    /// a usage debit. The sum of refunds already posted against it plus this
    /// one must not exceed the original debit.
    async fn check_refund_reference(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        request: &NewCreditTransaction,
    ) -> Result<(), DomainError> {
        let reference = request.reference.as_deref().ok_or_else(|| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                "Refund requires a reference to the usage transaction being refunded",
            )
        })?;

        let usage_id: TransactionId = reference.parse().map_err(|_| {
            DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Refund reference is not a transaction id: {}", reference),
            )
        })?;

        let usage = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, transaction_type, amount, balance_before, balance_after,
                   idempotency_key, description, reference, created_at
            FROM credit_transactions
            WHERE id = $1
            "#,
        )
        .bind(usage_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch referenced transaction: {}", e),
            )
        })?
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Referenced usage transaction not found: {}", usage_id),
            )
        })?;

        if usage.user_id != request.user_id.as_str() || usage.transaction_type != "usage" {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Refund must reference a usage transaction belonging to the same user",
            ));
        }

        let (already_refunded,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM credit_transactions
            WHERE user_id = $1 AND transaction_type = 'refund' AND reference = $2
            "#,
        )
        .bind(request.user_id.as_str())
        .bind(reference)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to sum prior refunds: {}", e),
            )
        })?;

        // Usage rows carry a negative amount; refunds are positive.
        let refundable = -usage.amount - already_refunded;
        if request.credits > refundable {
            return Err(DomainError::new(
                ErrorCode::RefundExceedsUsage,
                format!(
                    "Refund of {} credits exceeds the {} still refundable on transaction {}",
                    request.credits, refundable, usage_id
                ),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl CreditLedger for PostgresCreditLedger {
    async fn apply(&self, request: NewCreditTransaction) -> Result<LedgerReceipt, DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to begin ledger transaction: {}", e),
            )
        })?;

        let balance = self.lock_balance(&mut tx, &request.user_id).await?;

        // Retried business operation: hand back the original row untouched.
        let existing = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, transaction_type, amount, balance_before, balance_after,
                   idempotency_key, description, reference, created_at
            FROM credit_transactions
            WHERE user_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(request.user_id.as_str())
        .bind(&request.idempotency_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to check idempotency key: {}", e),
            )
        })?;

        if let Some(row) = existing {
            let original = CreditTransaction::try_from(row)?;
            return Ok(LedgerReceipt::deduplicated(&original));
        }

        if request.transaction_type == TransactionType::Refund {
            self.check_refund_reference(&mut tx, &request).await?;
        }

        let updated = balance.apply(request.transaction_type, request.credits)?;
        let record = CreditTransaction::record(&request, balance.available(), updated.available());

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (
                id, user_id, transaction_type, amount, balance_before, balance_after,
                idempotency_key, description, reference, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_str())
        .bind(record.transaction_type.as_str())
        .bind(record.amount)
        .bind(record.balance_before)
        .bind(record.balance_after)
        .bind(&record.idempotency_key)
        .bind(&record.description)
        .bind(record.reference.as_deref())
        .bind(record.created_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        let result = sqlx::query(
            r#"
            UPDATE credit_balances
            SET total_credits = $2, used_credits = $3, version = $4, updated_at = $5
            WHERE user_id = $1 AND version = $6
            "#,
        )
        .bind(updated.user_id.as_str())
        .bind(updated.total_credits)
        .bind(updated.used_credits)
        .bind(updated.version)
        .bind(updated.updated_at.as_datetime())
        .bind(balance.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update credit balance: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::LedgerConflict,
                "Credit balance was updated concurrently",
            ));
        }

        tx.commit().await.map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to commit ledger transaction: {}", e),
            )
        })?;

        Ok(LedgerReceipt::applied(&record))
    }

    async fn balance(&self, user_id: &UserId) -> Result<CreditBalance, DomainError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT user_id, total_credits, used_credits, version, created_at, updated_at
            FROM credit_balances
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch credit balance: {}", e),
            )
        })?;

        match row {
            Some(row) => CreditBalance::try_from(row),
            None => Ok(CreditBalance::new(user_id.clone())),
        }
    }

    async fn history(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CreditTransaction>, DomainError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, transaction_type, amount, balance_before, balance_after,
                   idempotency_key, description, reference, created_at
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch transaction history: {}", e),
            )
        })?;

        rows.into_iter().map(CreditTransaction::try_from).collect()
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: &UserId,
        idempotency_key: &str,
    ) -> Result<Option<CreditTransaction>, DomainError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, transaction_type, amount, balance_before, balance_after,
                   idempotency_key, description, reference, created_at
            FROM credit_transactions
            WHERE user_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch transaction by idempotency key: {}", e),
            )
        })?;

        row.map(CreditTransaction::try_from).transpose()
    }
}

/// Database row for the credit_balances table.
#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    user_id: String,
    total_credits: i64,
    used_credits: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for CreditBalance {
    type Error = DomainError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid user id in credit balance row: {}", e),
            )
        })?;

        Ok(CreditBalance {
            user_id,
            total_credits: row.total_credits,
            used_credits: row.used_credits,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

/// Database row for the credit_transactions table.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: String,
    transaction_type: String,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    idempotency_key: String,
    description: String,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid user id in credit transaction row: {}", e),
            )
        })?;

        Ok(CreditTransaction {
            id: TransactionId::from_uuid(row.id),
            user_id,
            transaction_type: parse_transaction_type(&row.transaction_type)?,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            idempotency_key: row.idempotency_key,
            description: row.description,
            reference: row.reference,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_transaction_type(value: &str) -> Result<TransactionType, DomainError> {
    match value.to_lowercase().as_str() {
        "purchase" => Ok(TransactionType::Purchase),
        "usage" => Ok(TransactionType::Usage),
        "refund" => Ok(TransactionType::Refund),
        "bonus" => Ok(TransactionType::Bonus),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid transaction type value: {}", value),
        )),
    }
}

fn map_insert_error(err: sqlx::Error) -> DomainError {
    if let Some(db_err) = err.as_database_error() {
        // Two writers raced past the idempotency check. The row lock makes
        // this unreachable in practice; the unique index is the backstop.
        if db_err.constraint() == Some("credit_transactions_user_key_unique") {
            return DomainError::new(
                ErrorCode::LedgerConflict,
                "Transaction with this idempotency key landed concurrently",
            );
        }
    }
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Failed to insert credit transaction: {}", err),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Transaction Type Parsing Tests
    // ============================================================

    #[test]
    fn parse_transaction_type_works_for_all_values() {
        assert_eq!(
            parse_transaction_type("purchase").unwrap(),
            TransactionType::Purchase
        );
        assert_eq!(
            parse_transaction_type("usage").unwrap(),
            TransactionType::Usage
        );
        assert_eq!(
            parse_transaction_type("refund").unwrap(),
            TransactionType::Refund
        );
        assert_eq!(
            parse_transaction_type("bonus").unwrap(),
            TransactionType::Bonus
        );
    }

    #[test]
    fn parse_transaction_type_is_case_insensitive() {
        assert_eq!(
            parse_transaction_type("Purchase").unwrap(),
            TransactionType::Purchase
        );
        assert_eq!(
            parse_transaction_type("USAGE").unwrap(),
            TransactionType::Usage
        );
    }

    #[test]
    fn parse_transaction_type_rejects_invalid_values() {
        assert!(parse_transaction_type("grant").is_err());
        assert!(parse_transaction_type("").is_err());
    }

    #[test]
    fn roundtrip_transaction_type_conversion() {
        for tx_type in [
            TransactionType::Purchase,
            TransactionType::Usage,
            TransactionType::Refund,
            TransactionType::Bonus,
        ] {
            assert_eq!(parse_transaction_type(tx_type.as_str()).unwrap(), tx_type);
        }
    }

    // ============================================================
    // Row Conversion Tests
    // ============================================================

    #[test]
    fn transaction_row_conversion_preserves_fields() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = TransactionRow {
            id,
            user_id: "user-123".to_string(),
            transaction_type: "usage".to_string(),
            amount: -5,
            balance_before: 20,
            balance_after: 15,
            idempotency_key: "spend:abc".to_string(),
            description: "Video generation".to_string(),
            reference: Some("req-9".to_string()),
            created_at: now,
        };

        let transaction = CreditTransaction::try_from(row).unwrap();

        assert_eq!(transaction.id.as_uuid(), &id);
        assert_eq!(transaction.user_id.as_str(), "user-123");
        assert_eq!(transaction.transaction_type, TransactionType::Usage);
        assert_eq!(transaction.amount, -5);
        assert_eq!(transaction.balance_before, 20);
        assert_eq!(transaction.balance_after, 15);
        assert_eq!(transaction.idempotency_key, "spend:abc");
        assert_eq!(transaction.reference.as_deref(), Some("req-9"));
    }

    #[test]
    fn transaction_row_conversion_rejects_bad_type() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            user_id: "user-123".to_string(),
            transaction_type: "subscription".to_string(),
            amount: 10,
            balance_before: 0,
            balance_after: 10,
            idempotency_key: "key".to_string(),
            description: "desc".to_string(),
            reference: None,
            created_at: Utc::now(),
        };

        let result = CreditTransaction::try_from(row);

        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, ErrorCode::DatabaseError);
    }

    #[test]
    fn balance_row_conversion_preserves_fields() {
        let now = Utc::now();
        let row = BalanceRow {
            user_id: "user-123".to_string(),
            total_credits: 200,
            used_credits: 50,
            version: 7,
            created_at: now,
            updated_at: now,
        };

        let balance = CreditBalance::try_from(row).unwrap();

        assert_eq!(balance.user_id.as_str(), "user-123");
        assert_eq!(balance.total_credits, 200);
        assert_eq!(balance.used_credits, 50);
        assert_eq!(balance.available(), 150);
        assert_eq!(balance.version, 7);
    }

    #[test]
    fn balance_row_conversion_rejects_empty_user() {
        let now = Utc::now();
        let row = BalanceRow {
            user_id: "".to_string(),
            total_credits: 0,
            used_credits: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        assert!(CreditBalance::try_from(row).is_err());
    }
}
