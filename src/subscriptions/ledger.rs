use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use super::models::Subscription;

/// key: subscription-ledger -> outcome of charging hours against a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourDebit {
    pub billed: Decimal,
    pub new_remaining: Decimal,
    /// Hours consumed beyond what the subscription still held.
    pub overflow: Decimal,
}

impl HourDebit {
    pub fn exhausted(&self) -> bool {
        self.overflow > Decimal::ZERO
    }
}

/// Charges `hours_to_debit` against `remaining`, clamping the balance at zero and reporting the
/// shortfall as overflow.
pub fn debit_hours(remaining: Decimal, hours_to_debit: Decimal) -> HourDebit {
    HourDebit {
        billed: hours_to_debit,
        new_remaining: (remaining - hours_to_debit).max(Decimal::ZERO),
        overflow: (hours_to_debit - remaining).max(Decimal::ZERO),
    }
}

/// key: subscription-ledger -> locked lookup of the balance to debit
///
/// Earliest expiry wins when several subscriptions qualify. The row stays locked until the
/// surrounding transaction ends, so concurrent closings for the same customer queue up here.
pub async fn find_active_subscription<'c, E>(
    executor: E,
    customer_id: i32,
    today: NaiveDate,
) -> Result<Option<Subscription>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Subscription>(
        r#"
        SELECT * FROM subscriptions
        WHERE customer_id = $1
          AND remaining_hours > 0
          AND ends_at >= $2
        ORDER BY ends_at ASC, created_at ASC, id ASC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(customer_id)
    .bind(today)
    .fetch_optional(executor)
    .await
}

/// Persists `debit` only if the balance still matches what was read.
pub async fn apply_debit<'c, E>(
    executor: E,
    subscription: &Subscription,
    debit: &HourDebit,
) -> Result<Subscription, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET remaining_hours = $3,
            updated_at = NOW()
        WHERE id = $1
          AND remaining_hours = $2
        RETURNING *
        "#,
    )
    .bind(subscription.id)
    .bind(subscription.remaining_hours)
    .bind(debit.new_remaining)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(updated) => Ok(updated),
        None => {
            tracing::warn!(
                subscription = %subscription.id,
                expected_remaining = %subscription.remaining_hours,
                "subscription balance changed before debit"
            );
            Err(sqlx::Error::RowNotFound)
        }
    }
}

pub async fn list_for_customer<'c, E>(
    executor: E,
    customer_id: i32,
) -> Result<Vec<Subscription>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE customer_id = $1 ORDER BY ends_at DESC, created_at DESC",
    )
    .bind(customer_id)
    .fetch_all(executor)
    .await
}

pub async fn insert_subscription<'c, E>(
    executor: E,
    customer_id: i32,
    package_id: Uuid,
    remaining_hours: Decimal,
    ends_at: NaiveDate,
) -> Result<Subscription, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (id, customer_id, package_id, remaining_hours, ends_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(package_id)
    .bind(remaining_hours)
    .bind(ends_at)
    .fetch_one(executor)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn debit_beyond_balance_reports_overflow() {
        let debit = debit_hours(hours(2), hours(3));
        assert_eq!(debit.new_remaining, hours(0));
        assert_eq!(debit.overflow, hours(1));
        assert_eq!(debit.billed, hours(3));
        assert!(debit.exhausted());
    }

    #[test]
    fn debit_within_balance_keeps_remainder() {
        let debit = debit_hours(hours(5), hours(3));
        assert_eq!(debit.new_remaining, hours(2));
        assert_eq!(debit.overflow, hours(0));
        assert!(!debit.exhausted());
    }

    #[test]
    fn exact_debit_empties_without_overflow() {
        let debit = debit_hours(hours(3), hours(3));
        assert_eq!(debit.new_remaining, hours(0));
        assert!(!debit.exhausted());
    }

    #[test]
    fn fractional_balances_clamp_at_zero() {
        let debit = debit_hours(Decimal::new(15, 1), hours(2));
        assert_eq!(debit.new_remaining, hours(0));
        assert_eq!(debit.overflow, Decimal::new(5, 1));
    }

    #[test]
    fn zero_debit_leaves_balance_untouched() {
        let debit = debit_hours(hours(4), hours(0));
        assert_eq!(debit.new_remaining, hours(4));
        assert_eq!(debit.overflow, hours(0));
    }
}
