use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::packages::Package;

/// key: subscription-model -> prepaid hours for one customer
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: i32,
    pub package_id: Uuid,
    pub remaining_hours: Decimal,
    pub ends_at: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Hours left and not yet expired on `today`.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.remaining_hours > Decimal::ZERO && self.ends_at >= today
    }
}

/// Opening balance and expiry for a new subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionTerms {
    pub remaining_hours: Decimal,
    pub ends_at: NaiveDate,
}

/// Largest balance a `NUMERIC(10, 2)` column holds.
// 99_999_999.99, i.e. mantissa 9_999_999_999 (0x2_540B_E3FF) at scale 2.
const MAX_REMAINING_HOURS: Decimal = Decimal::from_parts(0x540B_E3FF, 0x2, 0, false, 2);

/// Terms granted by `package` when bought on `today`. The front desk may override the opening
/// balance with any non-negative amount the balance column stores exactly.
pub fn subscription_terms(
    package: &Package,
    today: NaiveDate,
    remaining_override: Option<Decimal>,
) -> AppResult<SubscriptionTerms> {
    let remaining_hours = match remaining_override {
        Some(hours) if hours < Decimal::ZERO => {
            return Err(AppError::BadRequest(
                "remaining_hours must not be negative".into(),
            ));
        }
        Some(hours) if hours.normalize().scale() > 2 => {
            return Err(AppError::BadRequest(
                "remaining_hours allows at most 2 decimal places".into(),
            ));
        }
        Some(hours) if hours > MAX_REMAINING_HOURS => {
            return Err(AppError::BadRequest(format!(
                "remaining_hours must not exceed {MAX_REMAINING_HOURS}"
            )));
        }
        Some(hours) => hours,
        None => Decimal::from(package.number_of_hours),
    };
    let ends_at = today
        .checked_add_signed(Duration::days(i64::from(package.duration_in_days)))
        .ok_or_else(|| AppError::BadRequest("package validity overflows the calendar".into()))?;
    Ok(SubscriptionTerms {
        remaining_hours,
        ends_at,
    })
}
