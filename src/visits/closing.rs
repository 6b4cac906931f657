use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::{VisitState, VisitTransitionError};
use super::models::{lock_visit, persist_closed_visit, Visit};
use crate::config;
use crate::durations::{billable_hours, DEFAULT_MINUTES_THRESHOLD};
use crate::error::AppError;
use crate::subscriptions::{
    apply_debit, debit_hours, find_active_subscription, HourDebit, Subscription,
};

/// key: billing-policy -> rounding threshold applied when closing visits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    pub minutes_threshold: u64,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            minutes_threshold: DEFAULT_MINUTES_THRESHOLD,
        }
    }
}

impl BillingPolicy {
    pub fn from_env() -> Self {
        Self {
            minutes_threshold: *config::BILLING_MINUTES_THRESHOLD,
        }
    }

    /// Hours to charge for a stay; an undefined duration is not billed.
    pub fn billable_hours(&self, total_minutes: Option<u64>) -> u64 {
        total_minutes
            .map(|minutes| billable_hours(minutes, self.minutes_threshold))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubscriptionOutcome {
    Debited {
        subscription_id: Uuid,
        billed_hours: Decimal,
        remaining_hours: Decimal,
        overflow_hours: Decimal,
    },
    NoActiveSubscription,
}

/// key: visit-closing-result -> structured outcome handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosingResult {
    pub visit_id: i32,
    pub customer_id: i32,
    pub exit_time: NaiveTime,
    pub total_minutes: Option<u64>,
    pub visit_duration: Option<String>,
    pub hours_spent: f64,
    pub subscription: SubscriptionOutcome,
}

impl ClosingResult {
    pub fn debited(&self) -> bool {
        matches!(self.subscription, SubscriptionOutcome::Debited { .. })
    }

    /// Hours billed beyond the subscription balance, if the visit exhausted it.
    pub fn overflow_hours(&self) -> Option<Decimal> {
        match self.subscription {
            SubscriptionOutcome::Debited { overflow_hours, .. } if overflow_hours > Decimal::ZERO => {
                Some(overflow_hours)
            }
            _ => None,
        }
    }
}

/// Closing decisions computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosingPlan {
    pub result: ClosingResult,
    pub debit: Option<HourDebit>,
}

/// Closes `visit` in memory and settles it against `subscription`.
pub fn plan_closing(
    visit: &mut Visit,
    subscription: Option<&Subscription>,
    now: NaiveDateTime,
    policy: BillingPolicy,
) -> Result<ClosingPlan, VisitTransitionError> {
    let closed = visit.close(now)?;
    let hours_spent = closed
        .total_minutes
        .map(|minutes| minutes as f64 / 60.0)
        .unwrap_or_default();

    let (outcome, debit) = match subscription {
        Some(subscription) => {
            let billed = Decimal::from(policy.billable_hours(closed.total_minutes));
            let debit = debit_hours(subscription.remaining_hours, billed);
            let outcome = SubscriptionOutcome::Debited {
                subscription_id: subscription.id,
                billed_hours: debit.billed,
                remaining_hours: debit.new_remaining,
                overflow_hours: debit.overflow,
            };
            (outcome, Some(debit))
        }
        None => (SubscriptionOutcome::NoActiveSubscription, None),
    };

    Ok(ClosingPlan {
        result: ClosingResult {
            visit_id: visit.id,
            customer_id: visit.customer_id,
            exit_time: closed.exit_time,
            total_minutes: closed.total_minutes,
            visit_duration: visit.visit_duration.clone(),
            hours_spent,
            subscription: outcome,
        },
        debit,
    })
}

#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("visit {0} not found")]
    NotFound(i32),
    #[error("visit {0} is already closed")]
    AlreadyClosed(i32),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<VisitTransitionError> for ClosingError {
    fn from(err: VisitTransitionError) -> Self {
        match err {
            VisitTransitionError::AlreadyClosed { visit_id } => ClosingError::AlreadyClosed(visit_id),
        }
    }
}

impl From<ClosingError> for AppError {
    fn from(err: ClosingError) -> Self {
        match err {
            ClosingError::NotFound(_) => AppError::NotFound,
            ClosingError::AlreadyClosed(visit_id) => {
                AppError::Conflict(format!("visit {visit_id} is already closed"))
            }
            ClosingError::Storage(e) => AppError::Db(e),
        }
    }
}

/// key: visit-closing -> close a visit and debit its subscription in one transaction
#[derive(Clone)]
pub struct VisitCloser {
    pool: PgPool,
    policy: BillingPolicy,
}

impl VisitCloser {
    pub fn new(pool: PgPool, policy: BillingPolicy) -> Self {
        Self { pool, policy }
    }

    /// Both rows are locked for the whole transaction. Nothing is written unless the visit
    /// update and the subscription debit commit together.
    pub async fn close_visit(
        &self,
        visit_id: i32,
        now: NaiveDateTime,
    ) -> Result<ClosingResult, ClosingError> {
        let mut tx = self.pool.begin().await?;

        let mut visit = lock_visit(&mut *tx, visit_id)
            .await?
            .ok_or(ClosingError::NotFound(visit_id))?;
        if visit.state() == VisitState::Closed {
            debug!(visit_id, "ignoring close request for closed visit");
            return Err(ClosingError::AlreadyClosed(visit_id));
        }

        let subscription =
            find_active_subscription(&mut *tx, visit.customer_id, now.date()).await?;
        let plan = plan_closing(&mut visit, subscription.as_ref(), now, self.policy)?;

        if let (Some(subscription), Some(debit)) = (subscription.as_ref(), plan.debit.as_ref()) {
            apply_debit(&mut *tx, subscription, debit).await?;
        }
        persist_closed_visit(&mut *tx, &visit).await?;
        tx.commit().await?;

        let exhausted = plan.debit.as_ref().map_or(false, HourDebit::exhausted);
        let result = plan.result;
        match &result.subscription {
            SubscriptionOutcome::Debited {
                subscription_id,
                billed_hours,
                remaining_hours,
                overflow_hours,
            } => {
                info!(
                    visit_id,
                    customer_id = result.customer_id,
                    subscription = %subscription_id,
                    billed_hours = %billed_hours,
                    remaining_hours = %remaining_hours,
                    duration = result.visit_duration.as_deref().unwrap_or_default(),
                    "visit closed and subscription debited"
                );
                if exhausted {
                    warn!(
                        visit_id,
                        customer_id = result.customer_id,
                        subscription = %subscription_id,
                        overflow_hours = %overflow_hours,
                        "subscription exhausted by visit"
                    );
                }
            }
            SubscriptionOutcome::NoActiveSubscription => {
                info!(
                    visit_id,
                    customer_id = result.customer_id,
                    duration = result.visit_duration.as_deref().unwrap_or_default(),
                    "visit closed without an active subscription"
                );
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};

    fn visit_at(hour: u32, minute: u32) -> Visit {
        Visit {
            id: 21,
            customer_id: 5,
            visit_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            entrance_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            exit_time: None,
            duration_minutes: None,
            visit_duration: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn subscription(remaining: i64) -> Subscription {
        let today = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        Subscription {
            id: Uuid::new_v4(),
            customer_id: 5,
            package_id: Uuid::new_v4(),
            remaining_hours: Decimal::from(remaining),
            ends_at: today + Duration::days(1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn long_visit_exhausts_small_subscription() {
        let mut visit = visit_at(9, 0);
        let active = subscription(1);

        let plan = plan_closing(&mut visit, Some(&active), at(11, 10), BillingPolicy::default())
            .unwrap();

        assert_eq!(visit.visit_duration.as_deref(), Some("2:10"));
        assert!(visit.exit_time.is_some());
        assert_eq!(plan.result.visit_duration.as_deref(), Some("2:10"));
        assert_eq!(plan.result.total_minutes, Some(130));
        assert_eq!(
            plan.result.subscription,
            SubscriptionOutcome::Debited {
                subscription_id: active.id,
                billed_hours: Decimal::from(3),
                remaining_hours: Decimal::ZERO,
                overflow_hours: Decimal::from(2),
            }
        );
        assert_eq!(plan.result.overflow_hours(), Some(Decimal::from(2)));
        assert_eq!(plan.debit.map(|debit| debit.new_remaining), Some(Decimal::ZERO));
        assert_eq!(plan.debit.map(|debit| debit.exhausted()), Some(true));
    }

    #[test]
    fn visit_within_balance_leaves_remainder() {
        let mut visit = visit_at(9, 0);
        let active = subscription(5);

        let plan = plan_closing(&mut visit, Some(&active), at(10, 30), BillingPolicy::default())
            .unwrap();

        assert!(plan.result.debited());
        assert_eq!(plan.result.overflow_hours(), None);
        assert_eq!(plan.debit.map(|debit| debit.exhausted()), Some(false));
        assert_eq!(plan.result.hours_spent, 1.5);
        assert_eq!(
            plan.debit,
            Some(HourDebit {
                billed: Decimal::from(2),
                new_remaining: Decimal::from(3),
                overflow: Decimal::ZERO,
            })
        );
    }

    #[test]
    fn brief_visit_under_threshold_bills_nothing() {
        let mut visit = visit_at(9, 0);
        let active = subscription(4);

        let plan = plan_closing(&mut visit, Some(&active), at(9, 7), BillingPolicy::default())
            .unwrap();

        assert_eq!(visit.visit_duration.as_deref(), Some("0:07"));
        assert_eq!(plan.debit.map(|debit| debit.billed), Some(Decimal::ZERO));
        assert_eq!(plan.debit.map(|debit| debit.new_remaining), Some(Decimal::from(4)));
    }

    #[test]
    fn threshold_is_configurable() {
        let mut visit = visit_at(9, 0);
        let active = subscription(4);
        let policy = BillingPolicy {
            minutes_threshold: 0,
        };

        let plan = plan_closing(&mut visit, Some(&active), at(9, 7), policy).unwrap();

        assert_eq!(plan.debit.map(|debit| debit.billed), Some(Decimal::ONE));
    }

    #[test]
    fn missing_subscription_is_an_outcome() {
        let mut visit = visit_at(9, 0);

        let plan = plan_closing(&mut visit, None, at(10, 0), BillingPolicy::default()).unwrap();

        assert_eq!(plan.result.subscription, SubscriptionOutcome::NoActiveSubscription);
        assert!(!plan.result.debited());
        assert_eq!(plan.debit, None);
        assert_eq!(visit.visit_duration.as_deref(), Some("1:00"));
    }

    #[test]
    fn closing_before_entrance_bills_zero_hours() {
        let mut visit = visit_at(12, 0);
        let active = subscription(2);

        let plan = plan_closing(&mut visit, Some(&active), at(11, 0), BillingPolicy::default())
            .unwrap();

        assert_eq!(plan.result.total_minutes, None);
        assert_eq!(plan.result.visit_duration, None);
        assert_eq!(plan.result.hours_spent, 0.0);
        assert_eq!(plan.debit.map(|debit| debit.billed), Some(Decimal::ZERO));
    }

    #[test]
    fn closed_visit_cannot_be_planned_again() {
        let mut visit = visit_at(9, 0);
        plan_closing(&mut visit, None, at(10, 0), BillingPolicy::default()).unwrap();
        let snapshot = visit.clone();

        let err = plan_closing(&mut visit, None, at(11, 0), BillingPolicy::default()).unwrap_err();

        assert_eq!(err, VisitTransitionError::AlreadyClosed { visit_id: 21 });
        assert_eq!(visit, snapshot);
    }

    #[test]
    fn closing_errors_map_to_http_errors() {
        assert!(matches!(
            AppError::from(ClosingError::NotFound(1)),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(ClosingError::AlreadyClosed(1)),
            AppError::Conflict(message) if message == "visit 1 is already closed"
        ));
    }

    #[test]
    fn result_serializes_outcome_with_status_tag() {
        let mut visit = visit_at(9, 0);
        let plan = plan_closing(&mut visit, None, at(9, 30), BillingPolicy::default()).unwrap();

        let json = serde_json::to_value(&plan.result).unwrap();

        assert_eq!(json["subscription"]["status"], "no_active_subscription");
        assert_eq!(json["visit_duration"], "0:30");
    }
}
