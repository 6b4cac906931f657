use rust_decimal::Decimal;
use serde::Serialize;

use super::closing::{ClosingResult, SubscriptionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Danger,
}

/// Operator-facing message describing one fact of a closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: &str, body: String) -> Self {
        Self {
            level,
            title: title.to_string(),
            body,
        }
    }
}

/// key: visit-notices -> presentation of a closing outcome
pub fn notices_for(result: &ClosingResult) -> Vec<Notice> {
    let mut notices = Vec::with_capacity(2);

    let closed_body = match result.visit_duration.as_deref() {
        Some(duration) => format!("Visit lasted {duration}"),
        None => "Exit time precedes entrance; duration not recorded".to_string(),
    };
    notices.push(Notice::new(NoticeLevel::Success, "Visit closed", closed_body));

    match &result.subscription {
        SubscriptionOutcome::Debited {
            billed_hours,
            remaining_hours,
            overflow_hours,
            ..
        } => {
            if *overflow_hours > Decimal::ZERO {
                let covered = *billed_hours - *overflow_hours;
                notices.push(Notice::new(
                    NoticeLevel::Danger,
                    "Subscription exhausted",
                    format!(
                        "{} hours billed, {} covered by the subscription; {} hours exceed it",
                        hours(*billed_hours),
                        hours(covered),
                        hours(*overflow_hours)
                    ),
                ));
            } else if remaining_hours.is_zero() {
                notices.push(Notice::new(
                    NoticeLevel::Warning,
                    "Subscription used up",
                    format!("{} hours deducted; no hours remain", hours(*billed_hours)),
                ));
            } else {
                notices.push(Notice::new(
                    NoticeLevel::Info,
                    "Subscription hours deducted",
                    format!(
                        "{} hours deducted; {} hours remaining",
                        hours(*billed_hours),
                        hours(*remaining_hours)
                    ),
                ));
            }
        }
        SubscriptionOutcome::NoActiveSubscription => notices.push(Notice::new(
            NoticeLevel::Warning,
            "No active subscription",
            "Visit was not charged to any subscription".to_string(),
        )),
    }

    notices
}

fn hours(value: Decimal) -> Decimal {
    value.normalize()
}
