use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use super::models::Visit;
use crate::durations::{duration_minutes, format_hours_minutes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitState {
    Active,
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VisitTransitionError {
    #[error("visit {visit_id} is already closed")]
    AlreadyClosed { visit_id: i32 },
}

/// Exit facts produced by [`Visit::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedVisit {
    pub exit_time: NaiveTime,
    /// `None` when the closing time precedes the entrance.
    pub total_minutes: Option<u64>,
}

impl Visit {
    pub fn state(&self) -> VisitState {
        if self.exit_time.is_some() {
            VisitState::Closed
        } else {
            VisitState::Active
        }
    }

    /// key: visit-lifecycle -> the single active -> closed transition
    ///
    /// A closed visit is left untouched and reported as [`VisitTransitionError::AlreadyClosed`].
    pub fn close(&mut self, closing: NaiveDateTime) -> Result<ClosedVisit, VisitTransitionError> {
        if self.state() == VisitState::Closed {
            return Err(VisitTransitionError::AlreadyClosed { visit_id: self.id });
        }

        let exit_time = closing.time();
        let total_minutes = u64::try_from(duration_minutes(self.entered_at(), closing)).ok();

        self.exit_time = Some(exit_time);
        self.duration_minutes = total_minutes.and_then(|minutes| i32::try_from(minutes).ok());
        self.visit_duration = total_minutes.map(format_hours_minutes);

        Ok(ClosedVisit {
            exit_time,
            total_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn visit_from(hour: u32, minute: u32) -> Visit {
        Visit {
            id: 4,
            customer_id: 9,
            visit_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            entrance_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            exit_time: None,
            duration_minutes: None,
            visit_duration: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn on(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn closing_records_exit_and_duration() {
        let mut visit = visit_from(9, 0);
        assert_eq!(visit.state(), VisitState::Active);

        let closed = visit.close(on(1, 11, 10)).unwrap();

        assert_eq!(closed.total_minutes, Some(130));
        assert_eq!(visit.state(), VisitState::Closed);
        assert_eq!(visit.exit_time, NaiveTime::from_hms_opt(11, 10, 0));
        assert_eq!(visit.duration_minutes, Some(130));
        assert_eq!(visit.visit_duration.as_deref(), Some("2:10"));
    }

    #[test]
    fn closing_twice_is_rejected_without_changes() {
        let mut visit = visit_from(9, 0);
        visit.close(on(1, 10, 0)).unwrap();
        let snapshot = visit.clone();

        let err = visit.close(on(1, 12, 0)).unwrap_err();

        assert_eq!(err, VisitTransitionError::AlreadyClosed { visit_id: 4 });
        assert_eq!(visit, snapshot);
    }

    #[test]
    fn closing_before_entrance_leaves_duration_unset() {
        let mut visit = visit_from(18, 0);

        let closed = visit.close(on(1, 17, 45)).unwrap();

        assert_eq!(closed.total_minutes, None);
        assert_eq!(visit.state(), VisitState::Closed);
        assert_eq!(visit.duration_minutes, None);
        assert_eq!(visit.visit_duration, None);
    }

    #[test]
    fn overnight_visits_count_minutes_across_midnight() {
        let mut visit = visit_from(22, 30);

        let closed = visit.close(on(2, 1, 0)).unwrap();

        assert_eq!(closed.total_minutes, Some(150));
        assert_eq!(visit.exit_time, NaiveTime::from_hms_opt(1, 0, 0));
        assert_eq!(visit.visit_duration.as_deref(), Some("2:30"));
    }
}
