use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::closing::{ClosingResult, VisitCloser};
use super::lifecycle::VisitState;
use super::models::{find_visit, insert_visit, list_visits, Visit, VisitFilter};
use super::notices::{notices_for, Notice};
use crate::config;
use crate::durations::club_now;
use crate::error::{AppError, AppResult};

/// key: visits-api -> front desk check-in, listing and checkout
pub fn routes() -> Router {
    Router::new()
        .route("/api/visits", get(list).post(open_visit))
        .route("/api/visits/:id", get(get_visit))
        .route("/api/visits/:id/close", post(close_visit))
}

#[derive(Debug, Deserialize)]
pub struct OpenVisitRequest {
    pub customer_id: i32,
    #[serde(default)]
    pub visit_date: Option<NaiveDate>,
    #[serde(default)]
    pub entrance_time: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseVisitRequest {
    /// Club wall-clock time of the exit; defaults to now.
    #[serde(default)]
    pub closed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct VisitView {
    #[serde(flatten)]
    pub visit: Visit,
    pub state: VisitState,
    pub duration_display: String,
}

impl From<Visit> for VisitView {
    fn from(visit: Visit) -> Self {
        Self {
            state: visit.state(),
            duration_display: visit.duration_display().to_string(),
            visit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseVisitResponse {
    pub result: ClosingResult,
    pub notices: Vec<Notice>,
}

/// Entrance times are kept at minute precision.
fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|time| time.with_nanosecond(0))
        .unwrap_or(time)
}

pub async fn open_visit(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<OpenVisitRequest>,
) -> AppResult<Json<VisitView>> {
    let now = club_now(*config::CLUB_UTC_OFFSET);
    let customer_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
            .bind(payload.customer_id)
            .fetch_one(&pool)
            .await?;
    if !customer_exists {
        return Err(AppError::NotFound);
    }

    let visit_date = payload.visit_date.unwrap_or_else(|| now.date());
    let entrance_time = truncate_to_minute(payload.entrance_time.unwrap_or_else(|| now.time()));
    let visit = insert_visit(&pool, payload.customer_id, visit_date, entrance_time)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error opening visit");
            AppError::Db(e)
        })?;
    tracing::info!(
        visit_id = visit.id,
        customer_id = visit.customer_id,
        %visit_date,
        %entrance_time,
        "visit opened"
    );
    Ok(Json(visit.into()))
}

pub async fn list(
    Extension(pool): Extension<PgPool>,
    Query(filter): Query<VisitFilter>,
) -> AppResult<Json<Vec<VisitView>>> {
    if let (Some(from), Some(until)) = (filter.from, filter.until) {
        if from > until {
            return Err(AppError::BadRequest("from must not be after until".into()));
        }
    }
    let visits = list_visits(&pool, &filter).await?;
    Ok(Json(visits.into_iter().map(VisitView::from).collect()))
}

pub async fn get_visit(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<VisitView>> {
    let visit = find_visit(&pool, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(visit.into()))
}

pub async fn close_visit(
    Extension(closer): Extension<VisitCloser>,
    Path(id): Path<i32>,
    payload: Option<Json<CloseVisitRequest>>,
) -> AppResult<Json<CloseVisitResponse>> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let now = request
        .closed_at
        .unwrap_or_else(|| club_now(*config::CLUB_UTC_OFFSET));
    let result = closer.close_visit(id, now).await?;
    let notices = notices_for(&result);
    Ok(Json(CloseVisitResponse { result, notices }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrance_times_drop_seconds() {
        let time = NaiveTime::from_hms_milli_opt(9, 41, 37, 250).unwrap();
        assert_eq!(
            truncate_to_minute(time),
            NaiveTime::from_hms_opt(9, 41, 0).unwrap()
        );
    }

    #[test]
    fn close_request_body_is_optional() {
        let request: CloseVisitRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.closed_at, None);

        let request: CloseVisitRequest =
            serde_json::from_str(r#"{"closed_at":"2024-05-04T11:10:00"}"#).unwrap();
        assert_eq!(
            request.closed_at,
            NaiveDate::from_ymd_opt(2024, 5, 4).and_then(|day| day.and_hms_opt(11, 10, 0))
        );
    }
}
