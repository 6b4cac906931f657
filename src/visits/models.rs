use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Postgres};

/// Shown instead of a duration while the customer is still inside.
pub const STILL_ACTIVE: &str = "Still Active";

/// key: visit-model -> entrance/exit record for one customer
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Visit {
    pub id: i32,
    pub customer_id: i32,
    pub visit_date: NaiveDate,
    pub entrance_time: NaiveTime,
    pub exit_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub visit_duration: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    pub fn entered_at(&self) -> NaiveDateTime {
        self.visit_date.and_time(self.entrance_time)
    }

    pub fn duration_display(&self) -> &str {
        match (self.exit_time, self.visit_duration.as_deref()) {
            (None, _) => STILL_ACTIVE,
            (Some(_), Some(duration)) => duration,
            (Some(_), None) => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatusFilter {
    Active,
    Closed,
}

impl VisitStatusFilter {
    fn as_str(&self) -> &'static str {
        match self {
            VisitStatusFilter::Active => "active",
            VisitStatusFilter::Closed => "closed",
        }
    }
}

/// Listing filters; date bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitFilter {
    #[serde(default)]
    pub status: Option<VisitStatusFilter>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub customer_id: Option<i32>,
}

pub async fn insert_visit<'c, E>(
    executor: E,
    customer_id: i32,
    visit_date: NaiveDate,
    entrance_time: NaiveTime,
) -> Result<Visit, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Visit>(
        r#"
        INSERT INTO visits (customer_id, visit_date, entrance_time)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(customer_id)
    .bind(visit_date)
    .bind(entrance_time)
    .fetch_one(executor)
    .await
}

pub async fn find_visit<'c, E>(executor: E, visit_id: i32) -> Result<Option<Visit>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1")
        .bind(visit_id)
        .fetch_optional(executor)
        .await
}

/// Reads the visit and holds its row lock for the rest of the transaction.
pub async fn lock_visit<'c, E>(executor: E, visit_id: i32) -> Result<Option<Visit>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1 FOR UPDATE")
        .bind(visit_id)
        .fetch_optional(executor)
        .await
}

/// Writes the exit fields of a visit that is still open in storage.
pub async fn persist_closed_visit<'c, E>(executor: E, visit: &Visit) -> Result<Visit, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, Visit>(
        r#"
        UPDATE visits
        SET exit_time = $2,
            duration_minutes = $3,
            visit_duration = $4,
            updated_at = NOW()
        WHERE id = $1
          AND exit_time IS NULL
        RETURNING *
        "#,
    )
    .bind(visit.id)
    .bind(visit.exit_time)
    .bind(visit.duration_minutes)
    .bind(visit.visit_duration.as_deref())
    .fetch_optional(executor)
    .await?;

    row.ok_or(sqlx::Error::RowNotFound)
}

pub async fn list_visits<'c, E>(executor: E, filter: &VisitFilter) -> Result<Vec<Visit>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Visit>(
        r#"
        SELECT * FROM visits
        WHERE ($1::TEXT IS NULL
               OR ($1 = 'active' AND exit_time IS NULL)
               OR ($1 = 'closed' AND exit_time IS NOT NULL))
          AND ($2::DATE IS NULL OR visit_date >= $2)
          AND ($3::DATE IS NULL OR visit_date <= $3)
          AND ($4::INTEGER IS NULL OR customer_id = $4)
        ORDER BY visit_date DESC, entrance_time DESC, id DESC
        "#,
    )
    .bind(filter.status.as_ref().map(VisitStatusFilter::as_str))
    .bind(filter.from)
    .bind(filter.until)
    .bind(filter.customer_id)
    .fetch_all(executor)
    .await
}
