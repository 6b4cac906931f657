use axum::extract::Path;
use axum::{routing::get, routing::post, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::durations::format_hours_minutes;
use crate::error::{AppError, AppResult};

const MAX_FIELD_LEN: usize = 255;

/// key: customer-model -> identity plus cached hour total
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: i32,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub national_id: Option<String>,
    pub phone_number: Option<String>,
    pub total_hours: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Label used by pickers: `"<phone> - <first> [<middle> ]<last>"`.
    pub fn display_name(&self) -> String {
        let name = [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        match self.phone_number.as_deref().map(str::trim) {
            Some(phone) if !phone.is_empty() => format!("{phone} - {name}"),
            _ => name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerView {
    #[serde(flatten)]
    pub customer: Customer,
    pub display_name: String,
}

impl From<Customer> for CustomerView {
    fn from(customer: Customer) -> Self {
        Self {
            display_name: customer.display_name(),
            customer,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl NewCustomer {
    pub fn validate(&self) -> AppResult<()> {
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        for (field, value) in [
            ("middle_name", &self.middle_name),
            ("national_id", &self.national_id),
            ("phone_number", &self.phone_number),
        ] {
            if let Some(value) = value {
                limit_length(field, value)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct TotalHours {
    pub customer_id: i32,
    pub total_hours: String,
}

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} required")));
    }
    limit_length(field, value)
}

fn limit_length(field: &str, value: &str) -> AppResult<()> {
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::BadRequest(format!(
            "{field} longer than {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn routes() -> Router {
    Router::new()
        .route("/api/customers", post(create_customer))
        .route("/api/customers/:id", get(get_customer))
        .route("/api/customers/:id/total-hours", get(total_hours))
}

pub async fn insert_customer(pool: &PgPool, payload: &NewCustomer) -> AppResult<Customer> {
    payload.validate()?;
    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (first_name, middle_name, last_name, national_id, phone_number)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(payload.first_name.trim())
    .bind(payload.middle_name.as_deref().map(str::trim))
    .bind(payload.last_name.trim())
    .bind(payload.national_id.as_deref().map(str::trim))
    .bind(payload.phone_number.as_deref().map(str::trim))
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error creating customer");
        AppError::Db(e)
    })?;
    tracing::info!(customer_id = customer.id, "customer registered");
    Ok(customer)
}

pub async fn find_customer(pool: &PgPool, customer_id: i32) -> AppResult<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)
}

/// key: customer-total-hours -> lazy recompute of the cached summary
///
/// Sums the durations of every closed visit and rewrites `total_hours` only when the cached
/// value is stale.
pub async fn recompute_total_hours(pool: &PgPool, customer_id: i32) -> AppResult<String> {
    let cached: Option<String> =
        sqlx::query_scalar("SELECT total_hours FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(pool)
            .await?;
    let Some(cached) = cached else {
        return Err(AppError::NotFound);
    };

    let total_minutes: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(duration_minutes), 0)::BIGINT
        FROM visits
        WHERE customer_id = $1
          AND exit_time IS NOT NULL
          AND duration_minutes IS NOT NULL
        "#,
    )
    .bind(customer_id)
    .fetch_one(pool)
    .await?;

    let total_hours = format_hours_minutes(u64::try_from(total_minutes).unwrap_or_default());
    if total_hours != cached {
        sqlx::query("UPDATE customers SET total_hours = $2, updated_at = NOW() WHERE id = $1")
            .bind(customer_id)
            .bind(&total_hours)
            .execute(pool)
            .await?;
        tracing::debug!(customer_id, %total_hours, previous = %cached, "refreshed cached total hours");
    }
    Ok(total_hours)
}

pub async fn create_customer(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<NewCustomer>,
) -> AppResult<Json<CustomerView>> {
    let customer = insert_customer(&pool, &payload).await?;
    Ok(Json(customer.into()))
}

pub async fn get_customer(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<CustomerView>> {
    let customer = find_customer(&pool, id).await?;
    Ok(Json(customer.into()))
}

pub async fn total_hours(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> AppResult<Json<TotalHours>> {
    let total_hours = recompute_total_hours(&pool, id).await?;
    Ok(Json(TotalHours {
        customer_id: id,
        total_hours,
    }))
}
