use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ledger::{insert_subscription, list_for_customer};
use super::models::{subscription_terms, Subscription};
use crate::config;
use crate::durations::club_now;
use crate::error::{AppError, AppResult};
use crate::packages::find_package;

/// key: subscriptions-api -> package purchase and balance listing
pub fn routes() -> Router {
    Router::new()
        .route("/api/subscriptions", post(create_subscription))
        .route(
            "/api/customers/:id/subscriptions",
            get(list_customer_subscriptions),
        )
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub customer_id: i32,
    pub package_id: Uuid,
    #[serde(default)]
    pub remaining_hours: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub active: bool,
}

/// Sells `request.package_id` to a customer on `today`.
pub async fn subscribe(
    pool: &PgPool,
    request: &SubscribeRequest,
    today: NaiveDate,
) -> AppResult<Subscription> {
    let customer_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
            .bind(request.customer_id)
            .fetch_one(pool)
            .await?;
    if !customer_exists {
        return Err(AppError::NotFound);
    }
    let package = find_package(pool, request.package_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let terms = subscription_terms(&package, today, request.remaining_hours)?;
    let subscription = insert_subscription(
        pool,
        request.customer_id,
        package.id,
        terms.remaining_hours,
        terms.ends_at,
    )
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error creating subscription");
        AppError::Db(e)
    })?;

    tracing::info!(
        customer_id = subscription.customer_id,
        subscription = %subscription.id,
        package = %package.id,
        remaining_hours = %subscription.remaining_hours,
        ends_at = %subscription.ends_at,
        "subscription created"
    );
    Ok(subscription)
}

pub async fn create_subscription(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<Json<SubscriptionView>> {
    let today = club_now(*config::CLUB_UTC_OFFSET).date();
    let subscription = subscribe(&pool, &payload, today).await?;
    let active = subscription.is_active(today);
    Ok(Json(SubscriptionView {
        subscription,
        active,
    }))
}

pub async fn list_customer_subscriptions(
    Extension(pool): Extension<PgPool>,
    Path(customer_id): Path<i32>,
) -> AppResult<Json<Vec<SubscriptionView>>> {
    let today = club_now(*config::CLUB_UTC_OFFSET).date();
    let subscriptions = list_for_customer(&pool, customer_id).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(|subscription| SubscriptionView {
                active: subscription.is_active(today),
                subscription,
            })
            .collect(),
    ))
}
