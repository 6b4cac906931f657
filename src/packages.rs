use axum::{routing::get, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// key: package-model -> purchasable bucket of hours
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub number_of_hours: i32,
    pub duration_in_days: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub number_of_hours: i32,
    pub duration_in_days: i32,
}

impl NewPackage {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name required".into()));
        }
        if self.number_of_hours <= 0 {
            return Err(AppError::BadRequest(
                "number_of_hours must be positive".into(),
            ));
        }
        if self.duration_in_days <= 0 {
            return Err(AppError::BadRequest(
                "duration_in_days must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub fn routes() -> Router {
    Router::new().route("/api/packages", get(list_packages).post(create_package))
}

pub async fn find_package<'c, E>(executor: E, package_id: Uuid) -> Result<Option<Package>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE id = $1")
        .bind(package_id)
        .fetch_optional(executor)
        .await
}

pub async fn list_packages(Extension(pool): Extension<PgPool>) -> AppResult<Json<Vec<Package>>> {
    let packages = sqlx::query_as::<_, Package>(
        "SELECT * FROM packages ORDER BY number_of_hours ASC, created_at ASC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(packages))
}

pub async fn create_package(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<NewPackage>,
) -> AppResult<Json<Package>> {
    payload.validate()?;
    let package = sqlx::query_as::<_, Package>(
        r#"
        INSERT INTO packages (id, name, number_of_hours, duration_in_days)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(payload.number_of_hours)
    .bind(payload.duration_in_days)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error creating package");
        AppError::Db(e)
    })?;
    tracing::info!(package = %package.id, hours = package.number_of_hours, "package created");
    Ok(Json(package))
}
