use axum::{routing::get, Router};

use crate::{customers, packages, subscriptions, visits};

pub async fn root() -> &'static str {
    "Front Desk API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .merge(customers::routes())
        .merge(packages::routes())
        .merge(subscriptions::routes())
        .merge(visits::routes())
}
