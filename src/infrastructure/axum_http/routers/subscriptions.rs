use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    application::usercases::subscription_lifecycle::SubscriptionLifecycleUseCase,
    infrastructure::axum_http::error_responses::AppError,
};

pub fn routes(lifecycle: Arc<SubscriptionLifecycleUseCase>) -> Router {
    Router::new()
        .route("/:user_id", get(current_subscription))
        .route("/:user_id/cancel", post(cancel_auto_renew))
        .with_state(lifecycle)
}

pub async fn current_subscription(
    State(lifecycle): State<Arc<SubscriptionLifecycleUseCase>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(lifecycle.current(user_id).await?))
}

pub async fn cancel_auto_renew(
    State(lifecycle): State<Arc<SubscriptionLifecycleUseCase>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(lifecycle.cancel_auto_renew(user_id).await?))
}
