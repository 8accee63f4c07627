use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use tracing::info;

use crate::{
    application::usercases::payment_reconciliation::PaymentReconciliationUseCase,
    infrastructure::axum_http::error_responses::AppError,
};

pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn routes(reconciliation: Arc<PaymentReconciliationUseCase>) -> Router {
    Router::new()
        .route("/:provider", post(receive_callback))
        .with_state(reconciliation)
}

/// Gateways retry anything that is not a 2xx, so replays and unknown
/// correlation ids still answer 200.
pub async fn receive_callback(
    State(reconciliation): State<Arc<PaymentReconciliationUseCase>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = reconciliation
        .handle_webhook(&provider, &body, signature)
        .await?;
    info!(%provider, outcome = ?outcome, "webhooks: callback handled");

    Ok(Json(json!({ "success": true })))
}
