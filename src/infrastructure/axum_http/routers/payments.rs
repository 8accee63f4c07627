use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    application::usercases::{
        payment_initiation::PaymentInitiationUseCase,
        payment_reconciliation::PaymentReconciliationUseCase,
    },
    domain::value_objects::payments::{PlanPaymentRequest, RenewalPaymentRequest},
    infrastructure::axum_http::error_responses::AppError,
};

#[derive(Clone)]
pub struct PaymentsState {
    pub initiation: Arc<PaymentInitiationUseCase>,
    pub reconciliation: Arc<PaymentReconciliationUseCase>,
}

pub fn routes(
    initiation: Arc<PaymentInitiationUseCase>,
    reconciliation: Arc<PaymentReconciliationUseCase>,
) -> Router {
    Router::new()
        .route("/", post(initiate_plan_payment))
        .route("/renewals", post(initiate_renewal))
        .route("/:correlation_id/status", get(payment_status))
        .with_state(PaymentsState {
            initiation,
            reconciliation,
        })
}

pub async fn initiate_plan_payment(
    State(state): State<PaymentsState>,
    Json(request): Json<PlanPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let initiated = state
        .initiation
        .initiate_plan_payment(request.user_id, request.plan_type, &request.phone_number)
        .await?;

    Ok(Json(initiated))
}

pub async fn initiate_renewal(
    State(state): State<PaymentsState>,
    Json(request): Json<RenewalPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let initiated = state
        .initiation
        .initiate_renewal(request.user_id, &request.phone_number)
        .await?;

    Ok(Json(initiated))
}

pub async fn payment_status(
    State(state): State<PaymentsState>,
    Path(correlation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .reconciliation
        .refresh_from_poll(&correlation_id)
        .await?;

    Ok(Json(view))
}
