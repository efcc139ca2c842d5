use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::models::BookingKind;
use crate::services::bookings::BookingResponse;
use crate::services::payments::{
    ConfirmPaymentRequest, InitiatePaymentRequest, InitiatePaymentResponse,
};
use crate::{ApiResponse, ApiResult, AppState};

/// Open a hosted checkout session for a pending booking
///
/// The charge amount is the fee snapshot taken at booking creation;
/// client-supplied amounts are never accepted. Re-initiating an unpaid
/// booking replaces its tracker; a paid booking is rejected with 409.
#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{id}/pay",
    params(
        ("kind" = String, Path, description = "registrations or consultations"),
        ("id" = Uuid, Path, description = "Booking id")
    ),
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Checkout session created", body = crate::ApiResponse<InitiatePaymentResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking already paid", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    Path(id): Path<Uuid>,
    Json(request): Json<InitiatePaymentRequest>,
) -> ApiResult<InitiatePaymentResponse> {
    let session = state.services.payments.initiate(kind, id, request).await?;
    Ok(Json(ApiResponse::success(session)))
}

/// Confirm a completed checkout
///
/// Idempotent: confirming an already-paid booking returns its current
/// state without re-running side effects. The tracker is checked
/// against the stored session and re-verified with the gateway before
/// any state changes.
#[utoipa::path(
    post,
    path = "/api/v1/{kind}/{id}/confirm-payment",
    params(
        ("kind" = String, Path, description = "registrations or consultations"),
        ("id" = Uuid, Path, description = "Booking id")
    ),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = crate::ApiResponse<BookingResponse>),
        (status = 400, description = "Tracker mismatch or no session", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> ApiResult<BookingResponse> {
    let booking = state.services.payments.confirm(kind, id, request).await?;
    Ok(Json(ApiResponse::success(booking)))
}
