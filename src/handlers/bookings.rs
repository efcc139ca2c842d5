use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::PaginationParams;
use crate::auth::StaffUser;
use crate::errors::ServiceError;
use crate::models::BookingKind;
use crate::services::bookings::{
    AssignStaffRequest, BookingListResponse, BookingResponse, CreateBookingRequest,
    PublicStatusResponse, UpdateBookingStatusRequest,
};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Booking reference number, e.g. REG-2026-0A1B2C
    pub reference_number: String,
    /// Contact email given at intake; must match exactly
    pub email: String,
}

/// Create a booking from a guest intake submission
#[utoipa::path(
    post,
    path = "/api/v1/{kind}",
    params(("kind" = String, Path, description = "registrations or consultations")),
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = crate::ApiResponse<BookingResponse>),
        (status = 400, description = "Invalid intake", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown offering", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), ServiceError> {
    let booking = state.services.bookings.create(kind, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(booking))))
}

/// Guest-safe status lookup
///
/// Requires an exact match of both reference number and contact email.
/// A miss on either returns the same 404; the endpoint never reveals
/// which of the two was wrong.
#[utoipa::path(
    get,
    path = "/api/v1/{kind}/status",
    params(
        ("kind" = String, Path, description = "registrations or consultations"),
        StatusQuery
    ),
    responses(
        (status = 200, description = "Booking status", body = crate::ApiResponse<PublicStatusResponse>),
        (status = 404, description = "No matching booking", body = crate::errors::ErrorResponse)
    ),
    tag = "Bookings"
)]
pub async fn get_public_status(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<PublicStatusResponse> {
    let status = state
        .services
        .bookings
        .get_public_status(kind, &query.reference_number, &query.email)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
) -> ApiResult<BookingResponse> {
    let booking = state.services.bookings.get(kind, id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    _staff: StaffUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<BookingListResponse> {
    let page = params.page.max(1);
    let per_page = params.per_page.clamp(1, 100);
    let list = state.services.bookings.list(kind, page, per_page).await?;
    Ok(Json(ApiResponse::success(list)))
}

/// Assign a staff member to a booking.
///
/// Assignment auto-promotes a booking that is still awaiting activation
/// to the kind's active state, even when payment is pending.
pub async fn assign_staff(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignStaffRequest>,
) -> ApiResult<BookingResponse> {
    let booking = state
        .services
        .bookings
        .assign(kind, id, request.staff_id)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBookingStatusRequest>,
) -> ApiResult<BookingResponse> {
    let booking = state
        .services
        .bookings
        .update_status(kind, id, request)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// The calendar widget reported a booked slot for a paid consultation.
pub async fn mark_scheduled(
    State(state): State<AppState>,
    Extension(kind): Extension<BookingKind>,
    Path(id): Path<Uuid>,
) -> ApiResult<BookingResponse> {
    let booking = state.services.bookings.mark_scheduled(kind, id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// Routes shared by both booking kinds, nested per kind under
/// `/api/v1/registrations` and `/api/v1/consultations`. The kind is
/// injected as an extension so one set of handlers serves both.
pub fn booking_routes(kind: BookingKind) -> Router<AppState> {
    let router = Router::new()
        .route("/", post(create_booking).get(list_bookings))
        .route("/status", get(get_public_status))
        .route("/:id", get(get_booking))
        .route("/:id/assign", patch(assign_staff))
        .route("/:id/status", patch(update_status))
        .route("/:id/pay", post(super::payments::initiate_payment))
        .route(
            "/:id/confirm-payment",
            post(super::payments::confirm_payment),
        );

    let router = if kind == BookingKind::Consultation {
        router.route("/:id/scheduled", post(mark_scheduled))
    } else {
        router
    };

    router.layer(Extension(kind))
}
