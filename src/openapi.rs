use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vakeel API",
        version = "0.3.0",
        description = r#"
# Vakeel Booking API

Payment-gated booking orchestration for legal services: company and
trademark registrations, and paid consultations.

## Flow

1. `POST /api/v1/{kind}` creates a booking in `pending_payment`.
2. `POST /api/v1/{kind}/{id}/pay` opens a hosted checkout session and
   returns the checkout URL plus a tracker token.
3. The client opens the checkout in a popup; on completion it calls
   `POST /api/v1/{kind}/{id}/confirm-payment` with the tracker. The
   server re-verifies the session with the gateway before flipping the
   booking to `paid`.
4. Paid consultations unlock calendar scheduling; registrations move to
   staff assignment.

`{kind}` is `registrations` or `consultations`.

## Authentication

Guest endpoints (create, pay, confirm, status) are public. Staff
endpoints require a JWT bearer token with a staff role:

```
Authorization: Bearer <token>
```

## Errors

Failures use a consistent envelope with stable HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "Booking already paid: REG-2026-0A1B2C",
  "timestamp": "2026-03-14T10:30:00.000Z"
}
```
        "#,
        contact(
            name = "Vakeel Platform",
            email = "engineering@vakeel.pk",
            url = "https://vakeel.pk"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://api.vakeel.pk", description = "Production server"),
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Bookings", description = "Booking creation and guest status"),
        (name = "Payments", description = "Hosted checkout initiation and confirmation")
    ),
    paths(
        crate::handlers::bookings::create_booking,
        crate::handlers::bookings::get_public_status,
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::confirm_payment,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::services::bookings::CreateBookingRequest,
            crate::services::bookings::BookingResponse,
            crate::services::bookings::PublicStatusResponse,
            crate::services::bookings::AssignStaffRequest,
            crate::services::bookings::UpdateBookingStatusRequest,
            crate::services::payments::InitiatePaymentRequest,
            crate::services::payments::InitiatePaymentResponse,
            crate::services::payments::ConfirmPaymentRequest,
            crate::models::status::BookingKind,
            crate::models::status::BookingStatus,
            crate::models::status::PaymentStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
