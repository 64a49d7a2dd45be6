use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, BillId, PaymentId, PaymentStatus, PropertyId};
use super::repository::{BillingStore, Directory, NotificationPublisher};
use super::service::{BillPatch, BillingError, BillingService, NewBill, NewPayment};

/// Router builder exposing the engine's HTTP surface. The caller layers
/// health/metrics endpoints and middleware on top.
pub fn billing_router<S, D, N>(service: Arc<BillingService<S, D, N>>) -> Router
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/billing/bills", post(create_bill_handler::<S, D, N>))
        .route(
            "/api/v1/billing/bills/:bill_id",
            get(bill_statement_handler::<S, D, N>).patch(update_bill_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/bills/:bill_id/cancel",
            post(cancel_bill_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/payments",
            post(process_payment_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/payments/:payment_id/status",
            post(update_payment_status_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/payments/:payment_id/refund",
            post(refund_payment_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/runs/recurring",
            post(recurring_run_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/properties/:property_id/runs",
            post(property_run_handler::<S, D, N>),
        )
        .route(
            "/api/v1/billing/reports/revenue/:year",
            get(revenue_report_handler::<S, D, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateBillRequest {
    #[serde(flatten)]
    pub(crate) bill: NewBill,
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateBillRequest {
    #[serde(flatten)]
    pub(crate) patch: BillPatch,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorRequest {
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessPaymentRequest {
    #[serde(flatten)]
    pub(crate) payment: NewPayment,
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentStatusRequest {
    pub(crate) status: PaymentStatus,
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefundRequest {
    pub(crate) amount: Decimal,
    pub(crate) reason: String,
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

fn run_timestamp(as_of: Option<DateTime<Utc>>) -> DateTime<Utc> {
    as_of.unwrap_or_else(Utc::now)
}

pub(crate) async fn create_bill_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Json(request): Json<CreateBillRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.create_bill(request.bill, &request.actor, now) {
        Ok(bill) => (StatusCode::CREATED, Json(bill)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn bill_statement_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(bill_id): Path<String>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    match service.bill_statement(&BillId(bill_id), Utc::now()) {
        Ok(statement) => (StatusCode::OK, Json(statement)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_bill_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(bill_id): Path<String>,
    Json(request): Json<UpdateBillRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.update_bill(&BillId(bill_id), request.patch, now) {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_bill_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(bill_id): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.cancel_bill(&BillId(bill_id), &request.actor, now) {
        Ok(bill) => (StatusCode::OK, Json(bill)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn process_payment_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Json(request): Json<ProcessPaymentRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.process_payment(request.payment, &request.actor, now) {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_payment_status_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(payment_id): Path<String>,
    Json(request): Json<PaymentStatusRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.update_payment_status(&PaymentId(payment_id), request.status, &request.actor, now)
    {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn refund_payment_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(payment_id): Path<String>,
    Json(request): Json<RefundRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.refund_payment(
        &PaymentId(payment_id),
        request.amount,
        &request.reason,
        &request.actor,
        now,
    ) {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn recurring_run_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Json(request): Json<ActorRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.generate_recurring_bills(&request.actor, now) {
        Ok(created) => (StatusCode::OK, Json(json!({ "bills_created": created }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn property_run_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(property_id): Path<String>,
    Json(request): Json<ActorRequest>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let now = run_timestamp(request.as_of);
    match service.generate_bills_for_property(&PropertyId(property_id), &request.actor, now) {
        Ok(created) => (StatusCode::OK, Json(json!({ "bills_created": created }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn revenue_report_handler<S, D, N>(
    State(service): State<Arc<BillingService<S, D, N>>>,
    Path(year): Path<i32>,
) -> Response
where
    S: BillingStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    match service.monthly_revenue_summary(year) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: BillingError) -> Response {
    let status = match &err {
        BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
        BillingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BillingError::InvalidState(_) | BillingError::Conflict => StatusCode::CONFLICT,
        BillingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}
