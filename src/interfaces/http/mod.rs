//! HTTP surface of the service.
//!
//! Handlers only translate between JSON and [`PremiumService`]; every
//! failure leaves as a classified status code with a JSON error body.

pub mod views;

use crate::application::service::{PremiumService, WebhookEvent};
use crate::error::ServiceError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;
use views::{IndexView, SuccessView};

pub type SharedService = Arc<PremiumService>;

#[derive(Debug, Default, Deserialize)]
pub struct ExplainBody {
    pub topic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitiatePaymentBody {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaymentStatusBody {
    state: crate::domain::payment::PaymentState,
    #[serde(with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuccessParams {
    pub transaction_id: Option<String>,
    pub amount: Option<String>,
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/explain", post(explain))
        .route("/get_relevance", post(explain))
        .route("/health", get(health))
        .route("/initiate_payment", post(initiate_payment))
        .route("/check_payment_status/:invoice_id", get(check_payment_status))
        .route("/webhook", post(webhook))
        .route("/success", get(success))
        .route("/test_db", get(test_db))
        .route("/test_ai", get(test_ai))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn status_for(e: &ServiceError) -> StatusCode {
    match e {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unavailable(_) | ServiceError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Gateway(_) | ServiceError::Timeout(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Message safe to show a caller. Storage driver text stays in the logs.
fn public_message(e: &ServiceError) -> String {
    match e {
        ServiceError::Validation(msg) | ServiceError::Unavailable(msg) => msg.clone(),
        ServiceError::Persistence(_) => "Internal storage error".to_string(),
        other => other.to_string(),
    }
}

async fn index(State(service): State<SharedService>) -> Html<String> {
    Html(
        IndexView {
            publishable_key: service.publishable_key(),
            price: service.price().value(),
            currency: service.currency(),
        }
        .render(),
    )
}

async fn explain(
    State(service): State<SharedService>,
    body: Option<Json<ExplainBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    match service.explain(body.topic.as_deref()).await {
        Ok(explanation) => Json(explanation).into_response(),
        Err(e) => (status_for(&e), Json(json!({ "error": public_message(&e) }))).into_response(),
    }
}

async fn health(State(service): State<SharedService>) -> Response {
    Json(service.health()).into_response()
}

async fn initiate_payment(
    State(service): State<SharedService>,
    body: Option<Json<InitiatePaymentBody>>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    match service
        .initiate_payment(body.email.as_deref(), body.phone.as_deref())
        .await
    {
        Ok(invoice_id) => {
            Json(json!({ "success": true, "invoice_id": invoice_id })).into_response()
        }
        Err(e) => {
            if !matches!(e, ServiceError::Validation(_)) {
                error!(error = %e, "Payment initiation failed");
            }
            (
                status_for(&e),
                Json(json!({ "success": false, "error": public_message(&e) })),
            )
                .into_response()
        }
    }
}

async fn check_payment_status(
    State(service): State<SharedService>,
    Path(invoice_id): Path<String>,
) -> Response {
    match service.check_payment_status(&invoice_id).await {
        Ok(status) => Json(PaymentStatusBody {
            state: status.state,
            amount: status.amount,
        })
        .into_response(),
        Err(e) => {
            error!(invoice_id = %invoice_id, error = %e, "Payment status check failed");
            (status_for(&e), Json(json!({ "error": public_message(&e) }))).into_response()
        }
    }
}

async fn webhook(
    State(service): State<SharedService>,
    event: Option<Json<WebhookEvent>>,
) -> Json<serde_json::Value> {
    match event {
        Some(Json(event)) => {
            service.receive_webhook(&event).await;
        }
        None => error!("Unreadable webhook payload"),
    }
    Json(json!({ "status": "received" }))
}

async fn success(Query(params): Query<SuccessParams>) -> Html<String> {
    Html(
        SuccessView {
            transaction_id: params.transaction_id.as_deref(),
            amount: params.amount.as_deref(),
        }
        .render(),
    )
}

async fn test_db(State(service): State<SharedService>) -> &'static str {
    if service.test_database().await {
        "Database connection successful!"
    } else {
        "Database connection failed!"
    }
}

async fn test_ai(State(service): State<SharedService>) -> String {
    service.test_model().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            status_for(&ServiceError::Validation("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ServiceError::Unavailable("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ServiceError::Gateway("x".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            public_message(&ServiceError::Persistence("Duplicate entry 'x'".to_string())),
            "Internal storage error"
        );
        assert_eq!(
            public_message(&ServiceError::Validation("No topic provided".to_string())),
            "No topic provided"
        );
    }
}
