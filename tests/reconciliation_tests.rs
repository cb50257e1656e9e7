use careerlens::application::reconciler::Transition;
use careerlens::application::service::{WebhookCustomer, WebhookEvent};
use careerlens::config::GatewayConfig;
use careerlens::domain::payment::PaymentState;
use careerlens::domain::ports::GatewayStatus;
use careerlens::infrastructure::intasend::IntaSendGateway;
use rand::seq::SliceRandom;
use rust_decimal_macros::dec;

mod common;

use common::{Harness, HarnessBuilder, harness};

fn webhook(invoice_id: &str, event: &str) -> WebhookEvent {
    WebhookEvent {
        event: Some(event.to_string()),
        transaction_id: Some(invoice_id.to_string()),
        amount: Some(dec!(20)),
        customer: Some(WebhookCustomer {
            email: Some("payer@example.com".to_string()),
            phone_number: Some("+254712345678".to_string()),
        }),
        ..WebhookEvent::default()
    }
}

async fn open_invoice(h: &Harness) -> String {
    h.service
        .initiate_payment(Some("payer@example.com"), Some("0712345678"))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_poll_and_webhook_record_once() {
    let h = harness();
    let invoice_id = open_invoice(&h).await;
    h.gateway.report(&invoice_id, PaymentState::Complete);

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let service = h.service.clone();
            let invoice_id = invoice_id.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    service
                        .receive_webhook(&webhook(&invoice_id, "payment.completed"))
                        .await
                } else {
                    service.check_payment_status(&invoice_id).await.ok();
                    None
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let records = h.service.reconciler().records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transaction_id, invoice_id);
    assert_eq!(records[0].amount.value(), dec!(20));
}

#[tokio::test]
async fn test_outcome_is_first_terminal_observation() {
    let h = harness();

    for round in 0..40 {
        let invoice_id = open_invoice(&h).await;
        let mut observations = vec![
            (true, PaymentState::Pending),
            (false, PaymentState::Pending),
            (true, PaymentState::Complete),
            (false, PaymentState::Complete),
            (true, PaymentState::Failed),
        ];
        observations.shuffle(&mut rand::thread_rng());
        let expected = observations
            .iter()
            .map(|(_, state)| *state)
            .find(|state| state.is_terminal())
            .unwrap();

        for (by_webhook, state) in &observations {
            if *by_webhook {
                let event = match state {
                    PaymentState::Complete => webhook(&invoice_id, "payment.completed"),
                    PaymentState::Failed => webhook(&invoice_id, "payment.failed"),
                    _ => WebhookEvent {
                        state: Some("PENDING".to_string()),
                        ..webhook(&invoice_id, "payment.updated")
                    },
                };
                h.service.receive_webhook(&event).await;
            } else {
                h.gateway.report(&invoice_id, *state);
                h.service.check_payment_status(&invoice_id).await.unwrap();
            }
        }

        let invoice = h
            .service
            .reconciler()
            .invoice(&invoice_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.state, expected, "round {round}: {observations:?}");

        let record = h.service.reconciler().record(&invoice_id).await.unwrap();
        assert_eq!(
            record.is_some(),
            expected == PaymentState::Complete,
            "round {round}: {observations:?}"
        );
    }
}

#[tokio::test]
async fn test_transient_poll_error_leaves_invoice_open() {
    let h = harness();
    let invoice_id = open_invoice(&h).await;
    h.gateway.set_status(&invoice_id, GatewayStatus::transient_error());

    let status = h.service.check_payment_status(&invoice_id).await.unwrap();
    assert_eq!(status.state, PaymentState::Error);

    let invoice = h
        .service
        .reconciler()
        .invoice(&invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.state, PaymentState::Pending);

    h.gateway.report(&invoice_id, PaymentState::Complete);
    let status = h.service.check_payment_status(&invoice_id).await.unwrap();
    assert_eq!(status.state, PaymentState::Complete);
    assert!(h.service.reconciler().record(&invoice_id).await.unwrap().is_some());
}

/// Gateway stub whose status endpoint always answers 429.
async fn throttled_gateway() -> IntaSendGateway {
    let app = axum::Router::new()
        .route(
            "/api/v1/payment/mpesa-stk-push/",
            axum::routing::post(|| async {
                axum::Json(serde_json::json!({ "invoice": { "invoice_id": "INV-429" } }))
            }),
        )
        .route(
            "/api/v1/payment/status/",
            axum::routing::post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "{}") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let config = GatewayConfig {
        publishable_key: Some("ISPubKey_test".to_string()),
        secret_key: Some("ISSecretKey_test".to_string()),
        timeout_secs: 2,
        ..GatewayConfig::default()
    };
    IntaSendGateway::with_base_url(&config, &format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn test_throttled_poll_does_not_close_invoice() {
    let h = HarnessBuilder::new()
        .live_gateway(Box::new(throttled_gateway().await))
        .build();
    let invoice_id = open_invoice(&h).await;
    assert_eq!(invoice_id, "INV-429");

    let status = h.service.check_payment_status(&invoice_id).await.unwrap();
    assert_eq!(status.state, PaymentState::Error);
    let invoice = h
        .service
        .reconciler()
        .invoice(&invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.state, PaymentState::Pending);

    let outcome = h
        .service
        .receive_webhook(&webhook(&invoice_id, "payment.completed"))
        .await;
    assert_eq!(outcome, Some(Transition::Recorded));
    assert_eq!(h.service.reconciler().records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_late_webhook_after_failure_is_ignored() {
    let h = harness();
    let invoice_id = open_invoice(&h).await;
    h.gateway.report(&invoice_id, PaymentState::Failed);
    let status = h.service.check_payment_status(&invoice_id).await.unwrap();
    assert_eq!(status.state, PaymentState::Failed);

    let outcome = h
        .service
        .receive_webhook(&webhook(&invoice_id, "payment.completed"))
        .await;
    assert_eq!(
        outcome,
        Some(Transition::Ignored {
            current: PaymentState::Failed
        })
    );
    assert!(h.service.reconciler().records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_challenge_is_enforced() {
    let h = HarnessBuilder::new().challenge("s3cret").build();
    let invoice_id = open_invoice(&h).await;

    let forged = webhook(&invoice_id, "payment.completed");
    assert_eq!(h.service.receive_webhook(&forged).await, None);
    assert!(h.service.reconciler().records().await.unwrap().is_empty());

    let genuine = WebhookEvent {
        challenge: Some("s3cret".to_string()),
        ..webhook(&invoice_id, "payment.completed")
    };
    assert_eq!(
        h.service.receive_webhook(&genuine).await,
        Some(Transition::Recorded)
    );
}

#[tokio::test]
async fn test_webhook_for_unknown_invoice_uses_payload() {
    let h = harness();
    let outcome = h
        .service
        .receive_webhook(&WebhookEvent {
            amount: Some(dec!(35.50)),
            ..webhook("INV-EXT", "payment.completed")
        })
        .await;
    assert_eq!(outcome, Some(Transition::Recorded));

    let record = h.service.reconciler().record("INV-EXT").await.unwrap().unwrap();
    assert_eq!(record.amount.value(), dec!(35.50));
    assert_eq!(record.payer_email, "payer@example.com");
    let invoice = h.service.reconciler().invoice("INV-EXT").await.unwrap().unwrap();
    assert_eq!(invoice.payer_phone, "254712345678");
}
