mod common;

use common::Fixture;
use reconciliation_engine::config::ReconciliationSettings;
use reconciliation_engine::error::AppError;
use reconciliation_engine::events::{EventType, ReconciliationEvent};
use reconciliation_engine::models::{AccountKind, CompanyScope};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_fixture(server: &MockServer) -> Fixture {
    Fixture::with_settings(ReconciliationSettings {
        auto_match_url: Some(format!("{}/auto-match", server.uri())),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_remote_auto_match_returns_report_and_invalidates_every_company() {
    let server = MockServer::start().await;
    let fx = remote_fixture(&server);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let both = CompanyScope::new(vec![a, b]).unwrap();
    fx.transaction(a, dec!(-10), 1).await;
    fx.payable(b, dec!(10), 1).await;

    Mock::given(method("POST"))
        .and(path("/auto-match"))
        .and(body_json(json!({ "company_ids": both.ids() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "examined": 12,
            "linked": 9,
            "skipped_ambiguous": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Cached panels for each company alone and for both together.
    for scope in [CompanyScope::single(a), CompanyScope::single(b), both.clone()] {
        fx.service.list_orphan_transactions(&scope, None).await.unwrap();
        fx.service
            .list_unmatched_accounts(&scope, AccountKind::Payable, None)
            .await
            .unwrap();
    }
    assert_eq!(fx.cache.len().await, 6);

    let report = fx.service.auto_match(&both).await.unwrap();

    assert_eq!(report.examined, 12);
    assert_eq!(report.linked, 9);
    assert_eq!(report.skipped_ambiguous, 3);
    assert_eq!(fx.cache.len().await, 0);

    let events = fx.events.events();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::AutoMatchCompleted);
    match &last.payload {
        ReconciliationEvent::AutoMatch(event) => {
            assert_eq!(event.matcher, "remote");
            assert_eq!(event.company_ids, both.ids().to_vec());
            assert_eq!(event.linked, 9);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_auto_match_server_error_is_http_error() {
    let server = MockServer::start().await;
    let fx = remote_fixture(&server);
    let company = Uuid::new_v4();
    let scope = CompanyScope::single(company);
    fx.transaction(company, dec!(-10), 1).await;

    Mock::given(method("POST"))
        .and(path("/auto-match"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    fx.service.list_orphan_transactions(&scope, None).await.unwrap();

    let err = fx.service.auto_match(&scope).await.unwrap_err();

    assert!(matches!(err, AppError::Http(_)));
    assert_eq!(fx.cache.len().await, 1);
    assert!(fx.events.event_types().is_empty());
}
