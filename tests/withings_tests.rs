//! Integration tests for Withings entry setup, webhooks, polling and
//! migrations.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    measure_response, webhook_id_of, withings_entry, withings_hub, MockWithingsApi,
    EXTERNAL_URL,
};
use http_body_util::BodyExt;
use hub_integrations::entries::{ConfigEntry, EntryState, Source};
use hub_integrations::webhooks::{WebhookMethod, WebhookRequest};
use hub_integrations::withings::{
    validate_config_schema, ApiError, DataManager, NotifySubscription, WithingsIntegration,
};
use hub_integrations::{ConfigError, HostUrl, Hub, HubConfig};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

async fn send(
    hub: &Hub,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, Option<Value>) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }
    let response = hub
        .router()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, body)
}

// Static configuration

#[test]
fn test_config_schema() {
    assert_eq!(validate_config_schema(&json!({})).unwrap(), None);

    let config = validate_config_schema(&json!({
        "withings": {"client_id": "my_client_id", "client_secret": "my_client_secret"}
    }))
    .unwrap()
    .unwrap();
    assert_eq!(config.client_id.as_ref(), "my_client_id");
    assert!(!config.use_webhook);

    let config = validate_config_schema(&json!({
        "withings": {"client_id": "a", "client_secret": "b", "use_webhook": true}
    }))
    .unwrap()
    .unwrap();
    assert!(config.use_webhook);

    assert!(matches!(
        validate_config_schema(&json!({"withings": {"client_secret": "b"}})),
        Err(ConfigError::MissingKey { key: "client_id", .. })
    ));
    assert_err!(validate_config_schema(
        &json!({"withings": {"client_id": "", "client_secret": "b"}})
    ));
    assert_err!(validate_config_schema(&json!({
        "withings": {"client_id": "a", "client_secret": "b", "use_webhook": "A"}
    })));
    assert_err!(validate_config_schema(&json!({
        "withings": {"client_id": "a", "client_secret": "b", "extra": 1}
    })));
}

#[tokio::test]
async fn test_setup_without_config_or_entries_does_nothing() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, integration) = withings_hub(api.clone());

    assert_ok!(hub.async_setup(&json!({})).await);
    hub.block_till_done().await;

    assert!(integration.config().is_none());
    assert!(hub.entries("withings").is_empty());
    assert_eq!(hub.pending_tasks(), 0);
    assert_eq!(api.measure_calls(), 0);
}

#[tokio::test]
async fn test_invalid_static_config_fails_setup() {
    let (hub, _) = withings_hub(Arc::new(MockWithingsApi::default()));
    assert_err!(
        hub.async_setup(&json!({
            "withings": {"client_id": "a", "client_secret": "b", "use_webhook": "A"}
        }))
        .await
    );
}

// Subscriptions

#[tokio::test]
async fn test_webhook_mode_subscribes_and_revokes_bed_events() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, integration) = withings_hub(api.clone());
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let entry_id = hub.add_entry(entry).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    let url = format!("{EXTERNAL_URL}/api/webhook/{webhook_id}");
    assert_eq!(
        api.subscribed(),
        vec![
            (url.clone(), 1),
            (url.clone(), 4),
            (url.clone(), 16),
            (url.clone(), 44)
        ]
    );
    assert_eq!(api.revoked(), vec![(url.clone(), 50), (url, 51)]);
    assert!(hub.has_webhook(&webhook_id));

    let manager = integration.data_manager(&entry_id).unwrap();
    assert!(manager.is_subscribed());
    assert_eq!(manager.poll_interval(), DataManager::WEBHOOK_POLL_INTERVAL);
}

#[tokio::test]
async fn test_stale_subscription_of_own_url_is_revoked() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, _) = withings_hub(api.clone());
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let url = format!("{EXTERNAL_URL}/api/webhook/{webhook_id}");
    api.set_profiles(vec![
        NotifySubscription {
            appli: 46,
            callbackurl: url.clone(),
            comment: None,
            expires: None,
        },
        NotifySubscription {
            appli: 46,
            callbackurl: "https://elsewhere.test/hook".to_string(),
            comment: None,
            expires: None,
        },
    ]);
    let entry_id = hub.add_entry(entry).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    assert_eq!(api.subscribed().len(), 4);
    assert_eq!(
        api.revoked(),
        vec![(url.clone(), 46), (url.clone(), 50), (url, 51)]
    );
}

#[tokio::test]
async fn test_polling_mode_never_touches_subscriptions() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, integration) = withings_hub(api.clone());
    let entry = withings_entry(1, false);
    let webhook_id = webhook_id_of(&entry);
    let entry_id = hub.add_entry(entry).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    assert_eq!(api.notify_calls(), 0);
    assert_eq!(api.measure_calls(), 1);
    assert!(!hub.has_webhook(&webhook_id));
    let manager = integration.data_manager(&entry_id).unwrap();
    assert_eq!(manager.poll_interval(), DataManager::POLL_INTERVAL);
    assert!(!manager.is_subscribed());

    assert_ok!(hub.unload_entry(&entry_id).await);
    assert_eq!(api.notify_calls(), 0);
}

#[tokio::test]
async fn test_unload_revokes_subscriptions_and_webhook() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, integration) = withings_hub(api.clone());
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let url = format!("{EXTERNAL_URL}/api/webhook/{webhook_id}");
    let entry_id = hub.add_entry(entry).unwrap();
    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    api.set_profiles(vec![NotifySubscription {
        appli: 1,
        callbackurl: url.clone(),
        comment: None,
        expires: None,
    }]);
    assert_ok!(hub.unload_entry(&entry_id).await);

    assert!(api.revoked().contains(&(url, 1)));
    assert!(!hub.has_webhook(&webhook_id));
    assert!(integration.data_manager(&entry_id).is_none());
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::NotLoaded);
}

fn delayed_hub(api: Arc<MockWithingsApi>, delay: Duration) -> Hub {
    let config = HubConfig::builder()
        .external_url(HostUrl::new(EXTERNAL_URL).unwrap())
        .webhook_subscribe_delay(delay)
        .jwt_secret("integration-test-secret")
        .build();
    Hub::builder()
        .config(config)
        .integration(Arc::new(WithingsIntegration::with_api(api)))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_wait_for_the_configured_delay() {
    let api = Arc::new(MockWithingsApi::default());
    let hub = delayed_hub(api.clone(), Duration::from_secs(30));
    let entry_id = hub.add_entry(withings_entry(1, true)).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;
    assert_eq!(api.notify_calls(), 0);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(api.notify_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    hub.block_till_done().await;
    let codes: Vec<i64> = api.subscribed().into_iter().map(|(_, code)| code).collect();
    assert_eq!(codes, vec![1, 4, 16, 44]);
}

#[tokio::test(start_paused = true)]
async fn test_unload_during_subscription_delay_never_subscribes() {
    let api = Arc::new(MockWithingsApi::default());
    let hub = delayed_hub(api.clone(), Duration::from_secs(30));
    let entry_id = hub.add_entry(withings_entry(1, true)).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_ok!(hub.unload_entry(&entry_id).await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    hub.block_till_done().await;
    assert_eq!(api.notify_calls(), 0);
}

// Webhook handling

#[tokio::test]
async fn test_non_post_methods_are_answered_with_ok() {
    let (hub, _) = withings_hub(Arc::new(MockWithingsApi::default()));
    let entry = withings_entry(1, true);
    let uri = format!("/api/webhook/{}", webhook_id_of(&entry));
    let entry_id = hub.add_entry(entry).unwrap();
    assert_ok!(hub.setup_entry(&entry_id).await);

    let (status, body) = send(&hub, "PUT", &uri, None, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Some(json!({"message": "Invalid method", "code": 2})));

    let (status, body) = send(&hub, "HEAD", &uri, None, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, None);
}

#[tokio::test]
async fn test_notification_codes() {
    let (hub, _) = withings_hub(Arc::new(MockWithingsApi::default()));
    let entry = withings_entry(1, true);
    let uri = format!("/api/webhook/{}", webhook_id_of(&entry));
    let entry_id = hub.add_entry(entry).unwrap();
    assert_ok!(hub.setup_entry(&entry_id).await);

    let cases = [
        (Some("application/json"), r#"{"userid": 0, "appli": 1}"#, 0),
        (Some("application/json"), r#"{"userid": null, "appli": 1}"#, 0),
        (Some("application/json"), "{}", 12),
        (Some("application/json"), r#"{"userid": "GG"}"#, 20),
        (Some("application/json"), r#"{"userid": 0}"#, 20),
        (Some("application/json"), r#"{"userid": 0, "appli": 99}"#, 21),
        (Some("application/json"), r#"{"userid": 11, "appli": 1}"#, 0),
        (Some("application/x-www-form-urlencoded"), "userid=11&appli=44", 0),
        (None, "", 12),
    ];
    for (content_type, body, code) in cases {
        let (status, response) = send(&hub, "POST", &uri, content_type, body).await;
        assert_eq!(status, StatusCode::OK, "body {body}");
        assert_eq!(response.unwrap()["code"], code, "body {body}");
    }
    hub.block_till_done().await;
}

#[tokio::test]
async fn test_notification_triggers_refresh() {
    let api = Arc::new(MockWithingsApi::default());
    api.push_measure(Ok(measure_response(100, &[(1, 7050, -2)])));
    api.push_measure(Ok(measure_response(200, &[(4, 172, -2)])));
    let (hub, integration) = withings_hub(api.clone());
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let entry_id = hub.add_entry(entry).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;
    let manager = integration.data_manager(&entry_id).unwrap();
    assert_eq!(manager.measurements().len(), 1);
    assert_eq!(manager.last_update(), Some(100));

    let response = hub
        .handle_webhook(
            &webhook_id,
            WebhookRequest::new(WebhookMethod::Post, b"userid=1&appli=1".to_vec()),
        )
        .await;
    assert_eq!(response.code(), Some(0));
    hub.block_till_done().await;

    let measurements = manager.measurements();
    assert_eq!(measurements.len(), 2);
    assert!((measurements[&1] - 70.5).abs() < 1e-9);
    assert_eq!(manager.last_update(), Some(200));
    assert_eq!(api.measure_calls(), 2);
}

#[tokio::test]
async fn test_notification_just_before_unload_does_not_refresh() {
    let api = Arc::new(MockWithingsApi::default());
    api.push_measure(Ok(measure_response(100, &[(1, 7050, -2)])));
    api.push_measure(Err(ApiError::Unauthorized {
        message: "invalid token".to_string(),
    }));
    let (hub, _) = withings_hub(api.clone());
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let entry_id = hub.add_entry(entry).unwrap();
    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    let response = hub
        .handle_webhook(
            &webhook_id,
            WebhookRequest::new(WebhookMethod::Post, b"userid=1&appli=1".to_vec()),
        )
        .await;
    assert_eq!(response.code(), Some(0));
    assert_ok!(hub.unload_entry(&entry_id).await);
    hub.block_till_done().await;

    assert_eq!(api.measure_calls(), 1);
    assert!(hub.flow_progress().is_empty());
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::NotLoaded);
}

// Authentication failures

#[tokio::test(start_paused = true)]
async fn test_auth_errors_while_polling_start_reauth() {
    let errors = [
        ApiError::Unauthorized {
            message: "invalid token".to_string(),
        },
        ApiError::from_status(100),
    ];
    for error in errors {
        let api = Arc::new(MockWithingsApi::default());
        api.push_measure(Ok(measure_response(100, &[(1, 7050, -2)])));
        api.push_measure(Err(error));
        let (hub, _) = withings_hub(api.clone());
        let entry_id = hub.add_entry(withings_entry(1, false)).unwrap();

        assert_ok!(hub.setup_entry(&entry_id).await);
        assert!(hub.flow_progress().is_empty());

        tokio::time::advance(DataManager::POLL_INTERVAL).await;
        hub.block_till_done().await;

        assert_eq!(api.measure_calls(), 2);
        let flows = hub.flow_progress();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].handler, "withings");
        assert_eq!(flows[0].step_id, "reauth_confirm");
        assert_eq!(flows[0].context.source, Source::Reauth);
        assert_eq!(flows[0].context.entry_id.as_deref(), Some(entry_id.as_str()));
    }
}

#[tokio::test]
async fn test_auth_failure_during_setup_marks_entry() {
    let api = Arc::new(MockWithingsApi::default());
    api.push_measure(Err(ApiError::from_status(401)));
    let (hub, integration) = withings_hub(api);
    let entry = withings_entry(1, true);
    let webhook_id = webhook_id_of(&entry);
    let entry_id = hub.add_entry(entry).unwrap();

    assert_err!(hub.setup_entry(&entry_id).await);
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::SetupError);
    assert!(!hub.has_webhook(&webhook_id));
    assert!(integration.data_manager(&entry_id).is_none());
    assert_eq!(hub.flow_progress().len(), 1);
}

#[tokio::test]
async fn test_connection_failure_during_setup_is_retryable() {
    let api = Arc::new(MockWithingsApi::default());
    api.push_measure(Err(ApiError::Connection {
        message: "timed out".to_string(),
    }));
    let (hub, _) = withings_hub(api);
    let entry_id = hub.add_entry(withings_entry(1, false)).unwrap();

    assert_err!(hub.setup_entry(&entry_id).await);
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::SetupRetry);
    assert!(hub.flow_progress().is_empty());

    assert_ok!(hub.setup_entry(&entry_id).await);
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::Loaded);
}

// Migrations

#[tokio::test]
async fn test_legacy_entries_are_migrated_at_setup() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, _) = withings_hub(api);

    let first = ConfigEntry::new(
        "withings",
        "person0",
        json!({
            "token": {"userid": 1, "access_token": "a"},
            "profile": "person0",
            "use_webhook": true,
        }),
    );
    let second = ConfigEntry::new(
        "withings",
        "person1",
        json!({
            "token": {"userid": "2", "access_token": "b"},
            "profile": "person1",
        }),
    );
    let first_id = hub.add_entry(first).unwrap();
    let second_id = hub.add_entry(second).unwrap();

    assert_ok!(hub.setup_entry(&first_id).await);
    assert_ok!(hub.setup_entry(&second_id).await);
    hub.block_till_done().await;

    let first = hub.entry(&first_id).unwrap();
    assert_eq!(first.version, 2);
    assert_eq!(first.unique_id.as_deref(), Some("1"));
    assert!(!first.data.contains_key("use_webhook"));
    assert_eq!(first.data["webhook_id"].as_str().unwrap().len(), 64);
    assert_eq!(first.options["use_webhook"], true);
    assert_eq!(first.state, EntryState::Loaded);
    assert!(hub.has_webhook(&webhook_id_of(&first)));

    let second = hub.entry(&second_id).unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.unique_id.as_deref(), Some("2"));
    assert_eq!(second.options["use_webhook"], false);
    assert_ne!(webhook_id_of(&first), webhook_id_of(&second));
    assert!(!hub.has_webhook(&webhook_id_of(&second)));
}

#[tokio::test]
async fn test_static_use_webhook_overrides_entry_option() {
    let api = Arc::new(MockWithingsApi::default());
    let (hub, integration) = withings_hub(api.clone());
    assert_ok!(
        hub.async_setup(&json!({
            "withings": {"client_id": "a", "client_secret": "b", "use_webhook": false}
        }))
        .await
    );

    let entry_id = hub.add_entry(withings_entry(1, true)).unwrap();
    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;

    assert_eq!(hub.entry(&entry_id).unwrap().options["use_webhook"], false);
    assert!(!integration.data_manager(&entry_id).unwrap().use_webhook());
    assert_eq!(api.notify_calls(), 0);
}

#[tokio::test]
async fn test_entry_without_userid_fails_migration() {
    let (hub, _) = withings_hub(Arc::new(MockWithingsApi::default()));
    let entry_id = hub
        .add_entry(ConfigEntry::new(
            "withings",
            "broken",
            json!({"token": {"access_token": "a"}, "profile": "broken"}),
        ))
        .unwrap();

    assert_err!(hub.setup_entry(&entry_id).await);
    assert_eq!(hub.entry(&entry_id).unwrap().state, EntryState::MigrationError);
}

#[tokio::test]
async fn test_external_url_is_required_for_subscriptions() {
    let api = Arc::new(MockWithingsApi::default());
    let integration = Arc::new(WithingsIntegration::with_api(api.clone()));
    let config = hub_integrations::HubConfig::builder()
        .webhook_subscribe_delay(std::time::Duration::ZERO)
        .build();
    let hub = Hub::builder().config(config).integration(integration).build();
    let entry_id = hub.add_entry(withings_entry(1, true)).unwrap();

    assert_ok!(hub.setup_entry(&entry_id).await);
    hub.block_till_done().await;
    assert_eq!(api.notify_calls(), 0);
}
