//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hub_integrations::auth::oauth::{OAuthError, OAuthProvider, OAuthToken};
use hub_integrations::entries::ConfigEntry;
use hub_integrations::glances::{GlancesApi, GlancesError, GlancesUserInput};
use hub_integrations::withings::{
    ApiError, Measure, MeasureGetMeasResponse, MeasureGroup, NotifyAppli, NotifySubscription,
    WithingsApi, WithingsIntegration,
};
use hub_integrations::{BoxFuture, HostUrl, Hub, HubConfig, WebhookId};
use serde_json::{json, Value};

pub const EXTERNAL_URL: &str = "http://example.local:8123";

/// Host config with an external URL and no subscription delay.
pub fn hub_config() -> HubConfig {
    HubConfig::builder()
        .external_url(HostUrl::new(EXTERNAL_URL).unwrap())
        .webhook_subscribe_delay(Duration::ZERO)
        .jwt_secret("integration-test-secret")
        .build()
}

// Withings

/// In-memory Withings API recording every call.
#[derive(Default)]
pub struct MockWithingsApi {
    subscribed: Mutex<Vec<(String, i64)>>,
    revoked: Mutex<Vec<(String, i64)>>,
    profiles: Mutex<Vec<NotifySubscription>>,
    measure_results: Mutex<VecDeque<Result<MeasureGetMeasResponse, ApiError>>>,
    list_calls: AtomicUsize,
    measure_calls: AtomicUsize,
}

impl MockWithingsApi {
    /// Queues the result of the next `getmeas` call. Once the queue is empty
    /// calls return an empty response.
    pub fn push_measure(&self, result: Result<MeasureGetMeasResponse, ApiError>) {
        self.measure_results.lock().unwrap().push_back(result);
    }

    /// Sets the subscriptions reported by `notify_list`.
    pub fn set_profiles(&self, profiles: Vec<NotifySubscription>) {
        *self.profiles.lock().unwrap() = profiles;
    }

    pub fn subscribed(&self) -> Vec<(String, i64)> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> Vec<(String, i64)> {
        self.revoked.lock().unwrap().clone()
    }

    /// Number of calls to any subscription endpoint.
    pub fn notify_calls(&self) -> usize {
        self.subscribed.lock().unwrap().len()
            + self.revoked.lock().unwrap().len()
            + self.list_calls.load(Ordering::SeqCst)
    }

    pub fn measure_calls(&self) -> usize {
        self.measure_calls.load(Ordering::SeqCst)
    }
}

impl WithingsApi for MockWithingsApi {
    fn notify_subscribe<'a>(
        &'a self,
        _access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        self.subscribed
            .lock()
            .unwrap()
            .push((callback_url.to_string(), appli.code()));
        Box::pin(async { Ok(()) })
    }

    fn notify_revoke<'a>(
        &'a self,
        _access_token: &'a str,
        callback_url: &'a str,
        appli: NotifyAppli,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        self.revoked
            .lock()
            .unwrap()
            .push((callback_url.to_string(), appli.code()));
        Box::pin(async { Ok(()) })
    }

    fn notify_list<'a>(
        &'a self,
        _access_token: &'a str,
    ) -> BoxFuture<'a, Result<Vec<NotifySubscription>, ApiError>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let profiles = self.profiles.lock().unwrap().clone();
        Box::pin(async move { Ok(profiles) })
    }

    fn measure_get_meas<'a>(
        &'a self,
        _access_token: &'a str,
        _last_update: Option<i64>,
    ) -> BoxFuture<'a, Result<MeasureGetMeasResponse, ApiError>> {
        self.measure_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .measure_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(MeasureGetMeasResponse::default()));
        Box::pin(async move { next })
    }
}

/// A `getmeas` body with one real measure group of `(type, value, unit)`.
pub fn measure_response(updatetime: i64, measures: &[(i32, i64, i32)]) -> MeasureGetMeasResponse {
    MeasureGetMeasResponse {
        updatetime,
        timezone: None,
        measuregrps: vec![MeasureGroup {
            grpid: updatetime,
            date: updatetime,
            category: 1,
            measures: measures
                .iter()
                .map(|&(measure_type, value, unit)| Measure {
                    value,
                    measure_type,
                    unit,
                })
                .collect(),
        }],
    }
}

/// OAuth provider issuing tokens for a fixed account.
pub struct FakeOAuth {
    pub userid: i64,
    pub exchanges: AtomicUsize,
}

impl FakeOAuth {
    pub fn new(userid: i64) -> Self {
        Self {
            userid,
            exchanges: AtomicUsize::new(0),
        }
    }
}

impl OAuthProvider for FakeOAuth {
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!("https://account.test/oauth2_user/authorize2?redirect_uri={redirect_uri}&state={state}")
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if code == "rejected" {
                return Err(OAuthError::TokenExchangeFailed {
                    status: 503,
                    message: "invalid code".to_string(),
                });
            }
            Ok(OAuthToken::new(self.userid, "mock-access-token"))
        })
    }

    fn refresh_token<'a>(
        &'a self,
        _token: &'a OAuthToken,
    ) -> BoxFuture<'a, Result<OAuthToken, OAuthError>> {
        Box::pin(async { Err(OAuthError::MissingRefreshToken) })
    }
}

/// Extracts the `state` query parameter from an authorize URL.
pub fn state_from_url(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .to_string()
}

/// A current Withings entry for `userid`.
pub fn withings_entry(userid: i64, use_webhook: bool) -> ConfigEntry {
    ConfigEntry::new(
        "withings",
        format!("person{userid}"),
        json!({
            "token": {"userid": userid, "access_token": "old-token"},
            "profile": format!("person{userid}"),
            "webhook_id": WebhookId::generate(),
        }),
    )
    .with_unique_id(userid.to_string())
    .with_options(json!({"use_webhook": use_webhook}))
    .with_version(2)
}

/// A hub with a Withings integration backed by `api`.
pub fn withings_hub(api: Arc<MockWithingsApi>) -> (Hub, Arc<WithingsIntegration>) {
    let integration = Arc::new(WithingsIntegration::with_api(api));
    let hub = Hub::builder()
        .config(hub_config())
        .integration(integration.clone())
        .build();
    (hub, integration)
}

/// Webhook id stored in an entry.
pub fn webhook_id_of(entry: &ConfigEntry) -> String {
    entry.data["webhook_id"].as_str().unwrap().to_string()
}

// Glances

/// Glances API answering from a script, then with [`glances_payload`].
#[derive(Default)]
pub struct MockGlancesApi {
    results: Mutex<VecDeque<Result<Value, GlancesError>>>,
    targets: Mutex<Vec<String>>,
}

impl MockGlancesApi {
    pub fn push(&self, result: Result<Value, GlancesError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Base URLs of every request, in order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl GlancesApi for MockGlancesApi {
    fn get_ha_sensor_data<'a>(
        &'a self,
        target: &'a GlancesUserInput,
    ) -> BoxFuture<'a, Result<Value, GlancesError>> {
        self.targets.lock().unwrap().push(target.base_url());
        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(glances_payload()));
        Box::pin(async move { next })
    }
}

pub fn glances_payload() -> Value {
    json!({
        "cpu": {"cpu_use_percent": 7.2},
        "mem": {"memory_use_percent": 27.6, "memory_free": 2_745_708_544_i64},
        "uptime": "3 days, 10:25:20",
    })
}
