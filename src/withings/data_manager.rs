//! Per-entry Withings state: token, measurements, subscriptions and timers.
//!
//! Every refresh, whether started by setup, the poll timer or a webhook push,
//! goes through [`DataManager::refresh`], which holds an async lock for the
//! whole fetch-and-merge so concurrent triggers never interleave.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::api::{ApiError, MeasureGetMeasResponse, WithingsApi};
use super::entry::CONF_TOKEN;
use super::{NotifyAppli, EXCLUDE_APPLIS, SUBSCRIBE_APPLIS};
use crate::auth::oauth::{OAuthError, OAuthProvider, OAuthToken};
use crate::entries::EntryUpdate;
use crate::hub::{TaskTracker, WeakHub};

/// Measurement group category of real measurements (2 is user objectives).
/// Groups without a category are not merged.
const CATEGORY_REAL: i64 = 1;

/// Coordinates refreshes and webhook subscriptions of one Withings entry.
pub struct DataManager {
    hub: WeakHub,
    entry_id: String,
    api: Arc<dyn WithingsApi>,
    oauth: Option<Arc<dyn OAuthProvider>>,
    token: Mutex<OAuthToken>,
    use_webhook: bool,
    webhook_url: Option<String>,
    refresh_lock: tokio::sync::Mutex<()>,
    measurements: Mutex<HashMap<i32, f64>>,
    last_update: Mutex<Option<i64>>,
    subscribed: AtomicBool,
    closed: AtomicBool,
    timers: Mutex<Vec<AbortHandle>>,
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("entry_id", &self.entry_id)
            .field("use_webhook", &self.use_webhook)
            .field("webhook_url", &self.webhook_url)
            .field("subscribed", &self.subscribed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DataManager {
    /// Poll interval when relying on polling alone.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

    /// Fallback poll interval when push notifications are enabled.
    pub const WEBHOOK_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

    /// Creates the manager of `entry_id`.
    ///
    /// `webhook_url` is the public URL of the entry's webhook; it is only
    /// used when `use_webhook` is set.
    #[must_use]
    pub fn new(
        hub: WeakHub,
        entry_id: impl Into<String>,
        api: Arc<dyn WithingsApi>,
        oauth: Option<Arc<dyn OAuthProvider>>,
        token: OAuthToken,
        use_webhook: bool,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            hub,
            entry_id: entry_id.into(),
            api,
            oauth,
            token: Mutex::new(token),
            use_webhook,
            webhook_url,
            refresh_lock: tokio::sync::Mutex::new(()),
            measurements: Mutex::new(HashMap::new()),
            last_update: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the id of the managed entry.
    #[must_use]
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Returns `true` in webhook mode.
    #[must_use]
    pub const fn use_webhook(&self) -> bool {
        self.use_webhook
    }

    /// Returns the public webhook URL, if known.
    #[must_use]
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url.as_deref()
    }

    /// Returns the poll interval for the current mode.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        if self.use_webhook {
            Self::WEBHOOK_POLL_INTERVAL
        } else {
            Self::POLL_INTERVAL
        }
    }

    /// Returns the latest value per measure type.
    #[must_use]
    pub fn measurements(&self) -> HashMap<i32, f64> {
        lock(&self.measurements).clone()
    }

    /// Returns the server timestamp of the last successful refresh.
    #[must_use]
    pub fn last_update(&self) -> Option<i64> {
        *lock(&self.last_update)
    }

    /// Returns `true` once remote subscriptions have been established.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fetches new measurements and merges them.
    ///
    /// An authorization failure starts a reauth flow for the entry. After
    /// shutdown this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the failed call after logging it.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let result = {
            let _guard = self.refresh_lock.lock().await;
            if self.is_closed() {
                tracing::debug!("Skipping refresh of unloaded Withings entry {}", self.entry_id);
                return Ok(());
            }
            self.fetch_measurements().await
        };

        if let Err(err) = &result {
            if err.is_auth_error() {
                tracing::warn!(
                    "Withings entry {} is no longer authorized: {}",
                    self.entry_id,
                    err
                );
                self.start_reauth().await;
            } else {
                tracing::warn!("Withings refresh for {} failed: {}", self.entry_id, err);
            }
        }
        result
    }

    async fn fetch_measurements(&self) -> Result<(), ApiError> {
        let access_token = self.access_token().await?;
        let since = self.last_update();
        let response = self.api.measure_get_meas(&access_token, since).await?;
        self.merge(response);
        Ok(())
    }

    fn merge(&self, mut response: MeasureGetMeasResponse) {
        response.measuregrps.sort_by_key(|group| group.date);

        let mut measurements = lock(&self.measurements);
        for group in response
            .measuregrps
            .iter()
            .filter(|g| g.category == CATEGORY_REAL)
        {
            for measure in &group.measures {
                measurements.insert(measure.measure_type, measure.scaled());
            }
        }
        drop(measurements);

        if response.updatetime > 0 {
            *lock(&self.last_update) = Some(response.updatetime);
        }
        tracing::debug!(
            "Withings entry {} merged {} measure groups",
            self.entry_id,
            response.measuregrps.len()
        );
    }

    /// Returns a valid access token, refreshing and persisting it if expired.
    async fn access_token(&self) -> Result<String, ApiError> {
        let current = lock(&self.token).clone();
        if !current.is_expired() {
            return Ok(current.access_token);
        }

        let Some(oauth) = &self.oauth else {
            return Err(ApiError::Unauthorized {
                message: "Token expired and no client credentials are configured".to_string(),
            });
        };

        let fresh = oauth.refresh_token(&current).await.map_err(|err| match err {
            OAuthError::TokenRefreshFailed { status: 0, message } => {
                ApiError::Connection { message }
            }
            other => ApiError::Unauthorized {
                message: other.to_string(),
            },
        })?;

        *lock(&self.token) = fresh.clone();
        self.persist_token(&fresh);
        Ok(fresh.access_token)
    }

    fn persist_token(&self, token: &OAuthToken) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let Some(entry) = hub.entry(&self.entry_id) else {
            return;
        };

        let mut data = entry.data;
        data.insert(CONF_TOKEN.to_string(), token.to_value());
        let update = EntryUpdate {
            data: Some(data),
            ..EntryUpdate::default()
        };
        if let Err(err) = hub.update_entry(&self.entry_id, update) {
            tracing::warn!("Could not persist refreshed Withings token: {}", err);
        }
    }

    async fn start_reauth(&self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        match hub.start_reauth(&self.entry_id).await {
            Ok(result) => tracing::info!(
                "Reauth for Withings entry {}: flow {}",
                self.entry_id,
                result.flow_id()
            ),
            Err(err) => tracing::warn!(
                "Could not start reauth for Withings entry {}: {}",
                self.entry_id,
                err
            ),
        }
    }

    /// Establishes remote push subscriptions for the webhook URL.
    ///
    /// Subscribes every push category, then revokes the excluded categories
    /// and any stale subscription of this URL. Failures are logged. Does
    /// nothing once the manager is shut down.
    pub async fn subscribe_webhooks(&self) {
        let _guard = self.refresh_lock.lock().await;
        if self.is_closed() {
            return;
        }
        let Some(url) = self.webhook_url.as_deref() else {
            tracing::warn!(
                "No external URL configured; Withings entry {} will only poll",
                self.entry_id
            );
            return;
        };
        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("Cannot subscribe Withings webhooks: {}", err);
                return;
            }
        };

        let current = match self.api.notify_list(&access_token).await {
            Ok(profiles) => profiles,
            Err(err) => {
                tracing::warn!("Could not list Withings subscriptions: {}", err);
                Vec::new()
            }
        };

        for appli in SUBSCRIBE_APPLIS {
            tracing::debug!("Subscribing {} for {:?}", url, appli);
            if let Err(err) = self.api.notify_subscribe(&access_token, url, appli).await {
                tracing::warn!("Withings subscribe for {:?} failed: {}", appli, err);
            }
        }

        let stale = current
            .iter()
            .filter(|s| s.callbackurl == url)
            .filter_map(|s| NotifyAppli::try_from(s.appli).ok())
            .filter(|appli| !SUBSCRIBE_APPLIS.contains(appli));
        let revoke: BTreeSet<i64> = EXCLUDE_APPLIS
            .into_iter()
            .chain(stale)
            .map(NotifyAppli::code)
            .collect();

        for code in revoke {
            let Ok(appli) = NotifyAppli::try_from(code) else {
                continue;
            };
            if let Err(err) = self.api.notify_revoke(&access_token, url, appli).await {
                tracing::debug!("Withings revoke for {:?} failed: {}", appli, err);
            }
        }

        self.subscribed.store(true, Ordering::SeqCst);
        tracing::info!("Withings webhooks subscribed for entry {}", self.entry_id);
    }

    /// Revokes every remote subscription of the webhook URL.
    pub async fn unsubscribe_webhooks(&self) {
        if !self.subscribed.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };
        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("Cannot unsubscribe Withings webhooks: {}", err);
                return;
            }
        };

        let profiles = match self.api.notify_list(&access_token).await {
            Ok(profiles) => profiles,
            Err(err) => {
                tracing::warn!("Could not list Withings subscriptions: {}", err);
                return;
            }
        };

        for profile in profiles.iter().filter(|p| p.callbackurl == url) {
            let Ok(appli) = NotifyAppli::try_from(profile.appli) else {
                continue;
            };
            if let Err(err) = self.api.notify_revoke(&access_token, url, appli).await {
                tracing::debug!("Withings revoke for {:?} failed: {}", appli, err);
            }
        }
    }

    /// Starts the poll timer and, in webhook mode, the delayed subscription.
    ///
    /// Timer ticks and the subscription itself run as tracked tasks, the
    /// waits before them do not. Both timers only hold a weak reference, so
    /// they end on their own once the manager is dropped;
    /// [`stop`](Self::stop) ends them immediately.
    pub fn start(self: &Arc<Self>, tasks: &TaskTracker, subscribe_delay: Duration) {
        let period = self.poll_interval();
        let manager = Arc::downgrade(self);
        let poll_tasks = tasks.clone();
        let poll = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                poll_tasks.spawn(async move {
                    if manager.refresh().await.is_err() {
                        tracing::trace!("Withings poll of {} failed", manager.entry_id());
                    }
                });
            }
        });

        let mut timers = lock(&self.timers);
        timers.push(poll.abort_handle());

        if !self.use_webhook {
            return;
        }
        if subscribe_delay.is_zero() {
            let manager = Arc::clone(self);
            tasks.spawn(async move { manager.subscribe_webhooks().await });
            return;
        }

        let manager = Arc::downgrade(self);
        let subscribe_tasks = tasks.clone();
        let delayed = tokio::spawn(async move {
            tokio::time::sleep(subscribe_delay).await;
            if let Some(manager) = manager.upgrade() {
                subscribe_tasks.spawn(async move { manager.subscribe_webhooks().await });
            }
        });
        timers.push(delayed.abort_handle());
    }

    /// Aborts the poll timer and a pending subscription.
    pub fn stop(&self) {
        for timer in lock(&self.timers).drain(..) {
            timer.abort();
        }
    }

    /// Stops the timers, waits for an in-flight refresh and revokes the
    /// remote subscriptions.
    ///
    /// Refreshes queued by webhook pushes that have not started yet become
    /// no-ops.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop();
        drop(self.refresh_lock.lock().await);
        if self.use_webhook {
            self.unsubscribe_webhooks().await;
        }
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::withings::api::{Measure, MeasureGroup, NotifySubscription};
    use crate::BoxFuture;

    #[derive(Default)]
    struct RecordingApi {
        subscribed: Mutex<Vec<i64>>,
        revoked: Mutex<Vec<i64>>,
        listed: Mutex<Vec<NotifySubscription>>,
        meas_calls: Mutex<Vec<Option<i64>>>,
    }

    impl WithingsApi for RecordingApi {
        fn notify_subscribe<'a>(
            &'a self,
            _access_token: &'a str,
            _callback_url: &'a str,
            appli: NotifyAppli,
        ) -> BoxFuture<'a, Result<(), ApiError>> {
            self.subscribed.lock().unwrap().push(appli.code());
            Box::pin(async { Ok(()) })
        }

        fn notify_revoke<'a>(
            &'a self,
            _access_token: &'a str,
            _callback_url: &'a str,
            appli: NotifyAppli,
        ) -> BoxFuture<'a, Result<(), ApiError>> {
            self.revoked.lock().unwrap().push(appli.code());
            Box::pin(async { Ok(()) })
        }

        fn notify_list<'a>(
            &'a self,
            _access_token: &'a str,
        ) -> BoxFuture<'a, Result<Vec<NotifySubscription>, ApiError>> {
            let listed = self.listed.lock().unwrap().clone();
            Box::pin(async move { Ok(listed) })
        }

        fn measure_get_meas<'a>(
            &'a self,
            _access_token: &'a str,
            last_update: Option<i64>,
        ) -> BoxFuture<'a, Result<MeasureGetMeasResponse, ApiError>> {
            self.meas_calls.lock().unwrap().push(last_update);
            Box::pin(async {
                Ok(MeasureGetMeasResponse {
                    updatetime: 1_700_000_100,
                    timezone: None,
                    measuregrps: vec![
                        MeasureGroup {
                            grpid: 2,
                            date: 1_700_000_050,
                            category: 1,
                            measures: vec![Measure {
                                value: 7100,
                                measure_type: 1,
                                unit: -2,
                            }],
                        },
                        MeasureGroup {
                            grpid: 1,
                            date: 1_700_000_000,
                            category: 1,
                            measures: vec![Measure {
                                value: 7000,
                                measure_type: 1,
                                unit: -2,
                            }],
                        },
                        MeasureGroup {
                            grpid: 3,
                            date: 1_700_000_090,
                            category: 2,
                            measures: vec![Measure {
                                value: 6500,
                                measure_type: 1,
                                unit: -2,
                            }],
                        },
                    ],
                })
            })
        }
    }

    const URL: &str = "http://example.local:8123/api/webhook/abc";

    fn manager(api: Arc<RecordingApi>, use_webhook: bool) -> Arc<DataManager> {
        Arc::new(DataManager::new(
            WeakHub::default(),
            "entry-1",
            api,
            None,
            OAuthToken::new(123, "token"),
            use_webhook,
            Some(URL.to_string()),
        ))
    }

    #[tokio::test]
    async fn test_refresh_keeps_newest_real_measurement() {
        let api = Arc::new(RecordingApi::default());
        let manager = manager(api.clone(), false);

        manager.refresh().await.unwrap();
        manager.refresh().await.unwrap();

        let weight = manager.measurements()[&1];
        assert!((weight - 71.0).abs() < 1e-9);
        assert_eq!(manager.last_update(), Some(1_700_000_100));
        assert_eq!(
            *api.meas_calls.lock().unwrap(),
            vec![None, Some(1_700_000_100)]
        );
    }

    #[tokio::test]
    async fn test_subscribe_revokes_excluded_and_stale_categories() {
        let api = Arc::new(RecordingApi::default());
        api.listed.lock().unwrap().extend([
            NotifySubscription {
                appli: 52,
                callbackurl: URL.to_string(),
                comment: None,
                expires: None,
            },
            NotifySubscription {
                appli: 50,
                callbackurl: URL.to_string(),
                comment: None,
                expires: None,
            },
            NotifySubscription {
                appli: 46,
                callbackurl: "http://other/hook".to_string(),
                comment: None,
                expires: None,
            },
        ]);
        let manager = manager(api.clone(), true);

        manager.subscribe_webhooks().await;

        assert_eq!(*api.subscribed.lock().unwrap(), vec![1, 4, 16, 44]);
        assert_eq!(*api.revoked.lock().unwrap(), vec![50, 51, 52]);
        assert!(manager.is_subscribed());
    }

    #[tokio::test]
    async fn test_unsubscribe_only_after_subscribe() {
        let api = Arc::new(RecordingApi::default());
        api.listed.lock().unwrap().push(NotifySubscription {
            appli: 1,
            callbackurl: URL.to_string(),
            comment: None,
            expires: None,
        });
        let manager = manager(api.clone(), true);

        manager.unsubscribe_webhooks().await;
        assert!(api.revoked.lock().unwrap().is_empty());

        manager.subscribe_webhooks().await;
        api.revoked.lock().unwrap().clear();
        manager.shutdown().await;
        assert_eq!(*api.revoked.lock().unwrap(), vec![1]);
        assert!(!manager.is_subscribed());
    }

    #[tokio::test]
    async fn test_expired_token_without_oauth_is_unauthorized() {
        let api = Arc::new(RecordingApi::default());
        let mut token = OAuthToken::new(1, "old");
        token.expires_at = Some(0);
        let manager = DataManager::new(
            WeakHub::default(),
            "entry-1",
            api.clone(),
            None,
            token,
            false,
            None,
        );

        let result = manager.refresh().await;
        assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
        assert!(api.meas_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timer_refreshes_every_interval() {
        let api = Arc::new(RecordingApi::default());
        let manager = manager(api.clone(), false);
        let tasks = TaskTracker::new();

        manager.start(&tasks, Duration::ZERO);
        tokio::task::yield_now().await;

        tokio::time::advance(DataManager::POLL_INTERVAL).await;
        tasks.block_till_done().await;
        assert_eq!(api.meas_calls.lock().unwrap().len(), 1);

        manager.stop();
        tokio::time::advance(DataManager::POLL_INTERVAL).await;
        tasks.block_till_done().await;
        assert_eq!(api.meas_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_is_a_no_op() {
        let api = Arc::new(RecordingApi::default());
        let manager = manager(api.clone(), false);

        manager.shutdown().await;
        assert!(manager.is_closed());
        assert!(manager.refresh().await.is_ok());
        manager.subscribe_webhooks().await;

        assert!(api.meas_calls.lock().unwrap().is_empty());
        assert!(api.subscribed.lock().unwrap().is_empty());
        assert!(manager.measurements().is_empty());
    }

    #[test]
    fn test_groups_without_category_are_ignored() {
        let manager = manager(Arc::new(RecordingApi::default()), false);
        manager.merge(MeasureGetMeasResponse {
            updatetime: 10,
            timezone: None,
            measuregrps: vec![MeasureGroup {
                grpid: 1,
                date: 10,
                category: 0,
                measures: vec![Measure {
                    value: 7000,
                    measure_type: 1,
                    unit: -2,
                }],
            }],
        });

        assert!(manager.measurements().is_empty());
        assert_eq!(manager.last_update(), Some(10));
    }

    #[test]
    fn test_poll_interval_depends_on_mode() {
        let api = Arc::new(RecordingApi::default());
        assert_eq!(manager(api.clone(), false).poll_interval(), DataManager::POLL_INTERVAL);
        assert_eq!(manager(api, true).poll_interval(), DataManager::WEBHOOK_POLL_INTERVAL);
    }
}
