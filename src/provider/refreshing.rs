//! Background refresh of the authoritative endpoint list.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use snafu::{ResultExt, ensure};
use tokio::{
    sync::{Notify, watch},
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::RefreshConfig,
    endpoint::{Endpoint, EndpointSet},
    error::{InvalidConfigurationSnafu, Result, SourceSnafu},
    provider::{HostProvider, ResolvedEndpoint, StaticHostProvider},
    resolve::{DnsResolver, HostResolver},
    source::EndpointSource,
};

/// A [`HostProvider`] that keeps its endpoint set in sync with an
/// [`EndpointSource`].
///
/// Wraps a [`StaticHostProvider`] and re-fetches the authoritative list on a
/// configured interval, applying each fetch through
/// [`update_server_list`](HostProvider::update_server_list) with the
/// internally tracked current connection. When an applied update advises
/// migration, a hint is published on a watch channel
/// ([`migrations`](Self::migrations)); acting on it remains the owning
/// client's decision.
///
/// The service is created stopped. [`start`](Self::start) spawns the
/// background task, [`stop`](Self::stop) shuts it down gracefully, and
/// [`trigger_refresh`](Self::trigger_refresh) nudges an immediate fetch
/// without waiting for the next tick. All clones share the same state and
/// background task.
#[derive(Debug)]
pub struct RefreshingHostProvider<R: HostResolver = DnsResolver> {
    /// The provider all four contract operations delegate to.
    inner: Arc<StaticHostProvider<R>>,

    /// Where the authoritative list comes from.
    source: EndpointSource,

    /// Refresh scheduling.
    config: RefreshConfig,

    /// Whether the background task is running.
    running: Arc<AtomicBool>,

    /// Nudges the background task into an immediate refresh.
    refresh_notify: Arc<Notify>,

    /// Cancellation token of the currently running task, if any. Each
    /// spawned task gets its own token so stopping one generation can never
    /// affect the next.
    task_cancel: Arc<Mutex<Option<CancellationToken>>>,

    /// Count of migration hints published so far.
    migrations: Arc<watch::Sender<u64>>,
}

// Manual impl: the resolver lives behind the shared inner provider, so
// cloning never requires `R: Clone`.
impl<R: HostResolver> Clone for RefreshingHostProvider<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            source: self.source.clone(),
            config: self.config.clone(),
            running: Arc::clone(&self.running),
            refresh_notify: Arc::clone(&self.refresh_notify),
            task_cancel: Arc::clone(&self.task_cancel),
            migrations: Arc::clone(&self.migrations),
        }
    }
}

impl RefreshingHostProvider {
    /// Creates a refreshing provider over `initial` with live DNS resolution.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if refresh is enabled with a zero
    /// interval.
    pub fn new(
        initial: EndpointSet,
        source: EndpointSource,
        config: RefreshConfig,
    ) -> Result<Self> {
        Self::wrap(StaticHostProvider::new(initial), source, config)
    }
}

impl<R: HostResolver> RefreshingHostProvider<R> {
    /// Wraps an already-configured [`StaticHostProvider`].
    ///
    /// Use this form to set a custom resolver, resolution policy, or
    /// cancellation token on the inner provider first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if refresh is enabled with a zero
    /// interval; `tokio::time::interval` has no meaningful zero period.
    pub fn wrap(
        inner: StaticHostProvider<R>,
        source: EndpointSource,
        config: RefreshConfig,
    ) -> Result<Self> {
        ensure!(
            !config.is_enabled() || !config.interval().is_zero(),
            InvalidConfigurationSnafu {
                message: "refresh interval must be non-zero when refresh is enabled"
            }
        );
        let (migrations, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(inner),
            source,
            config,
            running: Arc::new(AtomicBool::new(false)),
            refresh_notify: Arc::new(Notify::new()),
            task_cancel: Arc::new(Mutex::new(None)),
            migrations: Arc::new(migrations),
        })
    }

    /// Returns the refresh configuration.
    #[must_use]
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Returns whether the background refresh task is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Returns the endpoint recorded by the last
    /// [`on_connected`](HostProvider::on_connected) call, if any.
    #[must_use]
    pub fn current(&self) -> Option<Endpoint> {
        self.inner.current()
    }

    /// Returns a receiver for migration hints.
    ///
    /// The value is a counter that increments every time an applied refresh
    /// advises migration. Receivers only ever observe the latest value;
    /// missing an intermediate hint is harmless since the advice is the same
    /// either way: drop the connection and call
    /// [`next`](HostProvider::next).
    #[must_use]
    pub fn migrations(&self) -> watch::Receiver<u64> {
        self.migrations.subscribe()
    }

    /// Fetches the source once and applies the result.
    ///
    /// Returns whether the applied update advised migration. A fetch that
    /// yields zero endpoints is rejected and the previous set stays in
    /// effect.
    ///
    /// # Errors
    ///
    /// Returns `Source` if the fetch itself fails, or `InvalidConfiguration`
    /// if it yields an empty list. Either way the tracked set is untouched.
    pub async fn refresh(&self) -> Result<bool> {
        let fetched = self.source.fetch(self.inner.resolver()).await.context(SourceSnafu)?;
        let set = EndpointSet::new(fetched)?;

        let current = self.inner.current();
        let migrate = self.inner.update_server_list(set, current.as_ref());
        if migrate {
            self.migrations.send_modify(|hints| *hints += 1);
        }
        Ok(migrate)
    }

    /// Starts the background refresh task.
    ///
    /// Idempotent: a second call while the task is running has no effect, as
    /// does any call when refresh is disabled in the configuration. The first
    /// fetch happens one full interval after start.
    pub fn start(&self) {
        if !self.config.is_enabled() {
            debug!("endpoint refresh disabled, not starting background task");
            return;
        }

        // The lock serializes start/stop, so a stop racing this call either
        // sees the flag and cancels the new token, or finishes first and this
        // call spawns cleanly.
        let mut slot = self.task_cancel.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("endpoint refresh already running");
            return;
        }
        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());
        drop(slot);

        let service = self.clone();
        let refresh_interval = self.config.interval();

        tokio::spawn(async move {
            debug!(
                source = %service.source.describe(),
                interval = ?refresh_interval,
                "starting endpoint refresh task"
            );

            let mut ticker = interval(refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; the initial set is
            // already in place, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("stopping endpoint refresh task");
                        return;
                    }
                    _ = ticker.tick() => {
                        service.run_refresh().await;
                    }
                    () = service.refresh_notify.notified() => {
                        debug!("immediate endpoint refresh triggered");
                        service.run_refresh().await;
                    }
                }
            }
        });
    }

    /// Stops the background refresh task.
    ///
    /// Takes effect immediately: [`is_running`](Self::is_running) reports
    /// false on return and a subsequent [`start`](Self::start) spawns a
    /// fresh task even while the old one is still unwinding. The old task
    /// finishes any in-flight fetch before exiting.
    pub fn stop(&self) {
        let mut slot = self.task_cancel.lock();
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(cancel) = slot.take() {
                cancel.cancel();
            }
        }
    }

    /// Triggers an immediate refresh on the running background task.
    ///
    /// No effect when the task is not running.
    pub fn trigger_refresh(&self) {
        if self.running.load(Ordering::Relaxed) {
            self.refresh_notify.notify_one();
        }
    }

    async fn run_refresh(&self) {
        match self.refresh().await {
            Ok(migrate) => {
                debug!(endpoints = self.inner.size(), migrate, "applied endpoint refresh");
            },
            Err(err) => {
                warn!(source = %self.source.describe(), error = %err, "endpoint refresh failed");
            },
        }
    }
}

impl<R: HostResolver> HostProvider for RefreshingHostProvider<R> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    async fn next(&self, spin_delay: Duration) -> Result<ResolvedEndpoint> {
        self.inner.next(spin_delay).await
    }

    fn on_connected(&self) {
        self.inner.on_connected();
    }

    fn on_disconnected(&self) {
        self.inner.on_disconnected();
    }

    fn update_server_list(&self, endpoints: EndpointSet, current: Option<&Endpoint>) -> bool {
        self.inner.update_server_list(endpoints, current)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        endpoint::DEFAULT_PORT, error::HostError, source::FileSourceConfig,
        testing::ScriptedResolver,
    };

    fn ip_set(hosts: &[&str]) -> EndpointSet {
        EndpointSet::new(hosts.iter().map(|h| Endpoint::new(*h, 2181))).unwrap()
    }

    fn provider_with_source(
        initial: &[&str],
        source: EndpointSource,
        config: RefreshConfig,
    ) -> RefreshingHostProvider<ScriptedResolver> {
        RefreshingHostProvider::wrap(
            StaticHostProvider::with_resolver(ip_set(initial), ScriptedResolver::new()),
            source,
            config,
        )
        .unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[test]
    fn test_created_stopped() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider = provider_with_source(&["10.0.0.1"], source, RefreshConfig::enabled());

        assert!(!provider.is_running());
        assert_eq!(provider.size(), 1);
        assert_eq!(*provider.migrations().borrow(), 0);
    }

    #[test]
    fn test_zero_interval_rejected_when_enabled() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let err = RefreshingHostProvider::wrap(
            StaticHostProvider::with_resolver(ip_set(&["10.0.0.1"]), ScriptedResolver::new()),
            source,
            RefreshConfig::enabled().with_interval(Duration::ZERO),
        )
        .unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("refresh interval"));
    }

    #[test]
    fn test_zero_interval_accepted_when_disabled() {
        // The interval is never used when refresh is disabled.
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider = provider_with_source(
            &["10.0.0.1"],
            source,
            RefreshConfig::disabled().with_interval(Duration::ZERO),
        );
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_start_noop_when_disabled() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider = provider_with_source(&["10.0.0.1"], source, RefreshConfig::disabled());

        provider.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_manual_refresh_applies_fetched_list() {
        let source =
            EndpointSource::from_static(ip_set(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]).into_vec());
        let provider = provider_with_source(&["10.0.0.1"], source, RefreshConfig::disabled());

        let migrate = provider.refresh().await.unwrap();

        assert!(!migrate, "not connected, so no migration advice");
        assert_eq!(provider.size(), 3);
    }

    #[tokio::test]
    async fn test_refresh_publishes_migration_hint_when_current_removed() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.2", "10.0.0.3"]).into_vec());
        let provider = provider_with_source(&["10.0.0.1"], source, RefreshConfig::disabled());
        let hints = provider.migrations();

        // The only endpoint is 10.0.0.1; connect to it, then refresh to a
        // list that no longer contains it.
        provider.next(Duration::ZERO).await.unwrap();
        provider.on_connected();

        let migrate = provider.refresh().await.unwrap();

        assert!(migrate);
        assert!(hints.has_changed().unwrap());
        assert_eq!(*hints.borrow(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_set() {
        let source = EndpointSource::file(
            FileSourceConfig::builder().path("/nonexistent/servers.json").build(),
        );
        let provider =
            provider_with_source(&["10.0.0.1", "10.0.0.2"], source, RefreshConfig::disabled());

        let err = provider.refresh().await.unwrap_err();

        assert!(matches!(err, HostError::Source { .. }));
        assert_eq!(provider.size(), 2);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, r#"{"servers": []}"#).await.unwrap();

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(manifest_path).build());
        let provider =
            provider_with_source(&["10.0.0.1", "10.0.0.2"], source, RefreshConfig::disabled());

        let err = provider.refresh().await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(provider.size(), 2, "previous set stays in effect");
    }

    #[tokio::test]
    async fn test_background_refresh_applies_manifest_change() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, r#"{"servers": ["10.0.0.1:2181"]}"#).await.unwrap();

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(&manifest_path).build());
        let provider = provider_with_source(
            &["10.0.0.1"],
            source,
            RefreshConfig::enabled().with_interval(Duration::from_millis(20)),
        );

        provider.start();
        wait_until(|| provider.is_running()).await;

        tokio::fs::write(
            &manifest_path,
            r#"{"servers": ["10.0.0.1:2181", "10.0.0.2:2181", "10.0.0.3:2181"]}"#,
        )
        .await
        .unwrap();

        wait_until(|| provider.size() == 3).await;

        provider.stop();
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_trigger_refresh_without_waiting_for_interval() {
        let source =
            EndpointSource::from_static(ip_set(&["10.0.0.1", "10.0.0.2"]).into_vec());
        let provider = provider_with_source(
            &["10.0.0.1"],
            source,
            RefreshConfig::enabled().with_interval(Duration::from_secs(3600)),
        );

        provider.start();
        wait_until(|| provider.is_running()).await;
        assert_eq!(provider.size(), 1, "first interval tick has not fired");

        provider.trigger_refresh();
        wait_until(|| provider.size() == 2).await;

        provider.stop();
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_allows_restart() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider = provider_with_source(
            &["10.0.0.1"],
            source,
            RefreshConfig::enabled().with_interval(Duration::from_secs(3600)),
        );

        provider.start();
        wait_until(|| provider.is_running()).await;
        provider.start();
        provider.start();
        assert!(provider.is_running());

        provider.stop();
        assert!(!provider.is_running(), "stop takes effect immediately");

        provider.start();
        wait_until(|| provider.is_running()).await;
        provider.stop();
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_restart_immediately_after_stop_spawns_live_task() {
        // No grace period between stop and start: the restarted task must be
        // the one serving triggers, not a leftover of the stopped one.
        let source =
            EndpointSource::from_static(ip_set(&["10.0.0.1", "10.0.0.2"]).into_vec());
        let provider = provider_with_source(
            &["10.0.0.1"],
            source,
            RefreshConfig::enabled().with_interval(Duration::from_secs(3600)),
        );

        provider.start();
        wait_until(|| provider.is_running()).await;
        provider.stop();
        provider.start();
        assert!(provider.is_running(), "start right after stop must not be dropped");

        provider.trigger_refresh();
        wait_until(|| provider.size() == 2).await;

        provider.stop();
        assert!(!provider.is_running());
    }

    #[test]
    fn test_trigger_refresh_when_stopped_is_noop() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider = provider_with_source(&["10.0.0.1"], source, RefreshConfig::enabled());

        provider.trigger_refresh();
        provider.stop();
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_contract_operations_delegate_to_inner() {
        let source = EndpointSource::from_static(ip_set(&["10.0.0.1"]).into_vec());
        let provider =
            provider_with_source(&["10.0.0.1", "10.0.0.2"], source, RefreshConfig::disabled());

        let target = provider.next(Duration::ZERO).await.unwrap();
        assert!(target.is_resolved());

        provider.on_connected();
        assert_eq!(provider.current(), Some(target.endpoint().clone()));

        provider.on_disconnected();
        assert!(provider.current().is_none());

        let external = Endpoint::new("10.0.0.9", DEFAULT_PORT);
        assert!(provider.update_server_list(ip_set(&["10.0.0.1"]), Some(&external)));
    }

    #[test]
    fn test_provider_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RefreshingHostProvider>();
    }
}
