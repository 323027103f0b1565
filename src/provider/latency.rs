//! Latency-ordered traversal over the endpoint set.

use std::{collections::HashSet, time::Duration};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolutionConfig,
    endpoint::{Endpoint, EndpointSet},
    error::Result,
    provider::{HostProvider, ResolvedEndpoint, Walk, should_migrate, walk_next},
    resolve::{DnsResolver, HostResolver},
};

/// Exponential moving average alpha factor.
///
/// α = 0.3 gives roughly a 10-sample half-life: recent samples carry
/// significant weight but history still matters.
const EMA_ALPHA: f64 = 0.3;

/// Assumed latency for endpoints with no measurements (10 ms).
///
/// Optimistic, so new endpoints still get tried.
const DEFAULT_LATENCY_MS: f64 = 10.0;

/// Minimum samples before a measurement is considered reliable.
const MIN_RELIABLE_SAMPLES: u64 = 3;

/// Sorting penalty for endpoints without reliable measurements.
const UNRELIABLE_PENALTY_MS: f64 = 5.0;

/// Latency statistics for a single endpoint.
#[derive(Debug, Clone)]
struct LatencyStats {
    /// Exponential moving average of observed latency in milliseconds.
    ema_ms: f64,
    /// Number of samples recorded.
    sample_count: u64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self { ema_ms: DEFAULT_LATENCY_MS, sample_count: 0 }
    }
}

impl LatencyStats {
    fn record(&mut self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        if self.sample_count == 0 {
            // First sample stands alone.
            self.ema_ms = latency_ms;
        } else {
            self.ema_ms = EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * self.ema_ms;
        }
        self.sample_count += 1;
    }

    fn is_reliable(&self) -> bool {
        self.sample_count >= MIN_RELIABLE_SAMPLES
    }
}

/// A [`HostProvider`] that walks endpoints in ascending observed-latency
/// order instead of a uniform shuffle.
///
/// The owning client feeds round-trip observations in through
/// [`record_latency`](Self::record_latency) and health signals through
/// [`mark_unhealthy`](Self::mark_unhealthy). Reordering happens exactly where
/// the shuffled provider reshuffles: at construction and on every
/// [`update_server_list`](HostProvider::update_server_list). Within a band
/// (unmeasured endpoints, or exact latency ties) order is shuffled so
/// cold-start clients do not herd.
///
/// Unhealthy endpoints sort after healthy ones but are still yielded every
/// cycle; no endpoint is ever permanently skipped. Spin-delay, the attempt
/// counter, and the migration decision behave exactly as in
/// [`StaticHostProvider`](crate::StaticHostProvider).
#[derive(Debug)]
pub struct LatencyAwareHostProvider<R: HostResolver = DnsResolver> {
    state: Mutex<Walk>,
    resolver: R,
    resolution: ResolutionConfig,
    cancel: CancellationToken,
    latencies: DashMap<Endpoint, LatencyStats>,
    unhealthy: RwLock<HashSet<Endpoint>>,
}

impl LatencyAwareHostProvider {
    /// Creates a provider over `endpoints` with live DNS resolution.
    #[must_use]
    pub fn new(endpoints: EndpointSet) -> Self {
        Self::with_resolver(endpoints, DnsResolver::new())
    }
}

impl<R: HostResolver> LatencyAwareHostProvider<R> {
    /// Creates a provider that resolves candidates through `resolver`.
    #[must_use]
    pub fn with_resolver(endpoints: EndpointSet, resolver: R) -> Self {
        let latencies = DashMap::new();
        let unhealthy = RwLock::new(HashSet::new());
        let order = ordered(endpoints.into_vec(), &latencies, &unhealthy.read());
        Self {
            state: Mutex::new(Walk::new(order)),
            resolver,
            resolution: ResolutionConfig::default(),
            cancel: CancellationToken::new(),
            latencies,
            unhealthy,
        }
    }

    /// Sets the retry policy for candidate resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = resolution;
        self
    }

    /// Ties the provider to the owning client's shutdown token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Records an observed round-trip latency for an endpoint.
    ///
    /// Updates the endpoint's exponential moving average. The new value takes
    /// effect on the next reordering, i.e. the next
    /// [`update_server_list`](HostProvider::update_server_list) call.
    pub fn record_latency(&self, endpoint: &Endpoint, latency: Duration) {
        self.latencies.entry(endpoint.clone()).or_default().record(latency);
    }

    /// Marks an endpoint as unhealthy, sorting it after healthy ones.
    ///
    /// Unhealthy endpoints are deprioritized, never excluded: the traversal
    /// still yields them once per cycle.
    pub fn mark_unhealthy(&self, endpoint: &Endpoint) {
        self.unhealthy.write().insert(endpoint.clone());
    }

    /// Clears the unhealthy mark from an endpoint.
    pub fn mark_healthy(&self, endpoint: &Endpoint) {
        self.unhealthy.write().remove(endpoint);
    }

    /// Returns the latency EMA for an endpoint, if any samples exist.
    #[must_use]
    pub fn latency_ms(&self, endpoint: &Endpoint) -> Option<f64> {
        self.latencies.get(endpoint).map(|stats| stats.ema_ms)
    }

    /// Returns whether an endpoint is currently marked unhealthy.
    #[must_use]
    pub fn is_unhealthy(&self, endpoint: &Endpoint) -> bool {
        self.unhealthy.read().contains(endpoint)
    }

    /// Returns the endpoint recorded by the last
    /// [`on_connected`](HostProvider::on_connected) call, if any.
    #[must_use]
    pub fn current(&self) -> Option<Endpoint> {
        self.state.lock().current().cloned()
    }
}

/// Orders endpoints for traversal: healthy before unhealthy, then ascending
/// effective latency. The pre-sort shuffle randomizes order within every
/// equal-key band, since the sort is stable.
fn ordered(
    mut endpoints: Vec<Endpoint>,
    latencies: &DashMap<Endpoint, LatencyStats>,
    unhealthy: &HashSet<Endpoint>,
) -> Vec<Endpoint> {
    endpoints.shuffle(&mut rand::rng());
    endpoints.sort_by(|a, b| {
        let key_a = (unhealthy.contains(a), effective_latency(latencies, a));
        let key_b = (unhealthy.contains(b), effective_latency(latencies, b));
        key_a.partial_cmp(&key_b).unwrap_or(std::cmp::Ordering::Equal)
    });
    endpoints
}

/// Effective latency for sorting. Endpoints without reliable data get a
/// small penalty so measured endpoints are preferred, while unknown ones
/// still sort ahead of anything measured slow.
fn effective_latency(latencies: &DashMap<Endpoint, LatencyStats>, endpoint: &Endpoint) -> f64 {
    match latencies.get(endpoint) {
        Some(stats) if stats.is_reliable() => stats.ema_ms,
        Some(stats) => stats.ema_ms + UNRELIABLE_PENALTY_MS,
        None => DEFAULT_LATENCY_MS + 2.0 * UNRELIABLE_PENALTY_MS,
    }
}

impl<R: HostResolver> HostProvider for LatencyAwareHostProvider<R> {
    fn size(&self) -> usize {
        self.state.lock().len()
    }

    async fn next(&self, spin_delay: Duration) -> Result<ResolvedEndpoint> {
        walk_next(&self.state, &self.resolver, &self.resolution, &self.cancel, spin_delay).await
    }

    fn on_connected(&self) {
        self.state.lock().mark_connected();
    }

    fn on_disconnected(&self) {
        self.state.lock().mark_disconnected();
    }

    fn update_server_list(&self, endpoints: EndpointSet, current: Option<&Endpoint>) -> bool {
        let new_order = ordered(endpoints.into_vec(), &self.latencies, &self.unhealthy.read());

        let mut walk = self.state.lock();
        let migrate = should_migrate(walk.len(), &new_order, current);
        walk.replace(new_order, migrate);
        migrate
    }
}
