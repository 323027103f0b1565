//! Uniformly shuffled traversal over a fixed endpoint set.

use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolutionConfig,
    endpoint::{Endpoint, EndpointSet},
    error::Result,
    provider::{HostProvider, ResolvedEndpoint, Walk, should_migrate, walk_next},
    resolve::{DnsResolver, HostResolver},
};

/// The standard [`HostProvider`]: a fixed endpoint set walked in a private
/// pseudo-random permutation.
///
/// Each provider instance shuffles independently, so a fleet of clients
/// starting from the same connect string spreads its first connection
/// attempts across the whole ensemble instead of herding onto one server.
/// The set is reshuffled on every [`update_server_list`] call for the same
/// reason.
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use ensemble_hosts::{DEFAULT_PORT, EndpointSet, HostProvider, StaticHostProvider};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let servers = EndpointSet::parse_list("zk1:2181,zk2:2181,zk3:2181", DEFAULT_PORT)?;
/// let provider = StaticHostProvider::new(servers);
///
/// let target = provider.next(Duration::from_secs(1)).await?;
/// // ... attempt a connection to `target.addr()` ...
/// provider.on_connected();
/// # Ok(())
/// # }
/// ```
///
/// [`update_server_list`]: HostProvider::update_server_list
#[derive(Debug)]
pub struct StaticHostProvider<R: HostResolver = DnsResolver> {
    state: Mutex<Walk>,
    resolver: R,
    resolution: ResolutionConfig,
    cancel: CancellationToken,
}

impl StaticHostProvider {
    /// Creates a provider over `endpoints` with live DNS resolution.
    #[must_use]
    pub fn new(endpoints: EndpointSet) -> Self {
        Self::with_resolver(endpoints, DnsResolver::new())
    }
}

impl<R: HostResolver> StaticHostProvider<R> {
    /// Creates a provider that resolves candidates through `resolver`.
    #[must_use]
    pub fn with_resolver(endpoints: EndpointSet, resolver: R) -> Self {
        Self {
            state: Mutex::new(Walk::new(shuffled(endpoints.into_vec()))),
            resolver,
            resolution: ResolutionConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the retry policy for candidate resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = resolution;
        self
    }

    /// Ties the provider to the owning client's shutdown token.
    ///
    /// Cancelling the token interrupts any in-flight spin-delay or
    /// resolution wait inside [`next`](HostProvider::next).
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the endpoint recorded by the last
    /// [`on_connected`](HostProvider::on_connected) call, if any.
    #[must_use]
    pub fn current(&self) -> Option<Endpoint> {
        self.state.lock().current().cloned()
    }

    pub(crate) fn resolver(&self) -> &R {
        &self.resolver
    }
}

fn shuffled(mut endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    endpoints.shuffle(&mut rand::rng());
    endpoints
}

impl<R: HostResolver> HostProvider for StaticHostProvider<R> {
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
        let new_order = shuffled(endpoints.into_vec());

        let mut walk = self.state.lock();
        let migrate = should_migrate(walk.len(), &new_order, current);
        walk.replace(new_order, migrate);
        migrate
    }
}
