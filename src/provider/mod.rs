//! Host providers: connection-target selection over an endpoint set.
//!
//! A provider owns the candidate endpoint set, walks it in a
//! provider-specific order, and answers the load-balancing question when the
//! server membership changes: should this client move its connection? Every
//! client draws that decision independently, so the aggregate migration rate
//! across an uncoordinated fleet converges to the ideal reshuffling fraction
//! without any server-side coordination.

use std::{future::Future, net::SocketAddr, time::Duration};

use parking_lot::Mutex;
use rand::Rng;
use snafu::ensure;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolutionConfig,
    endpoint::{Endpoint, EndpointSet},
    error::{InterruptedSnafu, Result},
    resolve::{HostResolver, resolve_with_retry},
};

mod latency;
mod refreshing;
mod shuffled;

pub use latency::LatencyAwareHostProvider;
pub use refreshing::RefreshingHostProvider;
pub use shuffled::StaticHostProvider;

/// Connection-target selection for one client session.
///
/// Implementations are safe to share across tasks: `next` may run in a
/// connection loop while `update_server_list` is applied from a watcher and
/// `on_connected` fires from either.
pub trait HostProvider: Send + Sync {
    /// Returns the number of endpoints currently tracked. Always at least 1.
    fn size(&self) -> usize;

    /// Returns the next endpoint to attempt a connection to.
    ///
    /// The sequence cycles forever and never reports exhaustion. Once every
    /// endpoint has been tried without an intervening success, the call
    /// sleeps for `spin_delay` before yielding, bounding the attempt rate
    /// under total failure. A `spin_delay` of zero disables the sleep.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` when the owning client's cancellation token
    /// fires during the sleep or during resolution backoff. Resolution
    /// failures are not errors here: an unresolvable candidate is skipped,
    /// and if a whole pass fails to resolve, the current candidate is
    /// returned unresolved.
    fn next(&self, spin_delay: Duration) -> impl Future<Output = Result<ResolvedEndpoint>> + Send;

    /// Records that the endpoint last returned by [`next`](Self::next)
    /// connected successfully, resetting the attempt counter that drives
    /// spin-delay decisions.
    fn on_connected(&self);

    /// Clears the recorded current connection.
    fn on_disconnected(&self);

    /// Replaces the tracked endpoint set with `endpoints`.
    ///
    /// Returns `true` when the caller should proactively drop its connection
    /// to `current` and reconnect through [`next`](Self::next), so that load
    /// spreads evenly across the new membership. The decision is advisory;
    /// the caller performs the actual disconnect.
    fn update_server_list(&self, endpoints: EndpointSet, current: Option<&Endpoint>) -> bool;
}

/// The value handed out by [`HostProvider::next`]: the chosen endpoint plus
/// its socket address when resolution succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    endpoint: Endpoint,
    addr: Option<SocketAddr>,
}

impl ResolvedEndpoint {
    pub(crate) fn new(endpoint: Endpoint, addr: Option<SocketAddr>) -> Self {
        Self { endpoint, addr }
    }

    /// Returns the endpoint this result refers to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the resolved socket address, if resolution succeeded.
    #[must_use]
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Returns whether the endpoint carries a resolved address.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.addr.is_some()
    }
}

/// Probability that a connected client migrates when the server list changes
/// from `old_size` to `new_size` members and its current endpoint is retained.
///
/// - Shrinking (`new_size < old_size`): `1 / new_size`.
/// - Growing (`new_size > old_size`): `(new_size - old_size) / new_size`.
/// - Unchanged size: `0` — pure membership rotation is caught by the
///   absence check, not by probability.
///
/// A size of zero yields `0` to keep the function total; live sets are never
/// empty.
#[must_use]
pub fn migration_probability(old_size: usize, new_size: usize) -> f64 {
    if old_size == 0 || new_size == 0 {
        return 0.0;
    }
    if new_size < old_size {
        1.0 / new_size as f64
    } else if new_size > old_size {
        (new_size - old_size) as f64 / new_size as f64
    } else {
        0.0
    }
}

/// One migration decision: forced when `current` left the set, otherwise a
/// single uniform draw in `[0, 1)` against [`migration_probability`].
pub(crate) fn should_migrate(
    old_size: usize,
    new: &[Endpoint],
    current: Option<&Endpoint>,
) -> bool {
    let Some(current) = current else {
        // Not connected: nothing to migrate from.
        return false;
    };
    if !new.contains(current) {
        return true;
    }
    let p = migration_probability(old_size, new.len());
    p > 0.0 && rand::rng().random_range(0.0..1.0) < p
}

/// Traversal state shared by the static and latency-aware providers: the
/// ordered endpoint list, the cursor, and the attempts-since-success counter.
///
/// All methods run under the owning provider's mutex; nothing here sleeps or
/// performs I/O.
#[derive(Debug)]
pub(crate) struct Walk {
    /// Current traversal order. Never empty.
    endpoints: Vec<Endpoint>,
    /// Index of the next endpoint to yield.
    cursor: usize,
    /// Yields since the last successful connection.
    attempts: usize,
    /// Endpoint recorded by `mark_connected`.
    current: Option<Endpoint>,
    /// Most recently yielded endpoint.
    last_yielded: Option<Endpoint>,
}

impl Walk {
    pub(crate) fn new(endpoints: Vec<Endpoint>) -> Self {
        debug_assert!(!endpoints.is_empty());
        Self { endpoints, cursor: 0, attempts: 0, current: None, last_yielded: None }
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when the walk is back at the head of the order and every
    /// endpoint has been yielded since the last success. This is the point
    /// where the spin delay applies.
    pub(crate) fn needs_spin(&self) -> bool {
        self.cursor == 0 && self.attempts >= self.endpoints.len()
    }

    /// Yields the endpoint under the cursor and moves past it.
    pub(crate) fn advance(&mut self) -> Endpoint {
        let endpoint = self.endpoints[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        self.attempts += 1;
        self.last_yielded = Some(endpoint.clone());
        endpoint
    }

    /// Records a successful connection to the last yielded endpoint.
    pub(crate) fn mark_connected(&mut self) {
        self.attempts = 0;
        self.current = self.last_yielded.clone();
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.current = None;
    }

    /// Installs a new traversal order. A migration restarts from the head;
    /// otherwise the cursor persists, wrapping to the head if it fell out of
    /// range. The attempt counter persists either way.
    pub(crate) fn replace(&mut self, ordered: Vec<Endpoint>, migrate: bool) {
        debug_assert!(!ordered.is_empty());
        self.endpoints = ordered;
        if migrate || self.cursor >= self.endpoints.len() {
            self.cursor = 0;
        }
    }

    pub(crate) fn current(&self) -> Option<&Endpoint> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn order(&self) -> &[Endpoint] {
        &self.endpoints
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Shared `next` driver: spin at the wrap point, resolve the candidate, skip
/// forward on resolution failure, and after a whole failed pass hand back the
/// current candidate unresolved.
///
/// The lock is never held across an await; the candidate pick and the spin
/// decision each happen under one acquisition, so a concurrent update is
/// observed either fully or not at all.
pub(crate) async fn walk_next<R: HostResolver>(
    state: &Mutex<Walk>,
    resolver: &R,
    resolution: &ResolutionConfig,
    cancel: &CancellationToken,
    spin_delay: Duration,
) -> Result<ResolvedEndpoint> {
    ensure!(!cancel.is_cancelled(), InterruptedSnafu);

    let mut skipped = 0usize;

    loop {
        let spin = !spin_delay.is_zero() && state.lock().needs_spin();
        if spin {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return InterruptedSnafu.fail();
                }
                () = tokio::time::sleep(spin_delay) => {}
            }
        }

        let (candidate, len) = {
            let mut walk = state.lock();
            let candidate = walk.advance();
            (candidate, walk.len())
        };

        // IP literals need no lookup.
        if let Some(addr) = candidate.socket_addr() {
            return Ok(ResolvedEndpoint::new(candidate, Some(addr)));
        }

        match resolve_with_retry(resolver, candidate.host(), resolution, cancel).await {
            Ok(addrs) if !addrs.is_empty() => {
                let ip = addrs[rand::rng().random_range(0..addrs.len())];
                let addr = SocketAddr::new(ip, candidate.port());
                return Ok(ResolvedEndpoint::new(candidate, Some(addr)));
            },
            Err(err) if err.is_interrupted() => return Err(err),
            Ok(_) | Err(_) => {
                skipped += 1;
                if skipped >= len {
                    // A full pass failed to resolve: still return something.
                    return Ok(ResolvedEndpoint::new(candidate, None));
                }
            },
        }
    }
}
