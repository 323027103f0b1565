//! Candidate resolution: DNS lookups with bounded, cancellable retry.
//!
//! Resolution sits inside the connection hot path, so two rules hold
//! throughout: every wait (attempt or backoff) can be interrupted by the
//! owning client's shutdown token, and nothing in this module logs. A
//! candidate that cannot be resolved is reported back as a
//! [`Resolution`](crate::HostError::Resolution) error for the caller to skip.

use std::{future::Future, net::IpAddr, sync::Arc, time::Duration};

use hickory_resolver::{Resolver, config::ResolverConfig, name_server::TokioConnectionProvider};
use parking_lot::RwLock;
use rand::Rng;
use snafu::{ResultExt, ensure};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ResolutionConfig,
    error::{InterruptedSnafu, ResolutionSnafu, Result},
};

/// Errors from a single host lookup.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The DNS query itself failed.
    #[error("DNS lookup failed for {host}: {source}")]
    Lookup {
        /// Host name that was queried.
        host: String,
        /// Underlying resolver error.
        source: hickory_resolver::ResolveError,
    },

    /// The query succeeded but returned no addresses.
    #[error("no addresses found for {host}")]
    Empty {
        /// Host name that was queried.
        host: String,
    },
}

/// Resolves host names to IP addresses.
///
/// The providers resolve candidates through this seam so deployments can
/// substitute a caching resolver, and tests can script lookup outcomes.
pub trait HostResolver: std::fmt::Debug + Send + Sync + 'static {
    /// Looks up all addresses for a host name.
    fn lookup(
        &self,
        host: &str,
    ) -> impl Future<Output = std::result::Result<Vec<IpAddr>, ResolveError>> + Send;
}

/// [`HostResolver`] backed by `hickory-resolver`.
///
/// The underlying resolver is built lazily on first lookup and shared across
/// clones, so constructing a provider opens no sockets.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver {
    inner: Arc<RwLock<Option<Resolver<TokioConnectionProvider>>>>,
}

impl DnsResolver {
    /// Creates a DNS resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self) -> Resolver<TokioConnectionProvider> {
        // Check if already created
        {
            let guard = self.inner.read();
            if let Some(ref resolver) = *guard {
                return resolver.clone();
            }
        }

        let resolver = Resolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();

        {
            let mut guard = self.inner.write();
            if guard.is_none() {
                *guard = Some(resolver.clone());
            }
        }

        resolver
    }
}

impl HostResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> std::result::Result<Vec<IpAddr>, ResolveError> {
        let resolver = self.get_or_create();

        let lookup = resolver
            .lookup_ip(host)
            .await
            .map_err(|source| ResolveError::Lookup { host: host.to_owned(), source })?;

        let addrs: Vec<IpAddr> = lookup.iter().collect();
        if addrs.is_empty() {
            return Err(ResolveError::Empty { host: host.to_owned() });
        }
        Ok(addrs)
    }
}

/// Resolves `host` under the given retry policy, racing every attempt and
/// every backoff sleep against `cancel`.
///
/// # Errors
///
/// Returns `Interrupted` if the token fires first, or `Resolution` wrapping
/// the last lookup error once attempts are exhausted.
pub(crate) async fn resolve_with_retry<R: HostResolver>(
    resolver: &R,
    host: &str,
    config: &ResolutionConfig,
    cancel: &CancellationToken,
) -> Result<Vec<IpAddr>> {
    // Fail fast if already cancelled
    ensure!(!cancel.is_cancelled(), InterruptedSnafu);

    let mut attempt: u32 = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return InterruptedSnafu.fail();
            }
            result = resolver.lookup(host) => result,
        };

        match result {
            Ok(addrs) => return Ok(addrs),
            Err(err) => {
                if attempt >= config.max_attempts {
                    return Err(err).context(ResolutionSnafu { host });
                }

                let jittered = apply_jitter(backoff, config.jitter);

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return InterruptedSnafu.fail();
                    }
                    () = tokio::time::sleep(jittered) => {}
                }

                backoff = next_backoff(backoff, config.multiplier, config.max_backoff);
            },
        }
    }
}

/// Advances exponential backoff, capped at `max`.
fn next_backoff(current: Duration, multiplier: f64, max: Duration) -> Duration {
    std::cmp::min(Duration::from_nanos((current.as_nanos() as f64 * multiplier) as u64), max)
}

/// Apply jitter to a duration.
///
/// Jitter adds randomness in the range `[dur * (1 - factor), dur * (1 + factor)]`
/// to prevent thundering herd when many clients back off simultaneously.
fn apply_jitter(dur: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return dur;
    }

    let factor = factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();

    let base_nanos = dur.as_nanos() as f64;
    let min_nanos = base_nanos * (1.0 - factor);
    let max_nanos = base_nanos * (1.0 + factor);

    let jittered_nanos = rng.random_range(min_nanos..=max_nanos);
    Duration::from_nanos(jittered_nanos as u64)
}
