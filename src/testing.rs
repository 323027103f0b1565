//! Test doubles shared across unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::resolve::{HostResolver, ResolveError};

/// Scripted resolver: maps hosts to fixed addresses, optionally failing the
/// first N lookups across all hosts. Unknown hosts always fail.
#[derive(Debug, Default)]
pub(crate) struct ScriptedResolver {
    addrs: HashMap<String, Vec<IpAddr>>,
    fail_first: u32,
    calls: AtomicU32,
}

impl ScriptedResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Never succeeds.
    pub(crate) fn failing() -> Self {
        Self::new().fail_first(u32::MAX)
    }

    pub(crate) fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        self.addrs.insert(host.to_owned(), addrs.iter().map(|a| a.parse().unwrap()).collect());
        self
    }

    /// Fails the first `n` lookups regardless of host.
    pub(crate) fn fail_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostResolver for ScriptedResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ResolveError::Empty { host: host.to_owned() });
        }
        match self.addrs.get(host) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs.clone()),
            _ => Err(ResolveError::Empty { host: host.to_owned() }),
        }
    }
}
