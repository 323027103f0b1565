//! Client-side host selection and load-balancing for replicated
//! coordination services.
//!
//! A fleet of clients connecting to the same server ensemble needs three
//! things from its connection-target logic: spread first attempts across the
//! whole ensemble instead of herding onto one server, keep cycling through
//! candidates forever without a tight loop when everything is down, and
//! rebalance fairly when the ensemble membership changes. This crate provides
//! that logic as a [`HostProvider`]: a small piece of state the owning
//! client's connection loop calls synchronously, with no threads of its own
//! beyond the optional background refresh task.
//!
//! The load-balancing decision is fully decentralized. When the server list
//! changes from `m` to `n` members, each connected client independently draws
//! against [`migration_probability`]; across an uncoordinated fleet the
//! aggregate migration rate converges to the ideal reshuffling fraction with
//! no server-side rebalancer and no synchronized clocks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 owning client (connection loop)             │
//! │   next() │ on_connected() │ update_server_list()            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       HostProvider                          │
//! │   StaticHostProvider │ RefreshingHostProvider │ Latency...  │
//! ├─────────────────────────────────────────────────────────────┤
//! │     EndpointSet + cursor + attempt counter (one mutex)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │   HostResolver (DNS)  │  EndpointSource (static/DNS/file)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ensemble_hosts::{DEFAULT_PORT, EndpointSet, HostProvider, StaticHostProvider};
//!
//! # async fn example() -> ensemble_hosts::Result<()> {
//! let servers = EndpointSet::parse_list("zk1:2181,zk2:2181,zk3:2181", DEFAULT_PORT)?;
//! let provider = StaticHostProvider::new(servers);
//!
//! loop {
//!     let target = provider.next(Duration::from_secs(1)).await?;
//!     // ... attempt a connection to target.addr() ...
//!     provider.on_connected();
//!     break;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod error;
mod provider;
mod resolve;
mod source;
#[cfg(test)]
mod testing;

pub use config::{RefreshConfig, ResolutionConfig, ResolutionConfigBuilder};
pub use endpoint::{DEFAULT_PORT, Endpoint, EndpointSet};
pub use error::{HostError, Result};
pub use provider::{
    HostProvider, LatencyAwareHostProvider, RefreshingHostProvider, ResolvedEndpoint,
    StaticHostProvider, migration_probability,
};
pub use resolve::{DnsResolver, HostResolver, ResolveError};
pub use source::{DnsSourceConfig, EndpointSource, FileSourceConfig, SourceError};
