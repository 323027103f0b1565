//! Endpoint addressing types.
//!
//! An [`Endpoint`] is a host identifier plus port. The host may be a DNS name
//! (not yet resolved) or an IP literal. An [`EndpointSet`] is a validated,
//! de-duplicated collection of endpoints that is guaranteed non-empty for its
//! whole lifetime, which is what lets providers promise `size() >= 1`.

use std::{
    collections::HashSet,
    fmt,
    net::{IpAddr, Ipv6Addr, SocketAddr},
};

use snafu::ensure;

use crate::error::{InvalidConfigurationSnafu, Result};

/// Default client port of the coordination service.
pub const DEFAULT_PORT: u16 = 2181;

/// A server endpoint: host identifier plus port.
///
/// Equality and hashing are by `(host, port)`, so re-resolving a DNS name to
/// a different address never changes membership in an [`EndpointSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from a host identifier and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parses an endpoint from a `host:port` spec.
    ///
    /// Accepted forms:
    /// - `zk1.example.com:2181` and `zk1.example.com` (falls back to
    ///   `default_port`)
    /// - IPv4 literals: `10.0.0.1:2181`, `10.0.0.1`
    /// - IPv6 literals: `[fe80::1]:2181`, `[fe80::1]`, and bare `fe80::1`
    ///   (bare form always uses `default_port`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for empty specs, embedded whitespace,
    /// malformed brackets, non-numeric or zero ports, and unbracketed IPv6
    /// with a port (ambiguous).
    pub fn parse(spec: &str, default_port: u16) -> Result<Self> {
        let spec = spec.trim();
        ensure!(
            !spec.is_empty(),
            InvalidConfigurationSnafu { message: "endpoint spec cannot be empty" }
        );
        ensure!(
            !spec.contains(char::is_whitespace),
            InvalidConfigurationSnafu {
                message: format!("endpoint spec '{spec}' cannot contain whitespace")
            }
        );

        // Bracketed IPv6: `[addr]` or `[addr]:port`.
        if let Some(rest) = spec.strip_prefix('[') {
            let Some((host, tail)) = rest.split_once(']') else {
                return InvalidConfigurationSnafu {
                    message: format!("unclosed '[' in endpoint spec '{spec}'"),
                }
                .fail();
            };
            ensure!(
                host.parse::<Ipv6Addr>().is_ok(),
                InvalidConfigurationSnafu {
                    message: format!("invalid IPv6 literal in endpoint spec '{spec}'")
                }
            );
            let port = if tail.is_empty() {
                default_port
            } else if let Some(port) = tail.strip_prefix(':') {
                parse_port(port, spec)?
            } else {
                return InvalidConfigurationSnafu {
                    message: format!("unexpected characters after ']' in endpoint spec '{spec}'"),
                }
                .fail();
            };
            return Ok(Self { host: host.to_owned(), port });
        }

        // Bare IPv6 literal without port, e.g. `fe80::1`. Must be checked
        // before splitting on ':' since the address itself contains colons.
        if spec.parse::<Ipv6Addr>().is_ok() {
            return Ok(Self { host: spec.to_owned(), port: default_port });
        }

        match spec.rsplit_once(':') {
            Some((host, port)) => {
                ensure!(
                    !host.is_empty(),
                    InvalidConfigurationSnafu {
                        message: format!("missing host in endpoint spec '{spec}'")
                    }
                );
                ensure!(
                    !host.contains(':'),
                    InvalidConfigurationSnafu {
                        message: format!(
                            "ambiguous IPv6 endpoint spec '{spec}', use [addr]:port"
                        )
                    }
                );
                Ok(Self { host: host.to_owned(), port: parse_port(port, spec)? })
            },
            None => Ok(Self { host: spec.to_owned(), port: default_port }),
        }
    }

    /// Returns the host identifier (DNS name or IP literal).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the IP address if the host is an IP literal.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Returns the socket address if no DNS resolution is needed.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip().map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str, spec: &str) -> Result<u16> {
    let port: u16 = port.parse().map_err(|_| {
        InvalidConfigurationSnafu { message: format!("invalid port in endpoint spec '{spec}'") }
            .build()
    })?;
    ensure!(
        port != 0,
        InvalidConfigurationSnafu {
            message: format!("port cannot be zero in endpoint spec '{spec}'")
        }
    );
    Ok(port)
}

/// A validated, de-duplicated, never-empty collection of endpoints.
///
/// Construction rejects an empty input, so any live `EndpointSet` has at
/// least one member. Duplicates (by `(host, port)` identity) are dropped,
/// keeping the first occurrence's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Creates a set from endpoints, de-duplicating by `(host, port)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the input is empty.
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self> {
        let mut seen = HashSet::new();
        let endpoints: Vec<Endpoint> =
            endpoints.into_iter().filter(|e| seen.insert(e.clone())).collect();
        ensure!(
            !endpoints.is_empty(),
            InvalidConfigurationSnafu { message: "at least one endpoint is required" }
        );
        Ok(Self { endpoints })
    }

    /// Parses a comma-separated list of `host:port` specs.
    ///
    /// Empty segments are skipped, so `"a:2181,,b:2181,"` parses as two
    /// endpoints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any spec is malformed or the list
    /// contains no endpoints at all.
    pub fn parse_list(spec: &str, default_port: u16) -> Result<Self> {
        let endpoints = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Endpoint::parse(s, default_port))
            .collect::<Result<Vec<_>>>()?;
        Self::new(endpoints)
    }

    /// Returns the number of endpoints. Always at least 1.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false: emptiness is rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns whether the set contains an endpoint with the same host and
    /// port.
    #[must_use]
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// Iterates over the endpoints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Returns the endpoints as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Consumes the set, returning the endpoints.
    #[must_use]
    pub fn into_vec(self) -> Vec<Endpoint> {
        self.endpoints
    }
}
