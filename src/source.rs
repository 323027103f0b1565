//! Authoritative endpoint lists from static, DNS, and file sources.
//!
//! An [`EndpointSource`] answers one question: what is the server list right
//! now? Refresh scheduling belongs to
//! [`RefreshConfig`](crate::RefreshConfig), and applying a fetched list to a
//! live provider is the refreshing provider's job.

use std::path::PathBuf;

use snafu::ensure;

use crate::{
    endpoint::{DEFAULT_PORT, Endpoint, EndpointSet},
    error::{InvalidConfigurationSnafu, Result},
    resolve::{HostResolver, ResolveError},
};

/// Errors that can occur while fetching an endpoint list.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// DNS discovery failed.
    #[error("DNS discovery failed for {domain}: {source}")]
    Dns {
        /// Domain that was queried.
        domain: String,
        /// Underlying lookup error.
        source: ResolveError,
    },

    /// File manifest read failed.
    #[error("Failed to read server manifest from {}: {source}", path.display())]
    FileRead {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File manifest parse failed.
    #[error("Failed to parse server manifest from {}: {source}", path.display())]
    FileParse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A manifest entry is not a valid `host:port` spec.
    #[error("Invalid server entry '{entry}' in {}: {message}", path.display())]
    BadEntry {
        /// Manifest path.
        path: PathBuf,
        /// Offending entry.
        entry: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Configuration for DNS-based endpoint discovery.
#[derive(Debug, Clone, bon::Builder)]
#[builder(derive(Debug))]
pub struct DnsSourceConfig {
    /// DNS name whose A/AAAA records enumerate the ensemble
    /// (e.g. `ensemble.example.com`).
    #[builder(into)]
    domain: String,

    /// Port assigned to every discovered address.
    #[builder(default = DEFAULT_PORT)]
    port: u16,
}

impl DnsSourceConfig {
    /// Returns the domain to resolve.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the port assigned to discovered addresses.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Configuration for file-based endpoint discovery.
#[derive(Debug, Clone, bon::Builder)]
#[builder(derive(Debug))]
pub struct FileSourceConfig {
    /// Path to the server manifest JSON file.
    #[builder(into)]
    path: PathBuf,

    /// Port applied to manifest entries that omit one.
    #[builder(default = DEFAULT_PORT)]
    default_port: u16,
}

impl FileSourceConfig {
    /// Returns the manifest path.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Returns the port applied to entries without one.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        self.default_port
    }
}

/// Server manifest JSON format: `{"servers": ["host:port", ...]}`.
#[derive(Debug, serde::Deserialize)]
struct ServerManifest {
    servers: Vec<String>,
}

/// Where an authoritative endpoint list comes from.
#[derive(Debug, Clone)]
pub enum EndpointSource {
    /// Fixed list of endpoints.
    Static(Vec<Endpoint>),

    /// DNS domain whose address records enumerate the servers.
    Dns(DnsSourceConfig),

    /// JSON manifest file listing `host:port` entries.
    File(FileSourceConfig),
}

impl EndpointSource {
    /// Creates a static source from endpoints.
    pub fn from_static(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self::Static(endpoints.into_iter().collect())
    }

    /// Creates a static source from a comma-separated `host:port` list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the list is empty or malformed.
    pub fn parse_static(list: &str, default_port: u16) -> Result<Self> {
        Ok(Self::Static(EndpointSet::parse_list(list, default_port)?.into_vec()))
    }

    /// Creates a DNS source.
    pub fn dns(config: DnsSourceConfig) -> Self {
        Self::Dns(config)
    }

    /// Creates a file source.
    pub fn file(config: FileSourceConfig) -> Self {
        Self::File(config)
    }

    /// Auto-detects the source type from a string.
    ///
    /// - Path-like values (starting with `/` or `.`) become file sources
    /// - Values containing `:` or `,` parse as a static `host:port` list
    /// - Anything else is treated as a DNS domain
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the value is empty or parses as a
    /// static list with a malformed entry.
    pub fn auto_detect(value: &str, default_port: u16) -> Result<Self> {
        let value = value.trim();
        ensure!(
            !value.is_empty(),
            InvalidConfigurationSnafu { message: "endpoint source cannot be empty" }
        );

        if value.starts_with('/') || value.starts_with('.') {
            return Ok(Self::File(
                FileSourceConfig::builder().path(value).default_port(default_port).build(),
            ));
        }

        if value.contains(':') || value.contains(',') {
            return Self::parse_static(value, default_port);
        }

        Ok(Self::Dns(DnsSourceConfig::builder().domain(value).port(default_port).build()))
    }

    /// Fetches the current endpoint list.
    ///
    /// May legitimately return an empty list (an empty DNS zone, an empty
    /// manifest); callers that feed the result into an
    /// [`EndpointSet`](crate::EndpointSet) surface that as
    /// `InvalidConfiguration` there.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the DNS query, file read, or manifest
    /// parse fails.
    pub async fn fetch<R: HostResolver>(
        &self,
        resolver: &R,
    ) -> std::result::Result<Vec<Endpoint>, SourceError> {
        match self {
            Self::Static(endpoints) => Ok(endpoints.clone()),
            Self::Dns(config) => {
                let addrs = resolver
                    .lookup(&config.domain)
                    .await
                    .map_err(|source| SourceError::Dns { domain: config.domain.clone(), source })?;
                Ok(addrs.into_iter().map(|ip| Endpoint::new(ip.to_string(), config.port)).collect())
            },
            Self::File(config) => {
                let content = tokio::fs::read_to_string(&config.path).await.map_err(|source| {
                    SourceError::FileRead { path: config.path.clone(), source }
                })?;

                let manifest: ServerManifest = serde_json::from_str(&content).map_err(|source| {
                    SourceError::FileParse { path: config.path.clone(), source }
                })?;

                let mut endpoints = Vec::with_capacity(manifest.servers.len());
                for entry in manifest.servers {
                    let endpoint =
                        Endpoint::parse(&entry, config.default_port).map_err(|e| {
                            SourceError::BadEntry {
                                path: config.path.clone(),
                                entry: entry.clone(),
                                message: e.to_string(),
                            }
                        })?;
                    endpoints.push(endpoint);
                }
                Ok(endpoints)
            },
        }
    }

    /// Returns a description of the source for log lines.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Static(endpoints) => format!("static list ({} endpoints)", endpoints.len()),
            Self::Dns(config) => format!("DNS domain {}", config.domain),
            Self::File(config) => format!("file {}", config.path.display()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::ScriptedResolver;

    #[test]
    fn test_dns_source_config_defaults() {
        let config = DnsSourceConfig::builder().domain("ensemble.example.com").build();
        assert_eq!(config.domain(), "ensemble.example.com");
        assert_eq!(config.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_dns_source_config_custom() {
        let config = DnsSourceConfig::builder().domain("zk.svc.cluster.local").port(2281).build();
        assert_eq!(config.domain(), "zk.svc.cluster.local");
        assert_eq!(config.port(), 2281);
    }

    #[test]
    fn test_file_source_config_defaults() {
        let config = FileSourceConfig::builder().path("/etc/ensemble/servers.json").build();
        assert_eq!(config.path(), &PathBuf::from("/etc/ensemble/servers.json"));
        assert_eq!(config.default_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_parse_static() {
        let source = EndpointSource::parse_static("a:2181,b:2182", DEFAULT_PORT).unwrap();
        match &source {
            EndpointSource::Static(endpoints) => assert_eq!(endpoints.len(), 2),
            other => panic!("expected Static, got {other:?}"),
        }
        assert_eq!(source.describe(), "static list (2 endpoints)");
    }

    #[test]
    fn test_parse_static_rejects_empty() {
        assert!(EndpointSource::parse_static("", DEFAULT_PORT).is_err());
    }

    #[test]
    fn test_auto_detect_file() {
        let source = EndpointSource::auto_detect("/etc/ensemble/servers.json", 2281).unwrap();
        match source {
            EndpointSource::File(config) => {
                assert_eq!(config.path(), &PathBuf::from("/etc/ensemble/servers.json"));
                assert_eq!(config.default_port(), 2281);
            },
            other => panic!("expected File, got {other:?}"),
        }

        assert!(matches!(
            EndpointSource::auto_detect("./servers.json", DEFAULT_PORT).unwrap(),
            EndpointSource::File(_)
        ));
    }

    #[test]
    fn test_auto_detect_static_list() {
        let source = EndpointSource::auto_detect("zk1:2181,zk2:2181", DEFAULT_PORT).unwrap();
        match source {
            EndpointSource::Static(endpoints) => assert_eq!(endpoints.len(), 2),
            other => panic!("expected Static, got {other:?}"),
        }

        assert!(matches!(
            EndpointSource::auto_detect("zk1:2181", DEFAULT_PORT).unwrap(),
            EndpointSource::Static(_)
        ));
    }

    #[test]
    fn test_auto_detect_dns() {
        let source = EndpointSource::auto_detect("ensemble.example.com", 2281).unwrap();
        match source {
            EndpointSource::Dns(config) => {
                assert_eq!(config.domain(), "ensemble.example.com");
                assert_eq!(config.port(), 2281);
            },
            other => panic!("expected Dns, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_detect_rejects_empty() {
        assert!(EndpointSource::auto_detect("", DEFAULT_PORT).is_err());
        assert!(EndpointSource::auto_detect("   ", DEFAULT_PORT).is_err());
    }

    #[tokio::test]
    async fn test_fetch_static() {
        let source = EndpointSource::parse_static("a:2181,b:2182", DEFAULT_PORT).unwrap();
        let endpoints = source.fetch(&ScriptedResolver::new()).await.unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0], Endpoint::new("a", 2181));
    }

    #[tokio::test]
    async fn test_fetch_dns() {
        let resolver =
            ScriptedResolver::new().with_host("ensemble.example.com", &["10.0.0.1", "10.0.0.2"]);
        let source = EndpointSource::dns(
            DnsSourceConfig::builder().domain("ensemble.example.com").port(2281).build(),
        );

        let endpoints = source.fetch(&resolver).await.unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0], Endpoint::new("10.0.0.1", 2281));
        assert_eq!(endpoints[1], Endpoint::new("10.0.0.2", 2281));
    }

    #[tokio::test]
    async fn test_fetch_dns_failure() {
        let source = EndpointSource::dns(
            DnsSourceConfig::builder().domain("ensemble.example.com").build(),
        );

        let err = source.fetch(&ScriptedResolver::failing()).await.unwrap_err();

        assert!(matches!(err, SourceError::Dns { .. }));
        assert!(err.to_string().contains("ensemble.example.com"));
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let manifest = r#"{"servers": ["10.0.0.1:2181", "zk2.example.com:2182"]}"#;

        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, manifest).await.expect("write manifest");

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(manifest_path).build());
        let endpoints = source.fetch(&ScriptedResolver::new()).await.unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0], Endpoint::new("10.0.0.1", 2181));
        assert_eq!(endpoints[1], Endpoint::new("zk2.example.com", 2182));
    }

    #[tokio::test]
    async fn test_fetch_file_applies_default_port() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, r#"{"servers": ["zk1"]}"#).await.expect("write manifest");

        let source = EndpointSource::file(
            FileSourceConfig::builder().path(manifest_path).default_port(2281).build(),
        );
        let endpoints = source.fetch(&ScriptedResolver::new()).await.unwrap();

        assert_eq!(endpoints, vec![Endpoint::new("zk1", 2281)]);
    }

    #[tokio::test]
    async fn test_fetch_file_not_found() {
        let source = EndpointSource::file(
            FileSourceConfig::builder().path("/nonexistent/path.json").build(),
        );

        let err = source.fetch(&ScriptedResolver::new()).await.unwrap_err();

        assert!(matches!(err, SourceError::FileRead { .. }));
        assert!(err.to_string().contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_fetch_file_invalid_json() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let manifest_path = temp_dir.path().join("invalid.json");
        tokio::fs::write(&manifest_path, "not valid json").await.expect("write file");

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(manifest_path).build());

        let err = source.fetch(&ScriptedResolver::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::FileParse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_file_bad_entry() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, r#"{"servers": ["zk1:notaport"]}"#)
            .await
            .expect("write manifest");

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(manifest_path).build());

        let err = source.fetch(&ScriptedResolver::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::BadEntry { .. }));
        assert!(err.to_string().contains("zk1:notaport"));
    }

    #[tokio::test]
    async fn test_fetch_file_empty_manifest() {
        // An empty fetch is not a source error; building an EndpointSet from
        // it is what rejects it.
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let manifest_path = temp_dir.path().join("servers.json");
        tokio::fs::write(&manifest_path, r#"{"servers": []}"#).await.expect("write manifest");

        let source =
            EndpointSource::file(FileSourceConfig::builder().path(manifest_path).build());

        let endpoints = source.fetch(&ScriptedResolver::new()).await.unwrap();
        assert!(endpoints.is_empty());
        assert!(EndpointSet::new(endpoints).is_err());
    }
}
