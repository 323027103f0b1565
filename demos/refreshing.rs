//! Background refresh walkthrough: a file-backed endpoint source, the
//! refresh task, and migration hints.
//!
//! Run: `cargo run --example refreshing`

// Examples are allowed to use expect/unwrap for brevity
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use ensemble_hosts::{
    DEFAULT_PORT, EndpointSet, EndpointSource, FileSourceConfig, HostProvider, RefreshConfig,
    RefreshingHostProvider,
};

#[tokio::main]
async fn main() -> ensemble_hosts::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    // A manifest file stands in for whatever publishes the authoritative
    // server list in a real deployment.
    let dir = tempfile::tempdir().expect("create temp dir");
    let manifest = dir.path().join("servers.json");
    tokio::fs::write(&manifest, r#"{"servers": ["10.0.0.1:2181", "10.0.0.2:2181"]}"#)
        .await
        .expect("write manifest");

    let initial = EndpointSet::parse_list("10.0.0.1:2181,10.0.0.2:2181", DEFAULT_PORT)?;
    let source = EndpointSource::file(FileSourceConfig::builder().path(&manifest).build());
    let provider = RefreshingHostProvider::new(
        initial,
        source,
        RefreshConfig::enabled().with_interval(Duration::from_millis(200)),
    )?;
    let mut hints = provider.migrations();

    // Connect to one of the two initial endpoints.
    let target = provider.next(Duration::from_millis(250)).await?;
    provider.on_connected();
    println!("connected to {}", target.endpoint());

    provider.start();

    // Rewrite the manifest without the connected endpoint. The next refresh
    // tick picks it up, forces the migration decision, and publishes a hint.
    let survivor = if target.endpoint().host() == "10.0.0.1" { "10.0.0.2" } else { "10.0.0.1" };
    tokio::fs::write(
        &manifest,
        format!(r#"{{"servers": ["{survivor}:2181", "10.0.0.3:2181", "10.0.0.4:2181"]}}"#),
    )
    .await
    .expect("rewrite manifest");

    tokio::select! {
        changed = hints.changed() => {
            changed.expect("hint channel open");
            println!("migration advised (hint #{})", *hints.borrow());
        }
        () = tokio::time::sleep(Duration::from_secs(5)) => {
            println!("no migration hint within 5s");
        }
    }

    // Act on the advice the way a client's connection loop would.
    provider.on_disconnected();
    let target = provider.next(Duration::from_millis(250)).await?;
    provider.on_connected();
    println!("reconnected to {} ({} endpoints tracked)", target.endpoint(), provider.size());

    provider.stop();
    Ok(())
}
