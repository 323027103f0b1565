//! Failover walkthrough: cycling candidates, spin delay, and the migration
//! decision on a membership change.
//!
//! Run: `cargo run --example failover`
//!
//! No real servers are contacted; the connection attempt is simulated so the
//! provider's behavior is visible on its own.

// Examples are allowed to use expect/unwrap for brevity
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use ensemble_hosts::{DEFAULT_PORT, EndpointSet, HostProvider, StaticHostProvider};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ensemble_hosts::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Shutdown token owned by this process; cancelling it interrupts any
    // in-flight spin-delay wait inside next().
    let shutdown = CancellationToken::new();

    let servers = EndpointSet::parse_list("10.0.0.1:2181,10.0.0.2:2181,10.0.0.3:2181", DEFAULT_PORT)?;
    let provider = StaticHostProvider::new(servers).with_cancellation(shutdown.clone());
    println!("provider tracks {} endpoints", provider.size());

    // -------------------------------------------------------------------------
    // 1. Walk the permutation: two simulated failures, then a success
    // -------------------------------------------------------------------------
    let spin_delay = Duration::from_millis(250);
    for attempt in 1..=3 {
        let target = provider.next(spin_delay).await?;
        let connected = attempt == 3; // first two attempts "fail"
        println!("attempt {attempt}: trying {} -> {}", target.endpoint(), if connected {
            "connected"
        } else {
            "failed"
        });
        if connected {
            provider.on_connected();
        }
    }

    // -------------------------------------------------------------------------
    // 2. Membership grows from 3 to 5: migration is probabilistic (p = 0.4)
    // -------------------------------------------------------------------------
    let current = provider.current().expect("connected above");
    let grown = EndpointSet::parse_list(
        "10.0.0.1:2181,10.0.0.2:2181,10.0.0.3:2181,10.0.0.4:2181,10.0.0.5:2181",
        DEFAULT_PORT,
    )?;
    let migrate = provider.update_server_list(grown, Some(&current));
    println!(
        "ensemble grew to {}; migration probability {:.1}, this client drew: {migrate}",
        provider.size(),
        ensemble_hosts::migration_probability(3, 5),
    );

    // -------------------------------------------------------------------------
    // 3. Current endpoint removed: migration is forced
    // -------------------------------------------------------------------------
    let shrunk = EndpointSet::parse_list("10.0.0.4:2181,10.0.0.5:2181", DEFAULT_PORT)?;
    let migrate = provider.update_server_list(shrunk, Some(&current));
    println!("{current} left the ensemble; migration forced: {migrate}");

    if migrate {
        provider.on_disconnected();
        let target = provider.next(spin_delay).await?;
        println!("reconnecting via {}", target.endpoint());
        provider.on_connected();
    }

    shutdown.cancel();
    Ok(())
}
