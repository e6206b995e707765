//! Walks one user through the gate: sign in, wait for confirmation, submit.
//!
//! Run against the in-memory backend:
//! `cargo run --example poll_until_confirmed`
//!
//! Run against a deployed backend:
//! `cargo run --example poll_until_confirmed -- --endpoint https://api.example.com/Prod`
//!
//! Set `RUST_LOG=optin_sdk=debug` to see every tick.

// Examples are allowed to use expect/unwrap for brevity
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use optin_sdk::{
    ClientConfig, FlowPhase, GateSession, Identity, MetricsFlowMetrics, Result, SessionIdentity,
    mock::MockBackend,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();

    let args: Vec<String> = std::env::args().collect();
    let endpoint = args
        .iter()
        .position(|a| a == "--endpoint")
        .and_then(|i| args.get(i + 1))
        .cloned();

    // -------------------------------------------------------------------------
    // 1. Build the session
    // -------------------------------------------------------------------------
    let identity = SessionIdentity::new();
    let gate = match &endpoint {
        Some(url) => {
            println!("Using backend at {url}");
            let config = ClientConfig::builder().base_url(url.as_str()).build()?;
            GateSession::connect(config, Arc::new(identity.clone()))?
        },
        None => {
            println!("Using in-memory backend (confirms on the third check)");
            let backend = Arc::new(MockBackend::new());
            backend.push_confirmations([false, false, true]);
            let config = ClientConfig::builder()
                .base_url("http://127.0.0.1:9")
                .poll_interval(Duration::from_millis(500))
                .build()?;
            GateSession::builder()
                .config(config)
                .identity(Arc::new(identity.clone()))
                .confirmations(backend.clone())
                .registrations(backend)
                .metrics(Arc::new(MetricsFlowMetrics))
                .build()
        },
    };
    gate.follow(identity.subscribe());

    // -------------------------------------------------------------------------
    // 2. Sign in and wait for confirmation
    // -------------------------------------------------------------------------
    identity.sign_in(
        Identity::builder().email("alice@example.com").given_name("Alice").family_name("Smith").build(),
    );

    let mut states = gate.subscribe();
    loop {
        let state = states.borrow_and_update().clone();
        println!("phase: {}", state.phase);
        if state.can_submit() {
            println!("Hello {}, your subscription is confirmed", state.greeting_name().unwrap_or(""));
            break;
        }
        if states.changed().await.is_err() {
            return Ok(());
        }
    }

    // -------------------------------------------------------------------------
    // 3. Submit
    // -------------------------------------------------------------------------
    let outcome = gate.submit("interested in the beta").await?;
    println!("submission: {outcome:?}");
    if gate.state().phase != FlowPhase::Submitted {
        println!("registration was not accepted; the user may retry");
    }

    gate.shutdown();
    Ok(())
}
