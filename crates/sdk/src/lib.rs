//! Client runtime for the email opt-in gate.
//!
//! A signed-in user must confirm an email subscription before they may submit
//! a registration message. This crate polls the backend until the
//! subscription is confirmed, then lets the user submit, and exposes a single
//! view-state the UI can render.
//!
//! # Features
//!
//! - **Confirmation polling**: fixed-interval checks that stop on confirmation,
//!   sign-out or shutdown, with no overlapping requests
//! - **Single-flight submission**: at most one registration call at a time
//! - **One source of truth**: every change goes through a pure reducer and is
//!   published on a watch channel
//! - **Pluggable backends**: HTTP via `reqwest`, or the in-memory [`mock`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use optin_sdk::{ClientConfig, GateSession, SessionIdentity};
//! use optin_types::Identity;
//!
//! # async fn run() -> optin_sdk::Result<()> {
//! let config = ClientConfig::builder()
//!     .base_url("https://api.example.com/Prod")
//!     .build()?;
//!
//! let identity = SessionIdentity::new();
//! let gate = GateSession::connect(config, Arc::new(identity.clone()))?;
//! gate.follow(identity.subscribe());
//!
//! identity.sign_in(Identity::with_email("a@x.com"));
//!
//! let mut states = gate.subscribe();
//! while !states.borrow_and_update().can_submit() {
//!     states.changed().await.ok();
//! }
//! gate.submit("interested in X").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GateSession (Public API)                 │
//! │  .follow() │ .identity_changed() │ .submit() │ .subscribe() │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │     ConfirmationPoller       │    RegistrationSubmitter     │
//! │  interval │ cancel │ stats   │  validate │ single-flight    │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                      FlowStateStore                         │
//! │   FlowInputs reducer │ derived FlowState │ watch channel    │
//! ├─────────────────────────────────────────────────────────────┤
//! │   IdentityFacade   │   ConfirmationClient/RegistrationClient │
//! │   SessionIdentity  │   HttpBackend (reqwest) │ MockBackend   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod identity;
mod metrics;
pub mod mock;
mod poller;
mod session;
mod store;
mod submitter;

// Public API exports
pub use backend::{ConfirmationClient, HttpBackend, RegistrationClient};
pub use config::{ClientConfig, DEFAULT_POLL_INTERVAL};
pub use error::{Result, SdkError};
pub use identity::{IdentityFacade, SessionIdentity, read_identity};
pub use metrics::{FlowMetrics, MetricsFlowMetrics, NoopFlowMetrics, PollResult};
pub use poller::{ConfirmationPoller, PollerStats, TickOutcome};
pub use session::GateSession;
pub use store::FlowStateStore;
pub use submitter::{CANCELLED_MESSAGE, RegistrationSubmitter};

// Re-export commonly used types from optin-types
pub use optin_types::{
    ConfirmationStatus, FlowEvent, FlowPhase, FlowState, Identity, SubmissionOutcome,
};
