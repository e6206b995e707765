//! Core types for the email opt-in gate.
//!
//! This crate provides the runtime-free half of the gate:
//! - [`Identity`] snapshots reported by the identity provider
//! - The flow reducer ([`FlowInputs`], [`FlowEvent`]) and the derived [`FlowState`]
//! - Wire bodies for the confirmation and registration endpoints
//! - Client-side input validation

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod flow;
pub mod identity;
pub mod validation;
pub mod wire;

pub use flow::{
    ConfirmationStatus, FlowEvent, FlowInputs, FlowPhase, FlowState, SubmissionOutcome,
};
pub use identity::Identity;
pub use validation::{DEFAULT_MAX_MESSAGE_BYTES, ValidationError};
pub use wire::{
    ConfirmationQuery, ConfirmationResponse, ErrorBody, RegistrationAck, RegistrationRequest,
};
