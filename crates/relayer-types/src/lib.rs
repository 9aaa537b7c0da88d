//! Shared types for the meta-transaction relay engine.
//!
//! This crate holds the wire-level request types, the request lifecycle
//! model, ledger transaction payloads, relay events, and the configuration
//! schema machinery used by boundary implementations. Everything here is
//! plain data; behavior lives in the component crates.

pub mod events;
pub mod outcome;
pub mod request;
pub mod serde_helpers;
pub mod transaction;
pub mod validation;

pub use events::*;
pub use outcome::*;
pub use request::*;
pub use transaction::*;
pub use validation::*;
