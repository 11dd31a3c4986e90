//! UI-agnostic core of the Helix outreach client.
//!
//! Everything here is independent of the terminal front-end: the data model,
//! the backend API client, and the controller that owns conversation state.

pub mod api;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod model;
pub mod provider;
pub mod session;

// Re-export main types for convenience
pub use api::{ApiClient, Backend, ExchangeEvent, ExchangeRequest};
pub use config::Config;
pub use controller::{Controller, SendRejected};
pub use diagnostics::DiagnosticTarget;
pub use error::ApiError;
pub use model::{Message, MessageKind, RawStep, Sequence, SequenceStep};
pub use provider::Provider;
pub use session::UserId;
