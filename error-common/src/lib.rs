//! Common error handling for the clinical notes engine.
//!
//! Every external dependency of the pipeline (speech service, chat model,
//! terminology graph) is reached over the network, so failures fall into a
//! small, fixed taxonomy:
//!
//! - [`EngineError::Transport`] — the service could not be reached at all
//!   (connection refused, DNS, timeout).
//! - [`EngineError::Upstream`] — the service answered with a non-success
//!   status or an in-band error payload.
//! - [`EngineError::Schema`] — the response parsed as JSON but did not match
//!   the expected structure.
//! - [`EngineError::Config`] — a required credential or endpoint is missing.
//!   Checked eagerly, before any network call, and reports every missing
//!   field at once.
//!
//! Pipeline components catch `Transport`/`Upstream`/`Schema` at their own
//! boundary and convert them to a well-typed sentinel value; only `Config`
//! propagates to the caller.

pub mod types;

pub use types::*;
