//! Cartograph input safety layer.
//!
//! Provides:
//! - **Validator**: structural, length, step-schema, injection-pattern and
//!   control-character checks applied before any procedure reaches the
//!   prompt builder
//! - **Sanitisers**: idempotent text normalisation applied after validation,
//!   before prompt embedding

pub mod sanitize;
pub mod validate;

pub use sanitize::{sanitize_description, sanitize_name, sanitize_steps};
pub use validate::{ProcedureInput, ValidationError, Validator};
