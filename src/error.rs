//! Error types.
//!
//! The shared taxonomy lives in `braid-core` so both the library and the
//! CLI speak the same error language; this module re-exports it.

pub use braid_core::{BraidError, Result, ValidationError};
