//! Helpers shared across the runtime.
pub mod hash;
