//! Shared types for the user state layer.

pub mod errors;

pub use errors::{CacheError, UserError, UserResult};
