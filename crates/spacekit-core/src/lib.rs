//! Pieces every spacekit crate needs: default values, `error_type` labels
//! and the stream helpers that sit under both ends of a tunnel.

pub mod defaults;
pub mod errors;
pub mod io;
pub mod signal;

pub use defaults::*;
pub use errors::*;

/// Crate version, reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
