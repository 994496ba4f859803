//! Relay credential verification for spacekit.
//!
//! The service checks the username and API key a relay presents when it opens
//! its control channel. API keys are stored as salted SHA-256 hashes
//! (`<salt>$<hex digest>`), never in clear.
//!
//! # Example
//!
//! ```
//! use spacekit_auth::{AuthBackend, MemoryAuth, hash_api_key};
//!
//! # async fn example() -> Result<(), spacekit_auth::AuthError> {
//! let auth = MemoryAuth::from_hashed([("alice", hash_api_key("s3cret"))])?;
//! let result = auth.verify("alice", "s3cret").await?;
//! assert_eq!(result.username, "alice");
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod error;
mod hash;
mod memory;
mod reloadable;
mod result;
mod traits;

pub use error::AuthError;
pub use hash::{hash_api_key, hash_with_salt, is_valid_hash, verify_api_key};
pub use memory::MemoryAuth;
pub use reloadable::ReloadableAuth;
pub use result::AuthResult;
pub use traits::AuthBackend;
