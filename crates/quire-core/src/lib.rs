//! quire-core - Core types for the quire API transport.
//!
//! Holds the pieces shared by every other crate in the workspace: token and
//! credential newtypes, the [`TokenStore`] abstraction over durable key-value
//! storage, the validated [`ApiUrl`], and the unified [`Error`] type.

pub mod credentials;
pub mod error;
pub mod memory;
pub mod tokens;
pub mod traits;
pub mod types;

pub use credentials::Credentials;
pub use error::Error;
pub use memory::MemoryTokenStore;
pub use tokens::{AccessToken, RefreshToken, TokenPair};
pub use traits::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TokenStore};
pub use types::ApiUrl;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
