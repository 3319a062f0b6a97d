//! Core traits.

mod store;

pub use store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TokenStore};
