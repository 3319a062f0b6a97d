//! Command implementations.

pub mod generate;
pub mod login;
pub mod logout;
pub mod refresh_token;
pub mod request;
pub mod whoami;
