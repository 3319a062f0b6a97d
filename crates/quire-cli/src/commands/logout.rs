//! Logout command implementation.

use anyhow::{Context, Result};
use clap::Args;

use quire_http::AuthSession;

use crate::output;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub fn run(_args: LogoutArgs, session: AuthSession) -> Result<()> {
    session.logout().context("Failed to clear stored tokens")?;
    output::success("Logged out");
    Ok(())
}
