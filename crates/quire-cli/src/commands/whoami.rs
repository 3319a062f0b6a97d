//! Whoami command implementation.

use anyhow::{Context, Result};
use clap::Args;

use quire_http::{AuthSession, AuthenticatedTransport};

use crate::output;
use crate::session::require_login;

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Print the user record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WhoamiArgs, session: AuthSession) -> Result<()> {
    require_login(&session)?;

    let transport = AuthenticatedTransport::new(session);
    let user = transport
        .current_user()
        .await
        .context("Failed to fetch current user")?;

    if args.json {
        output::json(&user)
    } else {
        output::user(&user);
        Ok(())
    }
}
