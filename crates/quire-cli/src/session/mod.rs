//! Opening the stored session for a command.

pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use quire_core::ApiUrl;
use quire_file::FileTokenStore;
use quire_http::{AuthSession, HttpClient};

use crate::cli::GlobalArgs;

/// Build an [`AuthSession`] over the token file selected by `args`.
pub fn open(args: &GlobalArgs) -> Result<AuthSession> {
    let api_url = ApiUrl::new(&args.api_url).context("Invalid API URL")?;
    let path = match &args.token_file {
        Some(path) => path.clone(),
        None => storage::default_token_path()?,
    };

    tracing::debug!(path = %path.display(), api = %api_url, "Opening session");
    let store = FileTokenStore::new(&path);
    let session = AuthSession::init(HttpClient::new(api_url), Arc::new(store))
        .context("Failed to load stored tokens")?;

    Ok(session)
}

/// Fail early with a login hint when no tokens are stored.
pub fn require_login(session: &AuthSession) -> Result<()> {
    if session.is_authenticated() || session.can_refresh() {
        Ok(())
    } else {
        anyhow::bail!("Not logged in. Run 'quire login' first.")
    }
}
