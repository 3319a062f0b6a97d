//! Where tokens live on disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

const TOKEN_FILE: &str = "tokens.json";

/// The token file in the platform data directory.
///
/// The directory is created on first write by the token store.
pub fn default_token_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "quire").context("Could not determine data directory")?;
    Ok(dirs.data_dir().join(TOKEN_FILE))
}
