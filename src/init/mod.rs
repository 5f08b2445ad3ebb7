//! `solcover init`: create the `.solcover/` directory.
//!
//! ```text
//! .solcover/
//! └── solcover.toml    # Roots, skip lists, stage commands
//! ```
//!
//! Coverage data from `solcover run` is written into the same directory by
//! default.

use crate::config::{SOLCOVER_DIR, SolcoverToml, default_config_path};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct InitResult {
    pub solcover_dir: PathBuf,
    pub config_file: PathBuf,
    /// False if a config file was already present and left untouched.
    pub created: bool,
}

/// Initialize solcover in `project_dir`, writing a default config file
/// unless one exists.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let solcover_dir = get_solcover_dir(project_dir);
    std::fs::create_dir_all(&solcover_dir)
        .with_context(|| format!("Failed to create directory: {}", solcover_dir.display()))?;

    let config_file = default_config_path(project_dir);
    let created = if config_file.exists() {
        false
    } else {
        SolcoverToml::default().save(&config_file)?;
        true
    };

    Ok(InitResult {
        solcover_dir,
        config_file,
        created,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    default_config_path(project_dir).exists()
}

pub fn get_solcover_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(SOLCOVER_DIR)
}
