//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `project` | `Init`           |
//! | `run`     | `Run`            |
//! | `select`  | `Select`         |
//! | `clean`   | `Clean`          |

pub mod clean;
pub mod project;
pub mod run;
pub mod select;

pub use clean::cmd_clean;
pub use project::cmd_init;
pub use run::cmd_run;
pub use select::cmd_select;

use anyhow::Result;
use solcover::config::{Config, ConfigOverrides};
use std::path::Path;

use super::Cli;

fn load_config(cli: &Cli, project_dir: &Path, overrides: ConfigOverrides) -> Result<Config> {
    Config::load(project_dir, cli.config.as_deref(), overrides)
}
