//! `solcover select`: dry run of source selection.

use anyhow::Result;
use solcover::config::ConfigOverrides;
use std::path::Path;

use super::super::Cli;

pub fn cmd_select(cli: &Cli, project_dir: &Path) -> Result<()> {
    use solcover::ui::print_selection;

    let config = super::load_config(cli, project_dir, ConfigOverrides::default())?;
    let selection = config.selector().select()?;
    print_selection(&config, &selection);
    Ok(())
}
