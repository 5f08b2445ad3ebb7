//! `solcover clean`: remove shadow files left by earlier runs.

use anyhow::Result;
use solcover::config::ConfigOverrides;
use std::path::Path;

use super::super::Cli;

pub fn cmd_clean(cli: &Cli, project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;
    use solcover::instrument::{find_shadow_files, remove_shadow_files};
    use solcover::ui::print_clean_result;

    let config = super::load_config(cli, project_dir, ConfigOverrides::default())?;

    let mut shadows = Vec::new();
    for rule in &config.rules {
        if rule.root().is_dir() {
            shadows.extend(find_shadow_files(rule.root())?);
        }
    }

    if !shadows.is_empty() && !force {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete {} shadow file(s)?", shadows.len()))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Clean cancelled");
            return Ok(());
        }
    }

    remove_shadow_files(&shadows)?;
    print_clean_result(&config, &shadows);
    Ok(())
}
