//! `solcover init`.

use anyhow::Result;
use std::path::Path;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use solcover::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized solcover at {}",
            result.solcover_dir.display()
        );
        println!();
        println!("Created:");
        println!("  .solcover/");
        println!("  └── solcover.toml   # Roots, skip lists, stage commands");
        println!();
        println!("Next steps:");
        println!("  1. Set [instrumenter] command in .solcover/solcover.toml");
        println!("  2. Run `solcover select` to check which files get instrumented");
        println!("  3. Run `solcover run` to collect coverage");
    } else {
        println!(
            "solcover already initialized at {}",
            result.config_file.display()
        );
    }

    Ok(())
}
