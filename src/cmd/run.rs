//! `solcover run`: the full coverage pipeline.

use anyhow::{Context, Result};
use solcover::config::ConfigOverrides;
use std::path::{Path, PathBuf};

use super::super::Cli;

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    timeout: Option<u64>,
    output: Option<PathBuf>,
    instrumenter: Option<String>,
) -> Result<()> {
    use solcover::coverage::CoverageReport;
    use solcover::instrument::ExternalInstrumenter;
    use solcover::pipeline::Pipeline;
    use solcover::ui::print_report;

    let config = super::load_config(
        cli,
        project_dir,
        ConfigOverrides {
            stage_timeout_secs: timeout,
            output,
            instrumenter,
        },
    )?;

    let Some(command) = config.instrumenter.clone() else {
        anyhow::bail!(
            "No instrumenter configured. Set [instrumenter] command in .solcover/solcover.toml, \
             pass --instrumenter, or set SOLCOVER_INSTRUMENTER."
        );
    };
    tracing::debug!(instrumenter = %command, project = %config.project_dir.display(), "Starting coverage run");

    let instrumenter =
        ExternalInstrumenter::new(command, &config.project_dir, config.instrumenter_timeout);
    let mut pipeline = Pipeline::from_config(&config, Box::new(instrumenter));
    let report = pipeline.run().await.context("Coverage run failed")?;

    CoverageReport::new(report.data.clone()).save(&config.output)?;
    print_report(&report, Some(config.output.as_path()));
    Ok(())
}
