//! The coverage pipeline driver.
//!
//! One run selects sources, instruments them, writes shadow files, runs the
//! generate stage and then, only if generation succeeded, the test stage
//! with payload capture. The run is a single awaited sequence: `Done` is
//! reached only after the test stage's output has been fully merged.
//!
//! Nothing is retried and nothing is rolled back. Shadow files written
//! before a failure stay on disk for inspection.

mod state;

pub use state::PipelineState;

use crate::config::Config;
use crate::coverage::{CoverageMerger, InstrumentationData, MergeStats};
use crate::errors::PipelineError;
use crate::instrument::{Instrumenter, write_shadow_files};
use crate::select::FileSelector;
use crate::stage::{CaptureMode, StageCommand, StageOutcome, StageRunner};
use std::path::PathBuf;

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub instrumented: usize,
    pub passed_through: usize,
    pub shadow_files: Vec<PathBuf>,
    pub generate: StageOutcome,
    pub test: StageOutcome,
    pub data: InstrumentationData,
    pub stats: MergeStats,
}

pub struct Pipeline {
    selector: FileSelector,
    instrumenter: Box<dyn Instrumenter>,
    runner: StageRunner,
    generate: StageCommand,
    test: StageCommand,
    sentinel: String,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Pipeline {
    pub fn new(
        selector: FileSelector,
        instrumenter: Box<dyn Instrumenter>,
        runner: StageRunner,
        generate: StageCommand,
        test: StageCommand,
        sentinel: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            instrumenter,
            runner,
            generate,
            test,
            sentinel: sentinel.into(),
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn from_config(config: &Config, instrumenter: Box<dyn Instrumenter>) -> Self {
        Self::new(
            config.selector(),
            instrumenter,
            config.stage_runner(),
            config.generate.clone(),
            config.test.clone(),
            config.sentinel.clone(),
        )
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited by the most recent run, starting at `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Run the pipeline to a terminal state.
    pub async fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        if self.state != PipelineState::Idle {
            self.state = PipelineState::Idle;
            self.history = vec![PipelineState::Idle];
        }

        match self.execute().await {
            Ok(report) => {
                self.transition(PipelineState::Done);
                tracing::info!("done");
                Ok(report)
            }
            Err(e) => {
                let failed_in = self.state;
                self.transition(PipelineState::Failed);
                tracing::error!(state = %failed_in, error = %e, "error");
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<PipelineReport, PipelineError> {
        self.transition(PipelineState::Selecting);
        let selection = self.selector.select()?;
        tracing::info!(
            files = selection.total(),
            instrument = selection.instrument.len(),
            pass_through = selection.pass_through.len(),
            "Selected source files"
        );

        self.transition(PipelineState::Instrumenting);
        let instrumentation = self.instrumenter.instrument(&selection.instrument).await?;
        let shadow_files = write_shadow_files(&instrumentation.files, &selection.pass_through)?;
        tracing::info!(
            files = shadow_files.len(),
            sites = instrumentation.data.len(),
            "Wrote shadow files"
        );

        self.transition(PipelineState::GeneratingStage);
        let generate = self
            .runner
            .run(&self.generate, CaptureMode::ForwardOnly)
            .await?;

        self.transition(PipelineState::TestingStage);
        let mut merger = CoverageMerger::new(instrumentation.data, &self.sentinel);
        let test = self
            .runner
            .run(&self.test, CaptureMode::ForwardAndCapture(&mut merger))
            .await?;

        let stats = merger.stats();
        Ok(PipelineReport {
            instrumented: instrumentation.files.len(),
            passed_through: selection.pass_through.len(),
            shadow_files,
            generate,
            test,
            data: merger.into_data(),
            stats,
        })
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal pipeline transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
        self.history.push(next);
    }
}
