use std::fmt;

/// Pipeline lifecycle.
///
/// ```text
/// Idle → Selecting → Instrumenting → GeneratingStage → TestingStage → Done
///            │             │                │                │
///            └─────────────┴────────────────┴────────────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Selecting,
    Instrumenting,
    GeneratingStage,
    TestingStage,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Selecting)
            | (Selecting, Instrumenting)
            | (Instrumenting, GeneratingStage)
            | (GeneratingStage, TestingStage)
            | (TestingStage, Done) => true,
            (from, Failed) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Selecting => "selecting",
            PipelineState::Instrumenting => "instrumenting",
            PipelineState::GeneratingStage => "generating",
            PipelineState::TestingStage => "testing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}
