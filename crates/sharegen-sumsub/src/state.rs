//! Per-record outcome and run mode

use sharegen_core::TerminalOutcome;

/// What happened to one record in this run. Produced once, never overwritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Success { token: String, issuer_id: String },
    PermanentFailure { reason: String },
    /// Authentication failure; the run stops and the record stays unprocessed
    Aborted { reason: String },
}

impl ProcessingOutcome {
    /// Checkpoint form, `None` for [`Aborted`](Self::Aborted)
    pub fn terminal(&self) -> Option<TerminalOutcome> {
        match self {
            Self::Success { .. } => Some(TerminalOutcome::Success),
            Self::PermanentFailure { reason } => Some(TerminalOutcome::PermanentFailure {
                reason: reason.clone(),
            }),
            Self::Aborted { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// How a run treats prior progress and the network
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Skip records already terminal in the checkpoint
    pub resume: bool,
    /// Validate and plan only: no requests, no output, no checkpoint
    pub dry_run: bool,
}

impl RunMode {
    pub const FRESH: Self = Self {
        resume: false,
        dry_run: false,
    };

    pub const RESUME: Self = Self {
        resume: true,
        dry_run: false,
    };

    pub const DRY_RUN: Self = Self {
        resume: false,
        dry_run: true,
    };
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.dry_run, self.resume) {
            (true, true) => f.write_str("DRY-RUN (resume)"),
            (true, false) => f.write_str("DRY-RUN"),
            (false, true) => f.write_str("LIVE (resume)"),
            (false, false) => f.write_str("LIVE"),
        }
    }
}
