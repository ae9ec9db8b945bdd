use std::fmt;

use chrono::NaiveDate;
use common::logger::TraceId;
use corelib::models::FacilityId;

use crate::allocate::AllocationResult;
use crate::token::StopReason;

/// Lifecycle of the engine. Exactly one state is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Searching,
    Found,
    Confirming,
    AwaitingTransition,
    Done,
    TimedOut,
    Stopped,
    Error,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Done | PollState::TimedOut | PollState::Stopped | PollState::Error
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollState::Idle => "idle",
            PollState::Searching => "searching",
            PollState::Found => "found",
            PollState::Confirming => "confirming",
            PollState::AwaitingTransition => "awaiting_transition",
            PollState::Done => "done",
            PollState::TimedOut => "timed_out",
            PollState::Stopped => "stopped",
            PollState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Status signals for whoever is watching (CLI output, a UI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started {
        run_id: TraceId,
        target_date: NaiveDate,
    },
    StateChanged {
        run_id: TraceId,
        state: PollState,
    },
    SlotClaimed {
        run_id: TraceId,
        slot: String,
    },
    /// A recovered, phase-level failure.
    Warning {
        run_id: TraceId,
        message: String,
    },
    Allocated {
        run_id: TraceId,
        facilities: Vec<FacilityId>,
    },
    Stopped {
        run_id: TraceId,
        reason: StopReason,
    },
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: TraceId,
    pub state: PollState,
    pub reason: StopReason,
    /// Search attempts started (reloads + 1 when a slot was claimed).
    pub attempts: u64,
    /// Label of the time link that was clicked.
    pub slot: Option<String>,
    pub allocation: Option<AllocationResult>,
}
