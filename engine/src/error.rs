use corelib::models::FacilityId;
use thiserror::Error;

use crate::token::StopReason;

/// Failures reported by the page capability itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("element is no longer attached to the page")]
    StaleElement,

    #[error("page driver error: {0}")]
    Driver(String),
}

/// Everything that can end or degrade a run.
///
/// `ElementNotFound` and `ClickVerificationFailed` are recovered where they
/// occur. `Timeout` and `Stopped` end the run. Any other page failure during
/// a search attempt ends the run as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("{selector} not visible within {timeout_ms}ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },

    #[error("run deadline exceeded")]
    Timeout,

    #[error("run stopped ({0})")]
    Stopped(StopReason),

    #[error("page never reached {marker}")]
    TransitionFailed { marker: String },

    #[error("checkbox {0} did not toggle after label and input clicks")]
    ClickVerificationFailed(FacilityId),

    #[error("current page {0} is outside the booking site")]
    WrongSite(String),

    #[error(transparent)]
    Page(#[from] PageError),
}

impl From<StopReason> for RunError {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Timeout => RunError::Timeout,
            other => RunError::Stopped(other),
        }
    }
}
