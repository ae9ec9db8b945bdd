use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no target date configured")]
    MissingTargetDate,

    #[error("at least one preferred time is required")]
    NoPreferredTimes,

    #[error("quota must be at least 1")]
    ZeroQuota,

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("invalid facility {0:?}")]
    InvalidFacility(String),

    #[error("facility layout must contain at least one non-empty group")]
    EmptyLayout,
}
