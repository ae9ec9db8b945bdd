//! Reservation engine: the polling state machine that races for a calendar
//! slot, and the allocator that claims facilities once the slot is held.
//!
//! Everything talks to the booking page through the [`page::PageQuery`]
//! capability; no module here knows how elements are actually located.

pub mod allocate;
pub mod config;
pub mod error;
pub mod page;
pub mod poll;
pub mod site;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use allocate::{AllocationResult, FacilityStep, ResourceAllocator};
pub use config::EngineConfig;
pub use error::{PageError, RunError};
pub use page::{ElementRef, LoadStatus, PageQuery};
pub use poll::{EngineEvent, NextStep, PollState, PollingEngine, RunOutcome};
pub use site::SiteSelectors;
pub use token::{RunToken, StopReason};
