//! Polling engine: repeatedly searches the calendar for a preferred slot,
//! reloading between attempts, until it claims one or the run ends.

mod engine;
mod run;
mod state;

#[cfg(test)]
mod tests;

pub use engine::{NextStep, PollingEngine};
pub use state::{EngineEvent, PollState, RunOutcome};
