//! Facility allocation on the step after a slot was claimed.

mod allocator;
mod step;

use corelib::models::FacilityId;

pub use allocator::ResourceAllocator;
pub use step::FacilityStep;

/// What the allocator managed to claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationResult {
    /// Facilities verified as checked, in claim order. Never longer than the
    /// quota.
    pub claimed: Vec<FacilityId>,
    /// Set when a page failure cut the phases short.
    pub aborted: Option<String>,
    /// The "next" control was clicked after allocation.
    pub advanced: bool,
}

impl AllocationResult {
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// Fewer facilities than asked for.
    pub fn is_short(&self, quota: usize) -> bool {
        self.claimed.len() < quota
    }
}
