use std::time::Duration;

use corelib::models::FacilityLayout;

use crate::site::SiteSelectors;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Overall budget of one run. The only bound on the search loop and on
    /// the wait for the post-confirmation navigation.
    pub run_timeout: Duration,

    /// Interval between checks while waiting for an element or a load.
    pub poll_interval: Duration,

    /// How long to look for the confirmation dialog after picking a time.
    /// A missing dialog is not fatal; the run proceeds to wait for the
    /// navigation.
    pub confirm_wait: Duration,

    /// Pause after each checkbox click before re-reading its state.
    pub click_settle: Duration,

    /// How long the allocator waits for the first enabled checkbox.
    pub checkbox_wait: Duration,

    /// How long to wait for the "next" control after allocation.
    pub next_button_wait: Duration,

    pub site: SiteSelectors,

    pub layout: FacilityLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_millis(100),
            confirm_wait: Duration::from_secs(1),
            click_settle: Duration::from_millis(100),
            checkbox_wait: Duration::from_secs(15),
            next_button_wait: Duration::from_secs(15),
            site: SiteSelectors::default(),
            layout: FacilityLayout::default(),
        }
    }
}
