use std::sync::Arc;

use corelib::models::FacilityId;
use corelib::models::facility::adjacent_pairs;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::AllocationResult;
use crate::config::EngineConfig;
use crate::error::{PageError, RunError};
use crate::page::{PageQuery, wait_for_present};

/// Claims facilities on the facility selection page.
///
/// Phases run in order until the quota is filled:
/// 1. preferred facilities that are enabled, in preference order;
/// 2. when exactly two are wanted and none is held yet, the first adjacent
///    pair that can be fully claimed, searching the groups of preferred
///    facilities first;
/// 3. any other enabled facility, in page order.
///
/// Only checkboxes verified as checked are reported.
pub struct ResourceAllocator<P: PageQuery> {
    page: Arc<P>,
    cfg: Arc<EngineConfig>,
}

impl<P: PageQuery> ResourceAllocator<P> {
    pub fn new(page: Arc<P>, cfg: Arc<EngineConfig>) -> Self {
        Self { page, cfg }
    }

    /// Never fails. A page error stops the remaining phases and whatever was
    /// verified so far is returned.
    #[instrument(skip_all, fields(quota = quota, preferred = preferred.len()))]
    pub async fn select(&self, preferred: &[FacilityId], quota: usize) -> AllocationResult {
        let mut result = AllocationResult::default();

        if let Err(e) = self.run_phases(preferred, quota, &mut result.claimed).await {
            warn!(error = %e, claimed = result.claimed.len(), "allocation cut short");
            result.aborted = Some(e.to_string());
        }

        info!(claimed = ?result.claimed, "allocation finished");
        result
    }

    async fn run_phases(
        &self,
        preferred: &[FacilityId],
        quota: usize,
        claimed: &mut Vec<FacilityId>,
    ) -> Result<(), RunError> {
        if quota == 0 {
            return Ok(());
        }

        let enabled = self.enabled_facilities().await?;
        if enabled.is_empty() {
            info!("no enabled facilities");
            return Ok(());
        }
        debug!(enabled = ?enabled, "enabled facilities");

        for id in preferred {
            if claimed.len() >= quota {
                return Ok(());
            }
            if enabled.contains(id) && !claimed.contains(id) && self.toggle(id, true).await? {
                claimed.push(id.clone());
            }
        }

        if quota == 2 && claimed.is_empty() {
            if let Some((a, b)) = self.claim_adjacent_pair(preferred, &enabled).await? {
                claimed.push(a);
                claimed.push(b);
                return Ok(());
            }
        }

        for id in &enabled {
            if claimed.len() >= quota {
                break;
            }
            if !claimed.contains(id) && self.toggle(id, true).await? {
                claimed.push(id.clone());
            }
        }

        Ok(())
    }

    /// Enabled checkbox ids in page order. A page that never shows any is
    /// treated as fully booked.
    async fn enabled_facilities(&self) -> Result<Vec<FacilityId>, RunError> {
        let selector = &self.cfg.site.enabled_checkbox;
        let found = wait_for_present(
            self.page.as_ref(),
            selector,
            self.cfg.checkbox_wait,
            self.cfg.poll_interval,
        )
        .await;

        let elements = match found {
            Ok(elements) => elements,
            Err(RunError::ElementNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids = Vec::with_capacity(elements.len());
        for element in &elements {
            match self.page.attribute(element, "id").await {
                Ok(Some(id)) if !id.is_empty() => ids.push(FacilityId::new(id)),
                Ok(_) | Err(PageError::StaleElement) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ids)
    }

    async fn claim_adjacent_pair(
        &self,
        preferred: &[FacilityId],
        enabled: &[FacilityId],
    ) -> Result<Option<(FacilityId, FacilityId)>, RunError> {
        for group in self.cfg.layout.search_order(preferred) {
            for (a, b) in adjacent_pairs(group) {
                if !enabled.contains(a) || !enabled.contains(b) {
                    continue;
                }
                if self.claim_pair(a, b).await? {
                    debug!(%a, %b, "adjacent pair claimed");
                    return Ok(Some((a.clone(), b.clone())));
                }
            }
        }
        Ok(None)
    }

    /// Both or neither: a half-claimed pair is rolled back.
    async fn claim_pair(&self, a: &FacilityId, b: &FacilityId) -> Result<bool, RunError> {
        if !self.toggle(a, true).await? {
            return Ok(false);
        }
        let second = self.toggle(b, true).await;
        if matches!(second, Ok(true)) {
            return Ok(true);
        }

        match self.toggle(a, false).await {
            Ok(true) => {}
            Ok(false) => warn!(facility = %a, "could not release half of a failed pair"),
            Err(e) => warn!(facility = %a, error = %e, "could not release half of a failed pair"),
        }
        second.map(|_| false)
    }

    /// Drives one checkbox to `want`. `Ok(false)` when it is gone, disabled
    /// or refuses to change.
    async fn toggle(&self, id: &FacilityId, want: bool) -> Result<bool, RunError> {
        match self.try_toggle(id, want).await {
            Err(RunError::Page(PageError::StaleElement)) => {
                debug!(facility = %id, "checkbox went stale");
                Ok(false)
            }
            other => other,
        }
    }

    async fn try_toggle(&self, id: &FacilityId, want: bool) -> Result<bool, RunError> {
        let page = self.page.as_ref();
        let site = &self.cfg.site;

        let Some(input) = page.find_first(&site.checkbox(id)).await? else {
            debug!(facility = %id, "checkbox vanished");
            return Ok(false);
        };
        if !page.is_enabled(&input).await? {
            debug!(facility = %id, "checkbox disabled");
            return Ok(false);
        }
        if page.is_checked(&input).await? == want {
            return Ok(true);
        }

        if let Some(label) = page.find_first(&site.label_for(id)).await? {
            page.click(&label).await?;
            sleep(self.cfg.click_settle).await;
            if page.is_checked(&input).await? == want {
                return Ok(true);
            }
        }

        page.click(&input).await?;
        sleep(self.cfg.click_settle).await;
        if page.is_checked(&input).await? == want {
            return Ok(true);
        }

        warn!(error = %RunError::ClickVerificationFailed(id.clone()), want, "checkbox click not verified");
        Ok(false)
    }
}
