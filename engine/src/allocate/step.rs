use std::sync::Arc;

use async_trait::async_trait;
use common::logger::{TraceId, step_span};
use corelib::models::ReservationRequest;
use tracing::{Instrument, info, warn};

use super::{AllocationResult, ResourceAllocator};
use crate::config::EngineConfig;
use crate::error::RunError;
use crate::page::{PageQuery, wait_for_visible};
use crate::poll::NextStep;

/// Hand-off run once the facility page is up: claim facilities, then press
/// "next" if anything was claimed. A short allocation still moves on.
pub struct FacilityStep<P: PageQuery> {
    page: Arc<P>,
    cfg: Arc<EngineConfig>,
    allocator: ResourceAllocator<P>,
}

impl<P: PageQuery> FacilityStep<P> {
    pub fn new(page: Arc<P>, cfg: EngineConfig) -> Self {
        let cfg = Arc::new(cfg);
        Self {
            allocator: ResourceAllocator::new(Arc::clone(&page), Arc::clone(&cfg)),
            page,
            cfg,
        }
    }

    async fn advance(&self) -> Result<(), RunError> {
        let next = wait_for_visible(
            self.page.as_ref(),
            &self.cfg.site.next_button,
            self.cfg.next_button_wait,
            self.cfg.poll_interval,
        )
        .await?;
        self.page.click(&next).await?;
        Ok(())
    }
}

#[async_trait]
impl<P: PageQuery> NextStep for FacilityStep<P> {
    async fn on_transition(&self, run_id: TraceId, request: &ReservationRequest) -> AllocationResult {
        let quota = request.quota();

        async move {
            let mut result = self
                .allocator
                .select(request.preferred_facilities(), quota)
                .await;

            if result.is_empty() {
                warn!("no facility could be claimed; leaving the page as is");
                return result;
            }
            if result.is_short(quota) {
                warn!(claimed = result.len(), quota, "fewer facilities than requested");
            }

            match self.advance().await {
                Ok(()) => {
                    info!(%run_id, claimed = ?result.claimed, "facilities submitted");
                    result.advanced = true;
                }
                Err(e) => warn!(error = %e, "could not press next"),
            }
            result
        }
        .instrument(step_span("facility_step"))
        .await
    }
}
