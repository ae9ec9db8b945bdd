use std::sync::Arc;
use std::time::Duration;

use common::logger::warn_if_slow;
use corelib::models::ReservationRequest;
use tokio::sync::{broadcast, watch};
use tracing::{Span, debug, error, info, trace, warn};

use super::engine::NextStep;
use super::state::{EngineEvent, PollState, RunOutcome};
use crate::config::EngineConfig;
use crate::error::RunError;
use crate::page::{PageQuery, wait_for_load, wait_for_visible};
use crate::token::{RunToken, StopReason, TokenWriter};

/// Reloads slower than this are logged; they eat into the run budget.
const SLOW_RELOAD: Duration = Duration::from_secs(3);

/// State of one run. Lives inside the spawned run task.
pub(super) struct RunContext<P: PageQuery> {
    page: Arc<P>,
    cfg: Arc<EngineConfig>,
    next_step: Option<Arc<dyn NextStep>>,
    state: Arc<watch::Sender<PollState>>,
    events: broadcast::Sender<EngineEvent>,
    writer: TokenWriter,
    token: RunToken,
    request: ReservationRequest,
    attempts: u64,
    slot: Option<String>,
}

impl<P: PageQuery> RunContext<P> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        page: Arc<P>,
        cfg: Arc<EngineConfig>,
        next_step: Option<Arc<dyn NextStep>>,
        state: Arc<watch::Sender<PollState>>,
        events: broadcast::Sender<EngineEvent>,
        writer: TokenWriter,
        token: RunToken,
        request: ReservationRequest,
    ) -> Self {
        Self {
            page,
            cfg,
            next_step,
            state,
            events,
            writer,
            token,
            request,
            attempts: 0,
            slot: None,
        }
    }

    pub(super) async fn run(mut self) -> RunOutcome {
        let run_id = self.token.run_id();

        info!(
            target_date = %self.request.date_key(),
            times = ?self.request.preferred_times(),
            timeout_ms = self.cfg.run_timeout.as_millis() as u64,
            "reservation run started"
        );
        self.emit(EngineEvent::Started {
            run_id,
            target_date: self.request.target_date(),
        });

        let (state, reason) = match self.drive().await {
            Ok(()) => (PollState::Done, StopReason::Completed),
            Err(RunError::Timeout) => (PollState::TimedOut, StopReason::Timeout),
            Err(RunError::Stopped(reason)) => (PollState::Stopped, reason),
            Err(e) => {
                error!(error = %e, attempts = self.attempts, "run abandoned after page failure");
                (PollState::Error, StopReason::Error(e.to_string()))
            }
        };

        // Clears the token before anything else happens on the page.
        self.writer.expire(reason.clone());
        self.set_state(state);

        let allocation = match (&self.next_step, state) {
            (Some(step), PollState::Done) => {
                let result = step.on_transition(run_id, &self.request).await;
                self.emit(EngineEvent::Allocated {
                    run_id,
                    facilities: result.claimed.clone(),
                });
                Some(result)
            }
            _ => None,
        };

        info!(%reason, %state, attempts = self.attempts, slot = ?self.slot, "reservation run finished");
        self.emit(EngineEvent::Stopped {
            run_id,
            reason: reason.clone(),
        });

        RunOutcome {
            run_id,
            state,
            reason,
            attempts: self.attempts,
            slot: self.slot.take(),
            allocation,
        }
    }

    async fn drive(&mut self) -> Result<(), RunError> {
        if let Some(reason) = self.token.reason() {
            return Err(reason.into());
        }
        self.ensure_on_site().await?;

        let slot = self.search().await?;
        info!(%slot, attempts = self.attempts, "preferred slot clicked");
        self.set_state(PollState::Found);
        self.emit(EngineEvent::SlotClaimed {
            run_id: self.token.run_id(),
            slot: slot.clone(),
        });
        self.slot = Some(slot);

        self.confirm().await?;
        self.await_transition().await
    }

    async fn ensure_on_site(&self) -> Result<(), RunError> {
        if self.cfg.site.site_prefix.is_none() {
            return Ok(());
        }
        let status = self.page.load_status().await?;
        if !self.cfg.site.allows(&status.url) {
            return Err(RunError::WrongSite(status.url));
        }
        Ok(())
    }

    /// Search, reload, repeat. Liveness is checked before any work of an
    /// attempt; an attempt that got past the check runs to the end.
    async fn search(&mut self) -> Result<String, RunError> {
        loop {
            if let Some(reason) = self.token.reason() {
                return Err(reason.into());
            }

            self.attempts += 1;
            Span::current().record("attempt", self.attempts);
            self.set_state(PollState::Searching);

            if let Some(slot) = self.attempt().await? {
                return Ok(slot);
            }

            debug!(attempt = self.attempts, "no preferred time open; reloading");
            self.reload().await?;
        }
    }

    /// One pass over the current page. Clicks the first preferred time that
    /// is open on the target date; preference order decides, not page order.
    async fn attempt(&self) -> Result<Option<String>, RunError> {
        let site = &self.cfg.site;

        let Some(cell) = self.page.find_first(&site.day_cell(&self.request.date_key())).await? else {
            trace!("target date not open");
            return Ok(None);
        };

        let links = self.page.find_within(&cell, &site.time_link).await?;
        let mut labels = Vec::with_capacity(links.len());
        for link in &links {
            labels.push(self.page.text(link).await?);
        }

        for time in self.request.preferred_times() {
            if let Some(idx) = labels.iter().position(|label| label.contains(time.as_str())) {
                self.page.click(&links[idx]).await?;
                return Ok(Some(labels[idx].trim().to_string()));
            }
        }

        trace!(open = ?labels, "no preferred time among open slots");
        Ok(None)
    }

    async fn reload(&self) -> Result<(), RunError> {
        let poll = self.cfg.poll_interval;
        let reloaded = self
            .token
            .guard(warn_if_slow("reload", SLOW_RELOAD, async {
                self.page.reload().await?;
                wait_for_load(self.page.as_ref(), poll, |_| true).await
            }))
            .await;

        match reloaded {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(reason) => Err(reason.into()),
        }
    }

    async fn confirm(&self) -> Result<(), RunError> {
        self.set_state(PollState::Confirming);
        let site = &self.cfg.site;

        let layer = self
            .token
            .guard(wait_for_visible(
                self.page.as_ref(),
                &site.confirm_layer,
                self.cfg.confirm_wait,
                self.cfg.poll_interval,
            ))
            .await
            .map_err(RunError::from)?;

        match layer {
            Ok(layer) => {
                let button = self.page.find_within(&layer, &site.confirm_button).await?;
                match button.first() {
                    Some(button) => {
                        self.page.click(button).await?;
                        info!("confirmation accepted");
                    }
                    None => self.warn(format!(
                        "confirmation dialog has no {} control",
                        site.confirm_button
                    )),
                }
                Ok(())
            }
            Err(e @ RunError::ElementNotFound { .. }) => {
                self.warn(format!("{e}; waiting for navigation anyway"));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Waits for the facility step with no bound besides the run deadline.
    async fn await_transition(&self) -> Result<(), RunError> {
        self.set_state(PollState::AwaitingTransition);
        let marker = self.cfg.site.transition_marker.as_str();

        let arrived = self
            .token
            .guard(wait_for_load(self.page.as_ref(), self.cfg.poll_interval, |url| {
                url.contains(marker)
            }))
            .await;

        match arrived {
            Ok(Ok(status)) => {
                info!(url = %status.url, "facility selection page loaded");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(StopReason::Timeout) => {
                self.warn(
                    RunError::TransitionFailed {
                        marker: marker.to_string(),
                    }
                    .to_string(),
                );
                Err(RunError::Timeout)
            }
            Err(reason) => Err(reason.into()),
        }
    }

    fn set_state(&self, next: PollState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = %next, "state changed");
            self.emit(EngineEvent::StateChanged {
                run_id: self.token.run_id(),
                state: next,
            });
        }
    }

    fn warn(&self, message: String) {
        warn!(%message, "run degraded");
        self.emit(EngineEvent::Warning {
            run_id: self.token.run_id(),
            message,
        });
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
