use std::sync::Arc;

use async_trait::async_trait;
use common::logger::{TraceId, run_span};
use corelib::models::ReservationRequest;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{Instrument, field, info};

use super::run::RunContext;
use super::state::{EngineEvent, PollState, RunOutcome};
use crate::allocate::AllocationResult;
use crate::config::EngineConfig;
use crate::page::PageQuery;
use crate::token::{self, StopReason, TokenWriter};

const EVENT_CAPACITY: usize = 256;

/// What happens once the page has moved on to the facility step.
#[async_trait]
pub trait NextStep: Send + Sync + 'static {
    async fn on_transition(&self, run_id: TraceId, request: &ReservationRequest) -> AllocationResult;
}

struct ActiveRun {
    run_id: TraceId,
    writer: TokenWriter,
    finished: watch::Receiver<Option<RunOutcome>>,
}

/// The current run, plus the window where `start` is still waiting for the
/// run it replaces. A stop in that window cancels the incoming run.
#[derive(Default)]
struct Slot {
    run: Option<ActiveRun>,
    starting: bool,
    stop_requested: bool,
}

/// Owns at most one run at a time and is the only writer of its token.
///
/// `start` while a run is active supersedes it: the old run is told to stop
/// and is awaited before the new token is armed, so two runs never touch the
/// page concurrently.
pub struct PollingEngine<P: PageQuery> {
    page: Arc<P>,
    cfg: Arc<EngineConfig>,
    next_step: Option<Arc<dyn NextStep>>,
    state: Arc<watch::Sender<PollState>>,
    events: broadcast::Sender<EngineEvent>,
    active: Mutex<Slot>,
    start_lock: tokio::sync::Mutex<()>,
}

impl<P: PageQuery> PollingEngine<P> {
    pub fn new(page: Arc<P>, cfg: EngineConfig) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            page,
            cfg: Arc::new(cfg),
            next_step: None,
            state: Arc::new(state),
            events,
            active: Mutex::new(Slot::default()),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_next_step(mut self, step: Arc<dyn NextStep>) -> Self {
        self.next_step = Some(step);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// True while a run is in flight or about to start.
    pub fn is_running(&self) -> bool {
        let slot = self.active.lock();
        slot.starting
            || slot
                .run
                .as_ref()
                .is_some_and(|run| run.finished.borrow().is_none())
    }

    /// Arms a fresh token and starts searching in a background task.
    pub async fn start(&self, request: ReservationRequest) -> TraceId {
        let _serial = self.start_lock.lock().await;

        let prior = {
            let mut slot = self.active.lock();
            slot.starting = true;
            slot.stop_requested = false;
            slot.run.take()
        };
        if let Some(prior) = prior {
            if prior.writer.expire(StopReason::Superseded) {
                info!(prior_run = %prior.run_id, "superseding active run");
            }
            wait_finished(prior.finished).await;
        }

        let run_id = TraceId::new();
        let (writer, token) = token::arm(run_id, self.cfg.run_timeout);
        let (done_tx, done_rx) = watch::channel(None);

        let span = run_span("reservation", &run_id);
        span.record("target_date", field::display(request.date_key()));

        let ctx = RunContext::new(
            Arc::clone(&self.page),
            Arc::clone(&self.cfg),
            self.next_step.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
            writer.clone(),
            token,
            request,
        );

        {
            let mut slot = self.active.lock();
            slot.starting = false;
            if std::mem::take(&mut slot.stop_requested) && writer.expire(StopReason::Requested) {
                info!(%run_id, "stop arrived before the run began");
            }
            slot.run = Some(ActiveRun {
                run_id,
                writer,
                finished: done_rx,
            });
        }

        tokio::spawn(
            async move {
                let outcome = ctx.run().await;
                let _ = done_tx.send(Some(outcome));
            }
            .instrument(span),
        );

        run_id
    }

    /// Ends the active run with reason `stopped`. Returns false when there
    /// was nothing to stop.
    pub fn stop(&self) -> bool {
        let mut slot = self.active.lock();
        if slot.starting {
            info!("stop requested while a run is starting");
            slot.stop_requested = true;
            return true;
        }
        match slot.run.as_ref() {
            Some(run) if run.writer.expire(StopReason::Requested) => {
                info!(run_id = %run.run_id, "stop requested");
                true
            }
            _ => false,
        }
    }

    /// Waits for the current run to finish and returns its outcome.
    pub async fn wait(&self) -> Option<RunOutcome> {
        let finished = self.active.lock().run.as_ref().map(|run| run.finished.clone());
        match finished {
            Some(rx) => wait_finished(rx).await,
            None => None,
        }
    }
}

async fn wait_finished(mut rx: watch::Receiver<Option<RunOutcome>>) -> Option<RunOutcome> {
    // Err means the run task went away without reporting (it panicked).
    rx.wait_for(Option::is_some).await.ok().and_then(|outcome| outcome.clone())
}
