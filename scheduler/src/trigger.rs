//! Decides when the engine runs.
//!
//! Either immediately (`runNow`) or once per request at the next occurrence
//! of the configured wall-clock time (`schedule`). The alarm goes off a short
//! lead before that time so the first attempt is already in flight when the
//! calendar opens. At most one alarm is pending, and a run that times out
//! takes the pending alarm and the saved schedule down with it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use corelib::models::StoredConfig;
use corelib::models::schedule::{alarm_time, next_execution_time};
use common::logger::TraceId;
use engine::{PageQuery, PollState, PollingEngine};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::message::{TriggerMessage, TriggerReply};
use crate::store::ConfigStore;

pub const DEFAULT_LEAD: Duration = Duration::from_secs(2);

struct Alarm {
    at: DateTime<Local>,
    handle: JoinHandle<()>,
}

type AlarmSlot = Arc<Mutex<Option<Alarm>>>;

pub struct TriggerSource<P: PageQuery, S: ConfigStore> {
    engine: Arc<PollingEngine<P>>,
    store: Arc<S>,
    lead: Duration,
    alarm: AlarmSlot,
}

impl<P: PageQuery, S: ConfigStore> TriggerSource<P, S> {
    pub fn new(engine: Arc<PollingEngine<P>>, store: Arc<S>) -> Self {
        Self {
            engine,
            store,
            lead: DEFAULT_LEAD,
            alarm: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_lead(mut self, lead: Duration) -> Self {
        self.lead = lead;
        self
    }

    pub fn engine(&self) -> &Arc<PollingEngine<P>> {
        &self.engine
    }

    /// The run instant the pending alarm is for, if one is armed.
    pub fn pending(&self) -> Option<DateTime<Local>> {
        self.alarm
            .lock()
            .as_ref()
            .filter(|alarm| !alarm.handle.is_finished())
            .map(|alarm| alarm.at)
    }

    pub async fn handle(&self, msg: TriggerMessage) -> anyhow::Result<TriggerReply> {
        self.handle_at(msg, Local::now()).await
    }

    /// Like [`TriggerSource::handle`] with an explicit "now".
    pub async fn handle_at(
        &self,
        msg: TriggerMessage,
        now: DateTime<Local>,
    ) -> anyhow::Result<TriggerReply> {
        match msg {
            TriggerMessage::RunNow { config } => {
                let config = StoredConfig::try_from(config).context("invalid settings")?;
                self.run_now(config).await
            }
            TriggerMessage::Schedule { config } => {
                let config = StoredConfig::try_from(config).context("invalid settings")?;
                self.schedule(config, now).await
            }
            TriggerMessage::Stop => self.stop().await,
        }
    }

    async fn run_now(&self, mut config: StoredConfig) -> anyhow::Result<TriggerReply> {
        let request = config.to_request().context("cannot start a run")?;

        self.cancel_alarm();
        config.scheduled_execution_time = None;
        self.store.save(&config).await?;

        let run_id = self.engine.start(request).await;
        watch_for_timeout(
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            Arc::clone(&self.alarm),
            run_id,
        );
        Ok(TriggerReply::Started { run_id })
    }

    async fn schedule(
        &self,
        mut config: StoredConfig,
        now: DateTime<Local>,
    ) -> anyhow::Result<TriggerReply> {
        let execution_time = config
            .execution_time
            .context("an execution time (HH:MM) is required to schedule")?;
        // Fail now rather than when the alarm fires.
        config.to_request().context("cannot schedule a run")?;

        let target = next_execution_time(execution_time, &now);
        config.scheduled_execution_time = Some(target.timestamp_millis());
        self.store.save(&config).await?;

        self.arm(target, now);
        Ok(TriggerReply::Scheduled { at: target })
    }

    async fn stop(&self) -> anyhow::Result<TriggerReply> {
        self.cancel_alarm();
        self.store.clear_schedule().await?;
        let was_running = self.engine.stop();
        Ok(TriggerReply::Stopped { was_running })
    }

    /// Re-arms a schedule saved by an earlier process. A saved instant that
    /// already passed is dropped.
    pub async fn resume(&self) -> anyhow::Result<Option<DateTime<Local>>> {
        self.resume_at(Local::now()).await
    }

    pub async fn resume_at(&self, now: DateTime<Local>) -> anyhow::Result<Option<DateTime<Local>>> {
        let config = self.store.load().await?;
        let Some(ms) = config.scheduled_execution_time else {
            return Ok(None);
        };

        match Local.timestamp_millis_opt(ms).single() {
            Some(target) if target > now => {
                self.arm(target, now);
                Ok(Some(target))
            }
            _ => {
                warn!(scheduled_ms = ms, "saved schedule already passed; dropping it");
                self.store.clear_schedule().await?;
                Ok(None)
            }
        }
    }

    fn arm(&self, target: DateTime<Local>, now: DateTime<Local>) {
        let lead = TimeDelta::from_std(self.lead).unwrap_or(TimeDelta::zero());
        let delay = (alarm_time(&target, lead) - now)
            .to_std()
            .unwrap_or(Duration::ZERO);

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let slot = Arc::clone(&self.alarm);
        let span = info_span!("alarm", at = %target.format("%Y-%m-%d %H:%M"));

        let handle = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                fire(engine, store, slot).await;
            }
            .instrument(span),
        );

        let prior = self.alarm.lock().replace(Alarm { at: target, handle });
        if let Some(prior) = prior {
            prior.handle.abort();
            info!(replaced = %prior.at, "pending alarm replaced");
        }
        info!(%target, delay_ms = delay.as_millis() as u64, "alarm armed");
    }

    fn cancel_alarm(&self) {
        cancel(&self.alarm);
    }
}

fn cancel(slot: &Mutex<Option<Alarm>>) {
    if let Some(alarm) = slot.lock().take() {
        alarm.handle.abort();
        info!(at = %alarm.at, "alarm cancelled");
    }
}

impl<P: PageQuery, S: ConfigStore> Drop for TriggerSource<P, S> {
    fn drop(&mut self) {
        if let Some(alarm) = self.alarm.lock().take() {
            alarm.handle.abort();
        }
    }
}

/// Reads the settings as they are now, not as they were when armed.
async fn fire<P: PageQuery, S: ConfigStore>(
    engine: Arc<PollingEngine<P>>,
    store: Arc<S>,
    slot: AlarmSlot,
) {
    info!("alarm fired");

    match store.load().await {
        Ok(config) if config.target_date.is_some() => match config.to_request() {
            Ok(request) => {
                let run_id = engine.start(request).await;
                watch_for_timeout(Arc::clone(&engine), Arc::clone(&store), slot, run_id);
            }
            Err(e) => error!(error = %e, "saved settings are not runnable"),
        },
        Ok(_) => warn!("no target date saved; nothing to run"),
        Err(e) => error!(error = ?e, "could not load settings"),
    }

    if let Err(e) = store.clear_schedule().await {
        error!(error = ?e, "could not clear the fired schedule");
    }
}

/// When `run_id` ends by running out of time, any pending alarm is cancelled
/// and the saved schedule removed.
fn watch_for_timeout<P: PageQuery, S: ConfigStore>(
    engine: Arc<PollingEngine<P>>,
    store: Arc<S>,
    slot: AlarmSlot,
    run_id: TraceId,
) {
    tokio::spawn(async move {
        let Some(outcome) = engine.wait().await else {
            return;
        };
        if outcome.run_id != run_id || outcome.state != PollState::TimedOut {
            return;
        }

        warn!(%run_id, "run timed out; dropping the pending schedule");
        cancel(&slot);
        if let Err(e) = store.clear_schedule().await {
            error!(error = ?e, "could not clear the schedule after a timeout");
        }
    });
}
