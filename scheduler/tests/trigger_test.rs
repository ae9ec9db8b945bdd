
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeDelta, Timelike};
use corelib::models::{RawConfig, StoredConfig};
use engine::testing::ScriptedPage;
use engine::{EngineConfig, PollState, PollingEngine, SiteSelectors};
use mock_store::MockStore;
use scheduler::{TriggerMessage, TriggerReply, TriggerSource};
use tokio::time::sleep;

const DAY: &str = "2025-07-14";

fn raw(execution_time: &str) -> RawConfig {
    RawConfig {
        target_date: DAY.into(),
        preferred_times: "10:00~12:00".into(),
        preferred_checkboxes: "5, 6".into(),
        execution_time: execution_time.into(),
        scheduled_execution_time: None,
        max_checkboxes_to_click: 2,
    }
}

fn in_minutes(minutes: i64) -> String {
    (Local::now() + TimeDelta::minutes(minutes))
        .format("%H:%M")
        .to_string()
}

fn setup() -> (ScriptedPage, MockStore, TriggerSource<ScriptedPage, MockStore>) {
    let page = ScriptedPage::new(SiteSelectors::default())
        .with_day(DAY, &["10:00~12:00"])
        .transition_on_confirm();
    let engine = Arc::new(PollingEngine::new(
        Arc::new(page.clone()),
        EngineConfig::default(),
    ));
    let store = MockStore::new();
    let trigger = TriggerSource::new(engine, Arc::new(store.clone()));
    (page, store, trigger)
}

#[tokio::test(start_paused = true)]
async fn scheduled_alarm_fires_early_and_clears_the_schedule() {
    let (page, store, trigger) = setup();
    let now = Local::now();

    let reply = trigger
        .handle_at(TriggerMessage::Schedule { config: raw(&in_minutes(10)) }, now)
        .await
        .unwrap();
    let TriggerReply::Scheduled { at } = reply else {
        panic!("unexpected reply {reply:?}");
    };

    assert_eq!(at.second(), 0);
    assert!(at > now);
    assert_eq!(trigger.pending(), Some(at));
    assert_eq!(
        store.snapshot().await.scheduled_execution_time,
        Some(at.timestamp_millis())
    );

    sleep(Duration::from_secs(8 * 60)).await;
    assert!(page.clicks().is_empty());

    sleep(Duration::from_secs(3 * 60)).await;
    let outcome = trigger.engine().wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Done);
    assert_eq!(store.snapshot().await.scheduled_execution_time, None);
    assert_eq!(trigger.pending(), None);
}

#[tokio::test(start_paused = true)]
async fn alarm_uses_settings_saved_after_arming() {
    let (page, store, trigger) = setup();

    trigger
        .handle(TriggerMessage::Schedule { config: raw(&in_minutes(10)) })
        .await
        .unwrap();

    let mut edited = store.snapshot().await;
    edited.preferred_times = vec!["14:00~16:00".into()];
    store.put(edited).await;

    sleep(Duration::from_secs(11 * 60)).await;

    // The run searches for the edited time, which never opens.
    assert!(trigger.engine().is_running());
    assert!(page.clicks().is_empty());
    trigger.handle(TriggerMessage::Stop).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_pending_alarm() {
    let (page, store, trigger) = setup();

    trigger
        .handle(TriggerMessage::Schedule { config: raw(&in_minutes(10)) })
        .await
        .unwrap();
    let reply = trigger.handle(TriggerMessage::Stop).await.unwrap();

    assert_eq!(reply, TriggerReply::Stopped { was_running: false });
    assert_eq!(trigger.pending(), None);
    assert_eq!(store.snapshot().await.scheduled_execution_time, None);

    sleep(Duration::from_secs(30 * 60)).await;
    assert!(page.clicks().is_empty());
    assert!(trigger.engine().wait().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn rescheduling_replaces_the_pending_alarm() {
    let (page, store, trigger) = setup();
    let now = Local::now();

    trigger
        .handle_at(TriggerMessage::Schedule { config: raw(&in_minutes(10)) }, now)
        .await
        .unwrap();
    let TriggerReply::Scheduled { at } = trigger
        .handle_at(TriggerMessage::Schedule { config: raw(&in_minutes(30)) }, now)
        .await
        .unwrap()
    else {
        panic!("expected a schedule");
    };

    assert_eq!(trigger.pending(), Some(at));
    assert_eq!(*store.saves.lock().await, 2);

    sleep(Duration::from_secs(15 * 60)).await;
    assert!(page.clicks().is_empty());

    sleep(Duration::from_secs(20 * 60)).await;
    assert!(!page.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_now_saves_and_starts_immediately() {
    let (page, store, trigger) = setup();
    let mut saved = StoredConfig::try_from(raw("")).unwrap();
    saved.scheduled_execution_time = Some(1);
    store.put(saved).await;

    let reply = trigger
        .handle(TriggerMessage::RunNow { config: raw("") })
        .await
        .unwrap();
    let TriggerReply::Started { run_id } = reply else {
        panic!("unexpected reply {reply:?}");
    };

    let outcome = trigger.engine().wait().await.unwrap();
    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.state, PollState::Done);
    assert_eq!(page.clicks()[0], "time:2025-07-14:0");

    let stored = store.snapshot().await;
    assert_eq!(stored.scheduled_execution_time, None);
    assert_eq!(stored.preferred_times, vec!["10:00~12:00"]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_run_drops_the_pending_schedule() {
    let (page, store, trigger) = setup();
    let mut never_open = raw("");
    never_open.preferred_times = "14:00~16:00".into();

    trigger
        .handle(TriggerMessage::RunNow { config: never_open })
        .await
        .unwrap();
    trigger
        .handle(TriggerMessage::Schedule { config: raw(&in_minutes(30)) })
        .await
        .unwrap();
    assert!(trigger.pending().is_some());

    let outcome = trigger.engine().wait().await.unwrap();
    assert_eq!(outcome.state, PollState::TimedOut);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(trigger.pending(), None);
    assert_eq!(store.snapshot().await.scheduled_execution_time, None);

    sleep(Duration::from_secs(40 * 60)).await;
    assert!(page.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_now_without_target_date_is_rejected() {
    let (_page, store, trigger) = setup();
    let mut config = raw("");
    config.target_date.clear();

    let err = trigger
        .handle(TriggerMessage::RunNow { config })
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("target date"));
    assert_eq!(*store.saves.lock().await, 0);
    assert!(!trigger.engine().is_running());
}

#[tokio::test(start_paused = true)]
async fn schedule_requires_an_execution_time() {
    let (_page, _store, trigger) = setup();

    let err = trigger
        .handle(TriggerMessage::Schedule { config: raw("") })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("execution time"));
    assert_eq!(trigger.pending(), None);
}

#[tokio::test(start_paused = true)]
async fn resume_rearms_a_future_schedule_and_drops_a_stale_one() {
    let (_page, store, trigger) = setup();
    let now = Local::now();

    let mut config = StoredConfig::try_from(raw("09:00")).unwrap();
    config.scheduled_execution_time = Some((now + TimeDelta::minutes(5)).timestamp_millis());
    store.put(config.clone()).await;

    let resumed = trigger.resume_at(now).await.unwrap();
    assert!(resumed.is_some());
    assert_eq!(trigger.pending(), resumed);

    config.scheduled_execution_time = Some((now - TimeDelta::minutes(5)).timestamp_millis());
    store.put(config).await;

    assert_eq!(trigger.resume_at(now).await.unwrap(), None);
    assert_eq!(store.snapshot().await.scheduled_execution_time, None);
}

#[test]
fn messages_use_the_action_tag() {
    let msg: TriggerMessage = serde_json::from_str(
        r#"{"action":"runNow","config":{"targetDate":"2025-07-14","preferredTimes":"10:00","preferredCheckboxes":"5,6"}}"#,
    )
    .unwrap();

    let TriggerMessage::RunNow { config } = msg else {
        panic!("expected runNow");
    };
    assert_eq!(config.preferred_checkboxes, "5,6");
    assert_eq!(config.max_checkboxes_to_click, 2);

    let stop: TriggerMessage = serde_json::from_str(r#"{"action":"stop"}"#).unwrap();
    assert_eq!(stop, TriggerMessage::Stop);
}
