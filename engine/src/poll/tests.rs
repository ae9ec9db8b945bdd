use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use corelib::models::{FacilityId, ReservationRequest};
use tokio::sync::broadcast;
use tokio::time::sleep;

use super::*;
use crate::allocate::FacilityStep;
use crate::config::EngineConfig;
use crate::site::SiteSelectors;
use crate::testing::{FakeCheckbox, STEP2_URL, ScriptedPage};
use crate::token::StopReason;

const DAY: &str = "2025-07-14";

fn request(times: &[&str]) -> ReservationRequest {
    ReservationRequest::new(
        NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
        times.iter().map(|t| t.to_string()).collect(),
        vec![FacilityId::from_number(5), FacilityId::from_number(6)],
        2,
    )
    .unwrap()
}

fn cfg(timeout: Duration) -> EngineConfig {
    EngineConfig {
        run_timeout: timeout,
        ..EngineConfig::default()
    }
}

fn calendar() -> ScriptedPage {
    ScriptedPage::new(SiteSelectors::default())
}

fn engine(page: &ScriptedPage, timeout: Duration) -> PollingEngine<ScriptedPage> {
    PollingEngine::new(Arc::new(page.clone()), cfg(timeout))
}

fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[EngineEvent]) -> Vec<PollState> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn claims_slot_and_hands_off_to_facility_step() {
    let page = calendar()
        .with_day(DAY, &["08:00~10:00", "10:00~12:00"])
        .transition_on_confirm()
        .with_checkboxes((1..=8).map(FakeCheckbox::enabled));
    let step = FacilityStep::new(Arc::new(page.clone()), EngineConfig::default());
    let engine = engine(&page, Duration::from_secs(60)).with_next_step(Arc::new(step));
    let mut events = engine.subscribe();

    let run_id = engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.state, PollState::Done);
    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.slot.as_deref(), Some("10:00~12:00"));
    assert_eq!(page.url(), STEP2_URL);

    let allocation = outcome.allocation.unwrap();
    assert_eq!(
        allocation.claimed,
        vec![FacilityId::from_number(5), FacilityId::from_number(6)]
    );
    assert!(allocation.advanced);

    let clicks = page.clicks();
    assert_eq!(&clicks[..2], &["time:2025-07-14:1", "confirm-yes"]);
    assert_eq!(clicks.last().map(String::as_str), Some("next"));

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(EngineEvent::Started { .. })));
    assert_eq!(
        states(&events),
        vec![
            PollState::Searching,
            PollState::Found,
            PollState::Confirming,
            PollState::AwaitingTransition,
            PollState::Done,
        ]
    );
    assert!(matches!(
        events.last(),
        Some(EngineEvent::Stopped { reason: StopReason::Completed, .. })
    ));
    assert_eq!(engine.state(), PollState::Done);
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn preference_order_beats_page_order() {
    let page = calendar()
        .with_day(DAY, &["08:00~10:00", "10:00~12:00", "12:00~14:00"])
        .transition_on_confirm();
    let engine = engine(&page, Duration::from_secs(60));

    engine.start(request(&["12:00~14:00", "08:00~10:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.slot.as_deref(), Some("12:00~14:00"));
    assert_eq!(page.clicks()[0], "time:2025-07-14:2");
}

#[tokio::test(start_paused = true)]
async fn keeps_reloading_until_slot_is_released() {
    let page = calendar()
        .with_day(DAY, &["08:00~10:00"])
        .release_on_reload(5, DAY, "18:00~20:00")
        .transition_on_confirm();
    let engine = engine(&page, Duration::from_secs(60));

    engine.start(request(&["18:00~20:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Done);
    assert_eq!(outcome.attempts, 6);
    assert_eq!(page.reloads(), 5);
}

#[tokio::test(start_paused = true)]
async fn no_match_until_deadline_times_out_without_finding() {
    let page = calendar().with_day(DAY, &["08:00~10:00"]);
    let engine = engine(&page, Duration::from_secs(2));
    let mut events = engine.subscribe();

    engine.start(request(&["20:00~22:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::TimedOut);
    assert_eq!(outcome.reason.as_str(), "timeout");
    assert!(outcome.slot.is_none());
    assert!(page.reloads() > 1);
    assert!(page.clicks().is_empty());

    let events = drain(&mut events);
    assert_eq!(states(&events), vec![PollState::Searching, PollState::TimedOut]);
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::SlotClaimed { .. })));
}

#[tokio::test(start_paused = true)]
async fn missing_date_is_treated_as_no_match() {
    let page = calendar().with_day("2025-07-15", &["10:00~12:00"]);
    let engine = engine(&page, Duration::from_secs(1));

    engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::TimedOut);
    assert!(page.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transition_that_never_comes_times_out_with_warning() {
    let page = calendar().with_day(DAY, &["10:00~12:00"]);
    let engine = engine(&page, Duration::from_secs(5));
    let mut events = engine.subscribe();

    engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::TimedOut);
    assert_eq!(outcome.reason, StopReason::Timeout);
    assert_eq!(outcome.slot.as_deref(), Some("10:00~12:00"));

    let events = drain(&mut events);
    assert!(states(&events).contains(&PollState::AwaitingTransition));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Warning { message, .. } if message.contains("reservationStep2")
    )));
}

#[tokio::test(start_paused = true)]
async fn stop_ends_run_and_nothing_is_clicked_afterwards() {
    let page = calendar()
        .with_day(DAY, &["08:00~10:00"])
        .release_on_reload(50, DAY, "18:00~20:00")
        .transition_on_confirm();
    let engine = engine(&page, Duration::from_secs(600));

    engine.start(request(&["18:00~20:00"])).await;
    sleep(Duration::from_millis(1_000)).await;

    assert!(engine.is_running());
    assert!(engine.stop());
    let outcome = engine.wait().await.unwrap();
    let reloads = page.reloads();

    assert_eq!(outcome.state, PollState::Stopped);
    assert_eq!(outcome.reason.as_str(), "stopped");

    sleep(Duration::from_secs(60)).await;
    assert!(page.clicks().is_empty());
    assert_eq!(page.reloads(), reloads);
    assert!(!engine.stop());
}

#[tokio::test(start_paused = true)]
async fn missing_confirmation_dialog_is_recovered() {
    let page = calendar()
        .with_day(DAY, &["10:00~12:00"])
        .without_confirm_dialog();
    let engine = engine(&page, Duration::from_secs(60));
    let mut events = engine.subscribe();

    engine.start(request(&["10:00~12:00"])).await;
    sleep(Duration::from_secs(3)).await;
    assert_eq!(engine.state(), PollState::AwaitingTransition);
    page.navigate(STEP2_URL, true);

    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Done);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        EngineEvent::Warning { message, .. } if message.contains("#confirmLayer")
    )));
}

#[tokio::test(start_paused = true)]
async fn page_failure_during_search_abandons_run() {
    let page = calendar()
        .with_day(DAY, &["10:00~12:00"])
        .fail_clicks_matching("time:");
    let engine = engine(&page, Duration::from_secs(60));

    engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Error);
    assert!(matches!(outcome.reason, StopReason::Error(ref msg) if msg.contains("intercepted")));
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn reload_failure_abandons_run() {
    let page = calendar().with_day(DAY, &["08:00~10:00"]).fail_reloads();
    let engine = engine(&page, Duration::from_secs(60));

    engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Error);
    assert_eq!(outcome.reason.as_str(), "error");
}

#[tokio::test(start_paused = true)]
async fn refuses_pages_outside_the_booking_site() {
    let page = calendar().with_day(DAY, &["10:00~12:00"]);
    page.navigate("https://example.com/calendar", true);
    let engine = engine(&page, Duration::from_secs(60));

    engine.start(request(&["10:00~12:00"])).await;
    let outcome = engine.wait().await.unwrap();

    assert_eq!(outcome.state, PollState::Error);
    assert_eq!(outcome.attempts, 0);
    assert!(page.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_start_supersedes_the_first() {
    let page = calendar().with_day(DAY, &["08:00~10:00"]);
    let engine = engine(&page, Duration::from_secs(600));
    let mut events = engine.subscribe();

    let first = engine.start(request(&["20:00~22:00"])).await;
    sleep(Duration::from_millis(500)).await;
    let second = engine.start(request(&["20:00~22:00"])).await;

    assert_ne!(first, second);
    assert!(engine.is_running());

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Stopped { run_id, reason: StopReason::Superseded } if *run_id == first
    )));

    assert!(engine.stop());
    let outcome = engine.wait().await.unwrap();
    assert_eq!(outcome.run_id, second);
    assert_eq!(outcome.state, PollState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_while_superseding_cancels_the_incoming_run() {
    let page = calendar().with_day(DAY, &["08:00~10:00"]);
    let engine = engine(&page, Duration::from_secs(600));

    engine.start(request(&["20:00~22:00"])).await;
    sleep(Duration::from_millis(500)).await;

    // The second start is parked on the first run winding down when the
    // stop lands.
    let (second, stopped) = tokio::join!(engine.start(request(&["20:00~22:00"])), async {
        engine.stop()
    });

    assert!(stopped);
    let outcome = engine.wait().await.unwrap();
    assert_eq!(outcome.run_id, second);
    assert_eq!(outcome.state, PollState::Stopped);
    assert_eq!(outcome.reason, StopReason::Requested);
    assert_eq!(outcome.attempts, 0);
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn wait_without_run_is_none() {
    let page = calendar();
    let engine = engine(&page, Duration::from_secs(1));

    assert!(engine.wait().await.is_none());
    assert_eq!(engine.state(), PollState::Idle);
    assert!(!engine.stop());
}
