mod cli;
mod config;

use std::sync::Arc;

use adapters::webdriver::{WebDriverPage, chrome_capabilities};
use anyhow::Context;
use chrono::{Local, TimeZone};
use clap::Parser;
use common::logger::init_logger;
use corelib::models::{RawConfig, StoredConfig};
use corelib::models::schedule::next_execution_time;
use engine::{EngineEvent, FacilityStep, PollingEngine, RunOutcome};
use scheduler::{ConfigStore, JsonFileStore, TriggerMessage, TriggerReply, TriggerSource};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use cli::{Cli, Command, ConfigCommand, SettingsArgs};
use config::AppConfig;

type Trigger = TriggerSource<WebDriverPage, JsonFileStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::from_env();
    init_logger("courtbot", cfg.json_logs);

    let store = Arc::new(JsonFileStore::new(&cfg.settings_path));

    match cli.command {
        Command::Config(ConfigCommand::Show) => show_config(store.as_ref()).await,
        Command::Config(ConfigCommand::Set(args)) => set_config(store.as_ref(), &args).await,
        Command::NextRun => next_run(store.as_ref()).await,
        Command::Run(args) => {
            let config = merged(store.as_ref(), &args).await?;
            let trigger = connect(&cfg, store).await?;
            drive(&trigger, TriggerMessage::RunNow { config }).await
        }
        Command::Schedule(args) => {
            let config = merged(store.as_ref(), &args).await?;
            let trigger = connect(&cfg, store).await?;
            drive(&trigger, TriggerMessage::Schedule { config }).await
        }
        Command::Resume => {
            let trigger = connect(&cfg, store).await?;
            match trigger.resume().await? {
                Some(at) => {
                    println!("armed for {}", at.format("%Y-%m-%d %H:%M:%S"));
                    report_outcome(follow(&trigger, trigger.engine().subscribe()).await?);
                    Ok(())
                }
                None => {
                    println!("no pending schedule");
                    Ok(())
                }
            }
        }
    }
}

/// Saved settings with the command-line overrides applied, in stored form.
async fn merged(store: &JsonFileStore, args: &SettingsArgs) -> anyhow::Result<RawConfig> {
    let mut raw = RawConfig::from(&store.load().await?);
    args.apply(&mut raw);
    Ok(raw)
}

async fn connect(cfg: &AppConfig, store: Arc<JsonFileStore>) -> anyhow::Result<Trigger> {
    let page = match &cfg.webdriver_session {
        Some(session) => WebDriverPage::attach(&cfg.webdriver_url, session.clone())?,
        None => {
            let page = WebDriverPage::new_session(&cfg.webdriver_url, chrome_capabilities(cfg.headless))
                .await
                .with_context(|| format!("opening a browser via {}", cfg.webdriver_url))?;
            if let Some(url) = &cfg.start_url {
                page.navigate(url).await?;
            }
            page
        }
    };
    info!(session = page.session_id(), "browser session ready");

    let page = Arc::new(page);
    let engine_cfg = cfg.engine_config();
    let step = FacilityStep::new(Arc::clone(&page), engine_cfg.clone());
    let engine = PollingEngine::new(page, engine_cfg).with_next_step(Arc::new(step));

    Ok(TriggerSource::new(Arc::new(engine), store).with_lead(cfg.alarm_lead))
}

async fn drive(trigger: &Trigger, msg: TriggerMessage) -> anyhow::Result<()> {
    let events = trigger.engine().subscribe();

    match trigger.handle(msg).await? {
        TriggerReply::Started { run_id } => println!("run {run_id} started"),
        TriggerReply::Scheduled { at } => println!("armed for {}", at.format("%Y-%m-%d %H:%M:%S")),
        TriggerReply::Stopped { .. } => return Ok(()),
    }

    report_outcome(follow(trigger, events).await?);
    Ok(())
}

/// Prints status until the run ends. Ctrl-C stops the run and cancels any
/// pending alarm.
async fn follow(
    trigger: &Trigger,
    mut events: broadcast::Receiver<EngineEvent>,
) -> anyhow::Result<Option<RunOutcome>> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                trigger.handle(TriggerMessage::Stop).await?;
                return Ok(trigger.engine().wait().await);
            }
            event = events.recv() => match event {
                Ok(EngineEvent::Stopped { .. }) => return Ok(trigger.engine().wait().await),
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "status events dropped"),
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Started { target_date, .. } => println!("searching {target_date}"),
        EngineEvent::StateChanged { state, .. } => println!("state: {state}"),
        EngineEvent::SlotClaimed { slot, .. } => println!("clicked {slot}"),
        EngineEvent::Warning { message, .. } => println!("warning: {message}"),
        EngineEvent::Allocated { facilities, .. } => {
            let courts: Vec<_> = facilities.iter().map(ToString::to_string).collect();
            println!("courts: {}", courts.join(", "));
        }
        EngineEvent::Stopped { reason, .. } => println!("stopped: {reason}"),
    }
}

fn report_outcome(outcome: Option<RunOutcome>) {
    let Some(outcome) = outcome else {
        println!("no run took place");
        return;
    };

    println!(
        "run {} ended: {} ({}) after {} attempt(s)",
        outcome.run_id, outcome.state, outcome.reason, outcome.attempts
    );
    if let Some(slot) = &outcome.slot {
        println!("slot: {slot}");
    }
    if let Some(allocation) = &outcome.allocation {
        let courts: Vec<_> = allocation.claimed.iter().map(ToString::to_string).collect();
        println!(
            "courts: [{}]{}",
            courts.join(", "),
            if allocation.advanced { "" } else { " (not submitted)" }
        );
    }
}

async fn show_config(store: &JsonFileStore) -> anyhow::Result<()> {
    let raw = RawConfig::from(&store.load().await?);
    println!("{}", serde_json::to_string_pretty(&raw)?);
    println!("(stored in {})", store.path().display());
    Ok(())
}

async fn set_config(store: &JsonFileStore, args: &SettingsArgs) -> anyhow::Result<()> {
    let raw = merged(store, args).await?;
    let config = StoredConfig::try_from(raw).context("invalid settings")?;
    store.save(&config).await?;
    println!("saved to {}", store.path().display());
    Ok(())
}

async fn next_run(store: &JsonFileStore) -> anyhow::Result<()> {
    let config = store.load().await?;

    if let Some(at) = config
        .scheduled_execution_time
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
    {
        println!("scheduled: {}", at.format("%Y-%m-%d %H:%M:%S"));
        return Ok(());
    }

    match config.execution_time {
        Some(time) => {
            let at = next_execution_time(time, &Local::now());
            println!("not armed; next occurrence would be {}", at.format("%Y-%m-%d %H:%M:%S"));
        }
        None => println!("no execution time set"),
    }
    Ok(())
}
