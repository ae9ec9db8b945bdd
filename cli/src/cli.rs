use clap::{Args, Parser, Subcommand};
use corelib::models::RawConfig;

#[derive(Debug, Parser)]
#[clap(name = "courtbot", version, about = "Claims a court reservation the moment it opens")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start searching now.
    Run(SettingsArgs),

    /// Save the settings and run at the next occurrence of the execution time.
    Schedule(SettingsArgs),

    /// Re-arm a schedule saved by an earlier invocation and wait for it.
    Resume,

    /// Show or edit the saved settings.
    #[clap(subcommand)]
    Config(ConfigCommand),

    /// Print when the next scheduled run will happen.
    NextRun,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Set(SettingsArgs),
}

/// Overrides applied on top of the saved settings. Lists are
/// comma-separated, as they are stored.
#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Target date, YYYY-MM-DD.
    #[clap(long)]
    pub date: Option<String>,

    /// Preferred time labels, highest priority first (e.g. "10:00,12:00").
    #[clap(long)]
    pub times: Option<String>,

    /// Preferred court numbers, highest priority first (e.g. "5,6").
    #[clap(long)]
    pub courts: Option<String>,

    /// Number of courts to claim.
    #[clap(long)]
    pub quota: Option<usize>,

    /// Daily execution time, HH:MM.
    #[clap(long)]
    pub at: Option<String>,
}

impl SettingsArgs {
    pub fn apply(&self, raw: &mut RawConfig) {
        if let Some(date) = &self.date {
            raw.target_date = date.clone();
        }
        if let Some(times) = &self.times {
            raw.preferred_times = times.clone();
        }
        if let Some(courts) = &self.courts {
            raw.preferred_checkboxes = courts.clone();
        }
        if let Some(quota) = self.quota {
            raw.max_checkboxes_to_click = quota;
        }
        if let Some(at) = &self.at {
            raw.execution_time = at.clone();
        }
    }
}
