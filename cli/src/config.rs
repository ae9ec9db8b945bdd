use std::path::PathBuf;
use std::time::Duration;

use engine::EngineConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Base URL of the WebDriver server (chromedriver, geckodriver, a grid).
    pub webdriver_url: String,

    /// Existing WebDriver session to drive instead of opening a new browser.
    ///
    /// The booking site needs a logged-in session; attaching lets the
    /// operator log in by hand in a browser the driver already controls.
    pub webdriver_session: Option<String>,

    /// Open new sessions without a visible window.
    pub headless: bool,

    /// Page a new session navigates to before anything else.
    pub start_url: Option<String>,

    /// Where the operator's settings are kept.
    pub settings_path: PathBuf,

    /// Budget of one run. The search loop and the wait for the facility
    /// page both end when it runs out.
    pub run_timeout: Duration,

    /// How far ahead of the execution time the alarm goes off.
    pub alarm_lead: Duration,

    /// Structured JSON logs instead of human-readable lines.
    pub json_logs: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let webdriver_url =
            std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| "http://localhost:9515".to_string());

        Self {
            webdriver_url,
            webdriver_session: std::env::var("WEBDRIVER_SESSION").ok().filter(|s| !s.is_empty()),
            headless: env_or("COURTBOT_HEADLESS", false),
            start_url: std::env::var("COURTBOT_START_URL").ok().filter(|s| !s.is_empty()),
            settings_path: std::env::var("COURTBOT_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("courtbot.json")),

            // One run gives up after ten minutes; the alarm leads by two seconds.
            run_timeout: Duration::from_secs(env_or("COURTBOT_RUN_TIMEOUT_SECS", 600)),
            alarm_lead: Duration::from_millis(env_or("COURTBOT_ALARM_LEAD_MS", 2_000)),

            json_logs: std::env::var("APP_ENV").is_ok_and(|v| v == "production"),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            run_timeout: self.run_timeout,
            ..EngineConfig::default()
        }
    }
}
