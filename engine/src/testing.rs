//! In-memory stand-in for the booking page.
//!
//! Understands exactly the selectors produced by [`SiteSelectors`] and keeps
//! a log of every click and reload so tests can assert on what the engine
//! did to the page. All timing goes through `tokio::time`, so tests run with
//! a paused clock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corelib::models::FacilityId;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::PageError;
use crate::page::{ElementRef, LoadStatus, PageQuery, PageResult};
use crate::site::SiteSelectors;

pub const CALENDAR_URL: &str = "https://www.auc.or.kr/reservation/calendar";
pub const STEP2_URL: &str = "https://www.auc.or.kr/reservation/reservationStep2";

const CONFIRM_LAYER: &str = "confirm-layer";
const CONFIRM_YES: &str = "confirm-yes";
const NEXT: &str = "next";

/// One court checkbox and how it reacts to clicks.
#[derive(Debug, Clone)]
pub struct FakeCheckbox {
    pub id: FacilityId,
    pub enabled: bool,
    pub checked: bool,
    pub has_label: bool,
    pub label_works: bool,
    pub input_works: bool,
}

impl FakeCheckbox {
    pub fn enabled(n: u32) -> Self {
        Self {
            id: FacilityId::from_number(n),
            enabled: true,
            checked: false,
            has_label: true,
            label_works: true,
            input_works: true,
        }
    }

    pub fn disabled(n: u32) -> Self {
        Self {
            enabled: false,
            ..Self::enabled(n)
        }
    }

    /// Clicking the label does nothing (an overlay swallows it).
    pub fn label_broken(mut self) -> Self {
        self.label_works = false;
        self
    }

    /// Neither label nor input toggles the box.
    pub fn stuck(mut self) -> Self {
        self.label_works = false;
        self.input_works = false;
        self
    }

    pub fn without_label(mut self) -> Self {
        self.has_label = false;
        self
    }
}

#[derive(Debug)]
struct Release {
    after_reloads: u64,
    date_key: String,
    label: String,
}

#[derive(Debug)]
struct Model {
    site: SiteSelectors,
    url: String,
    /// `None` while a navigation is pending until `finish_loading`.
    ready_at: Option<Instant>,
    days: BTreeMap<String, Vec<String>>,
    releases: Vec<Release>,
    confirm_dialog: bool,
    confirm_shown: bool,
    transition_on_confirm: bool,
    checkboxes: Vec<FakeCheckbox>,
    next_button: bool,
    reload_latency: Duration,
    fail_clicks: Option<String>,
    fail_reloads: bool,
    clicks: Vec<String>,
    reloads: u64,
}

impl Model {
    fn checkbox(&self, id: &str) -> Option<&FakeCheckbox> {
        self.checkboxes.iter().find(|cb| cb.id.as_str() == id)
    }

    fn checkbox_mut(&mut self, id: &str) -> Option<&mut FakeCheckbox> {
        self.checkboxes.iter_mut().find(|cb| cb.id.as_str() == id)
    }

    fn navigate(&mut self, url: &str, ready_at: Option<Instant>) {
        self.url = url.to_string();
        self.ready_at = ready_at;
        self.confirm_shown = false;
    }

    fn time_label(&self, id: &str) -> PageResult<&String> {
        let rest = id.strip_prefix("time:").ok_or(PageError::StaleElement)?;
        let (date_key, idx) = rest.rsplit_once(':').ok_or(PageError::StaleElement)?;
        let idx: usize = idx.parse().map_err(|_| PageError::StaleElement)?;
        self.days
            .get(date_key)
            .and_then(|labels| labels.get(idx))
            .ok_or(PageError::StaleElement)
    }

    fn exists(&self, id: &str) -> bool {
        match id {
            CONFIRM_LAYER | CONFIRM_YES => self.confirm_shown,
            NEXT => self.next_button,
            _ => {
                if let Some(date_key) = id.strip_prefix("day:") {
                    self.days.get(date_key).is_some_and(|l| !l.is_empty())
                } else if let Some(cb) = id.strip_prefix("cb:") {
                    self.checkbox(cb).is_some()
                } else if let Some(cb) = id.strip_prefix("label:") {
                    self.checkbox(cb).is_some_and(|c| c.has_label)
                } else {
                    self.time_label(id).is_ok()
                }
            }
        }
    }
}

/// Scripted page shared between the engine and the test body.
#[derive(Clone, Debug)]
pub struct ScriptedPage {
    inner: Arc<Mutex<Model>>,
}

impl ScriptedPage {
    /// An empty, fully loaded calendar page.
    pub fn new(site: SiteSelectors) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Model {
                site,
                url: CALENDAR_URL.to_string(),
                ready_at: Some(Instant::now()),
                days: BTreeMap::new(),
                releases: Vec::new(),
                confirm_dialog: true,
                confirm_shown: false,
                transition_on_confirm: false,
                checkboxes: Vec::new(),
                next_button: true,
                reload_latency: Duration::from_millis(50),
                fail_clicks: None,
                fail_reloads: false,
                clicks: Vec::new(),
                reloads: 0,
            })),
        }
    }

    /// Opens `labels` as time links on `date_key`, in page order.
    pub fn with_day(self, date_key: &str, labels: &[&str]) -> Self {
        self.inner
            .lock()
            .days
            .entry(date_key.to_string())
            .or_default()
            .extend(labels.iter().map(|l| l.to_string()));
        self
    }

    /// Makes `label` appear on `date_key` once the page was reloaded `n` times.
    pub fn release_on_reload(self, n: u64, date_key: &str, label: &str) -> Self {
        self.inner.lock().releases.push(Release {
            after_reloads: n,
            date_key: date_key.to_string(),
            label: label.to_string(),
        });
        self
    }

    pub fn with_checkbox(self, checkbox: FakeCheckbox) -> Self {
        self.inner.lock().checkboxes.push(checkbox);
        self
    }

    pub fn with_checkboxes(self, checkboxes: impl IntoIterator<Item = FakeCheckbox>) -> Self {
        self.inner.lock().checkboxes.extend(checkboxes);
        self
    }

    pub fn with_reload_latency(self, latency: Duration) -> Self {
        self.inner.lock().reload_latency = latency;
        self
    }

    /// Accepting the confirmation dialog navigates to the facility step.
    pub fn transition_on_confirm(self) -> Self {
        self.inner.lock().transition_on_confirm = true;
        self
    }

    /// Clicking a time link does not pop the confirmation dialog.
    pub fn without_confirm_dialog(self) -> Self {
        self.inner.lock().confirm_dialog = false;
        self
    }

    pub fn without_next_button(self) -> Self {
        self.inner.lock().next_button = false;
        self
    }

    /// Clicks on elements whose handle starts with `prefix` fail.
    pub fn fail_clicks_matching(self, prefix: &str) -> Self {
        self.inner.lock().fail_clicks = Some(prefix.to_string());
        self
    }

    pub fn fail_reloads(self) -> Self {
        self.inner.lock().fail_reloads = true;
        self
    }

    /// Moves to `url`. An incomplete load stays pending until
    /// [`ScriptedPage::finish_loading`].
    pub fn navigate(&self, url: &str, complete: bool) {
        let ready_at = complete.then(Instant::now);
        self.inner.lock().navigate(url, ready_at);
    }

    pub fn finish_loading(&self) {
        self.inner.lock().ready_at = Some(Instant::now());
    }

    /// Every clicked element handle, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.inner.lock().clicks.clone()
    }

    pub fn reloads(&self) -> u64 {
        self.inner.lock().reloads
    }

    pub fn url(&self) -> String {
        self.inner.lock().url.clone()
    }

    /// Checked facilities, in page order.
    pub fn checked(&self) -> Vec<FacilityId> {
        self.inner
            .lock()
            .checkboxes
            .iter()
            .filter(|cb| cb.checked)
            .map(|cb| cb.id.clone())
            .collect()
    }
}

#[async_trait]
impl PageQuery for ScriptedPage {
    async fn find_all(&self, selector: &str) -> PageResult<Vec<ElementRef>> {
        let m = self.inner.lock();
        let site = &m.site;

        if selector == site.confirm_layer {
            return Ok(m.confirm_shown.then(|| ElementRef::new(CONFIRM_LAYER)).into_iter().collect());
        }
        if selector == site.next_button {
            return Ok(m.next_button.then(|| ElementRef::new(NEXT)).into_iter().collect());
        }
        if selector == site.enabled_checkbox {
            return Ok(m
                .checkboxes
                .iter()
                .filter(|cb| cb.enabled)
                .map(|cb| ElementRef::new(format!("cb:{}", cb.id)))
                .collect());
        }
        for (date_key, labels) in &m.days {
            if !labels.is_empty() && selector == site.day_cell(date_key) {
                return Ok(vec![ElementRef::new(format!("day:{date_key}"))]);
            }
        }
        for cb in &m.checkboxes {
            if selector == site.checkbox(&cb.id) {
                return Ok(vec![ElementRef::new(format!("cb:{}", cb.id))]);
            }
            if cb.has_label && selector == site.label_for(&cb.id) {
                return Ok(vec![ElementRef::new(format!("label:{}", cb.id))]);
            }
        }
        Ok(Vec::new())
    }

    async fn find_within(&self, scope: &ElementRef, selector: &str) -> PageResult<Vec<ElementRef>> {
        let m = self.inner.lock();
        if !m.exists(scope.as_str()) {
            return Err(PageError::StaleElement);
        }

        if let Some(date_key) = scope.as_str().strip_prefix("day:") {
            if selector == m.site.time_link {
                let count = m.days.get(date_key).map_or(0, Vec::len);
                return Ok((0..count)
                    .map(|i| ElementRef::new(format!("time:{date_key}:{i}")))
                    .collect());
            }
        }
        if scope.as_str() == CONFIRM_LAYER && selector == m.site.confirm_button {
            return Ok(vec![ElementRef::new(CONFIRM_YES)]);
        }
        Ok(Vec::new())
    }

    async fn text(&self, element: &ElementRef) -> PageResult<String> {
        let m = self.inner.lock();
        if element.as_str().starts_with("time:") {
            return m.time_label(element.as_str()).cloned();
        }
        if !m.exists(element.as_str()) {
            return Err(PageError::StaleElement);
        }
        Ok(String::new())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> PageResult<Option<String>> {
        let m = self.inner.lock();
        if !m.exists(element.as_str()) {
            return Err(PageError::StaleElement);
        }
        Ok(match (element.as_str().strip_prefix("cb:"), name) {
            (Some(id), "id") => Some(id.to_string()),
            _ => None,
        })
    }

    async fn is_visible(&self, element: &ElementRef) -> PageResult<bool> {
        let m = self.inner.lock();
        if !m.exists(element.as_str()) {
            return Err(PageError::StaleElement);
        }
        Ok(true)
    }

    async fn is_checked(&self, element: &ElementRef) -> PageResult<bool> {
        let m = self.inner.lock();
        element
            .as_str()
            .strip_prefix("cb:")
            .and_then(|id| m.checkbox(id))
            .map(|cb| cb.checked)
            .ok_or(PageError::StaleElement)
    }

    async fn is_enabled(&self, element: &ElementRef) -> PageResult<bool> {
        let m = self.inner.lock();
        match element.as_str().strip_prefix("cb:") {
            Some(id) => m.checkbox(id).map(|cb| cb.enabled).ok_or(PageError::StaleElement),
            None if m.exists(element.as_str()) => Ok(true),
            None => Err(PageError::StaleElement),
        }
    }

    async fn click(&self, element: &ElementRef) -> PageResult<()> {
        let mut m = self.inner.lock();
        let id = element.as_str().to_string();

        if m.fail_clicks.as_deref().is_some_and(|prefix| id.starts_with(prefix)) {
            return Err(PageError::Driver(format!("click on {id} intercepted")));
        }
        if !m.exists(&id) {
            return Err(PageError::StaleElement);
        }
        m.clicks.push(id.clone());

        if id.starts_with("time:") {
            if m.confirm_dialog {
                m.confirm_shown = true;
            }
        } else if id == CONFIRM_YES {
            m.confirm_shown = false;
            if m.transition_on_confirm {
                let ready_at = Instant::now() + m.reload_latency;
                m.navigate(STEP2_URL, Some(ready_at));
            }
        } else if let Some(cb) = id.strip_prefix("label:") {
            if let Some(cb) = m.checkbox_mut(cb) {
                if cb.enabled && cb.label_works {
                    cb.checked = !cb.checked;
                }
            }
        } else if let Some(cb) = id.strip_prefix("cb:") {
            if let Some(cb) = m.checkbox_mut(cb) {
                if cb.enabled && cb.input_works {
                    cb.checked = !cb.checked;
                }
            }
        }
        Ok(())
    }

    async fn reload(&self) -> PageResult<()> {
        let mut m = self.inner.lock();
        if m.fail_reloads {
            return Err(PageError::Driver("reload failed".into()));
        }

        m.reloads += 1;
        let reloads = m.reloads;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut m.releases)
            .into_iter()
            .partition(|r| r.after_reloads <= reloads);
        m.releases = pending;
        for release in due {
            m.days.entry(release.date_key).or_default().push(release.label);
        }

        let url = m.url.clone();
        let ready_at = Instant::now() + m.reload_latency;
        m.navigate(&url, Some(ready_at));
        Ok(())
    }

    async fn load_status(&self) -> PageResult<LoadStatus> {
        let m = self.inner.lock();
        Ok(LoadStatus {
            url: m.url.clone(),
            complete: m.ready_at.is_some_and(|at| Instant::now() >= at),
        })
    }
}
