//! The page capability the engine consumes.
//!
//! Implementations drive a real browser (see the `adapters` crate) or an
//! in-memory model in tests. Selectors are CSS strings; element handles are
//! opaque and may go stale after a reload or navigation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{PageError, RunError};

pub type PageResult<T> = Result<T, PageError>;

/// Opaque handle to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Navigation state of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatus {
    pub url: String,
    /// The document finished loading (`readyState == "complete"`).
    pub complete: bool,
}

#[async_trait]
pub trait PageQuery: Send + Sync + 'static {
    /// All elements matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> PageResult<Vec<ElementRef>>;

    /// Elements matching `selector` inside `scope`, in document order.
    async fn find_within(&self, scope: &ElementRef, selector: &str) -> PageResult<Vec<ElementRef>>;

    async fn text(&self, element: &ElementRef) -> PageResult<String>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> PageResult<Option<String>>;

    async fn is_visible(&self, element: &ElementRef) -> PageResult<bool>;

    async fn is_checked(&self, element: &ElementRef) -> PageResult<bool>;

    async fn is_enabled(&self, element: &ElementRef) -> PageResult<bool>;

    async fn click(&self, element: &ElementRef) -> PageResult<()>;

    /// Starts a reload. Once this returns, `load_status` describes the new
    /// navigation, not the page that was replaced.
    async fn reload(&self) -> PageResult<()>;

    async fn load_status(&self) -> PageResult<LoadStatus>;

    async fn find_first(&self, selector: &str) -> PageResult<Option<ElementRef>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }
}

/// Polls until an element matching `selector` is visible.
///
/// Fails with `ElementNotFound` once `timeout` has elapsed. Stale handles
/// seen while the page re-renders are skipped; any other page failure is
/// returned as is.
pub async fn wait_for_visible<P>(
    page: &P,
    selector: &str,
    timeout: Duration,
    poll_every: Duration,
) -> Result<ElementRef, RunError>
where
    P: PageQuery + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        for element in page.find_all(selector).await? {
            match page.is_visible(&element).await {
                Ok(true) => return Ok(element),
                Ok(false) | Err(PageError::StaleElement) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if Instant::now() >= deadline {
            debug!(selector, timeout_ms = timeout.as_millis() as u64, "element never became visible");
            return Err(RunError::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(poll_every).await;
    }
}

/// Polls until at least one element matches `selector`, visible or not.
///
/// Styled checkboxes are usually hidden behind their labels, so presence is
/// all that can be waited for. Fails with `ElementNotFound` after `timeout`.
pub async fn wait_for_present<P>(
    page: &P,
    selector: &str,
    timeout: Duration,
    poll_every: Duration,
) -> Result<Vec<ElementRef>, RunError>
where
    P: PageQuery + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        let found = page.find_all(selector).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            return Err(RunError::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(poll_every).await;
    }
}

/// Polls until the document is fully loaded on a URL accepted by `accept`.
///
/// Has no bound of its own; callers race it against the run token.
pub async fn wait_for_load<P, F>(page: &P, poll_every: Duration, accept: F) -> PageResult<LoadStatus>
where
    P: PageQuery + ?Sized,
    F: Fn(&str) -> bool + Send,
{
    loop {
        let status = page.load_status().await?;
        if status.complete && accept(&status.url) {
            return Ok(status);
        }
        trace!(url = %status.url, complete = status.complete, "waiting for load");
        sleep(poll_every).await;
    }
}
