use std::time::Duration;

use async_trait::async_trait;
use engine::page::{ElementRef, LoadStatus, PageQuery, PageResult};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::errors::WebDriverError;
use super::protocol;

/// A browser tab driven over the W3C WebDriver HTTP protocol
/// (chromedriver, geckodriver, a Selenium grid).
#[derive(Clone)]
pub struct WebDriverPage {
    http: Client,
    base: String,
    session: String,
}

impl WebDriverPage {
    fn client() -> Result<Client, WebDriverError> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?)
    }

    /// Opens a new browser session on the driver at `base_url`.
    #[instrument(skip(capabilities), level = "debug")]
    pub async fn new_session(base_url: &str, capabilities: Value) -> Result<Self, WebDriverError> {
        let http = Self::client()?;
        let base = base_url.trim_end_matches('/').to_string();

        let resp = http
            .post(format!("{base}/session"))
            .json(&protocol::new_session(capabilities))
            .send()
            .await?;
        let body = resp.bytes().await?;
        let session = protocol::session_id(&protocol::unwrap_value(&body)?)?;

        debug!(%session, "webdriver session opened");
        Ok(Self { http, base, session })
    }

    /// Attaches to a session that is already open, e.g. a browser the
    /// operator logged in with by hand.
    pub fn attach(base_url: &str, session: impl Into<String>) -> Result<Self, WebDriverError> {
        Ok(Self {
            http: Self::client()?,
            base: base_url.trim_end_matches('/').to_string(),
            session: session.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    pub async fn current_url(&self) -> Result<String, WebDriverError> {
        protocol::string(self.command(Method::GET, "/url", None).await?)
    }

    /// Ends the session and closes the browser.
    pub async fn close(self) -> Result<(), WebDriverError> {
        self.command(Method::DELETE, "", None).await.map(drop)
    }

    #[instrument(skip(self, body), level = "trace")]
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}{}", self.base, self.session, path);
        let req = self.http.request(method.clone(), &url);
        let req = match body {
            Some(body) => req.json(&body),
            None if method == Method::POST => req.json(&json!({})),
            None => req,
        };

        let resp = req.send().await?;
        let body = resp.bytes().await?;
        protocol::unwrap_value(&body)
    }

    async fn element_get(&self, element: &ElementRef, what: &str) -> Result<Value, WebDriverError> {
        let path = format!("/element/{}/{what}", element.as_str());
        self.command(Method::GET, &path, None).await
    }
}

#[async_trait]
impl PageQuery for WebDriverPage {
    async fn find_all(&self, selector: &str) -> PageResult<Vec<ElementRef>> {
        let v = self
            .command(Method::POST, "/elements", Some(protocol::css(selector)))
            .await?;
        Ok(protocol::elements(&v)?)
    }

    async fn find_within(&self, scope: &ElementRef, selector: &str) -> PageResult<Vec<ElementRef>> {
        let path = format!("/element/{}/elements", scope.as_str());
        let v = self
            .command(Method::POST, &path, Some(protocol::css(selector)))
            .await?;
        Ok(protocol::elements(&v)?)
    }

    async fn text(&self, element: &ElementRef) -> PageResult<String> {
        Ok(protocol::string(self.element_get(element, "text").await?)?)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> PageResult<Option<String>> {
        let v = self.element_get(element, &format!("attribute/{name}")).await?;
        Ok(protocol::optional_string(v)?)
    }

    async fn is_visible(&self, element: &ElementRef) -> PageResult<bool> {
        Ok(protocol::boolean(&self.element_get(element, "displayed").await?)?)
    }

    async fn is_checked(&self, element: &ElementRef) -> PageResult<bool> {
        Ok(protocol::boolean(&self.element_get(element, "selected").await?)?)
    }

    async fn is_enabled(&self, element: &ElementRef) -> PageResult<bool> {
        Ok(protocol::boolean(&self.element_get(element, "enabled").await?)?)
    }

    async fn click(&self, element: &ElementRef) -> PageResult<()> {
        let path = format!("/element/{}/click", element.as_str());
        self.command(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn reload(&self) -> PageResult<()> {
        self.command(Method::POST, "/refresh", None).await?;
        Ok(())
    }

    async fn load_status(&self) -> PageResult<LoadStatus> {
        let url = self.current_url().await?;
        let state = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(protocol::script("return document.readyState")),
            )
            .await?;

        Ok(LoadStatus {
            url,
            complete: state.as_str() == Some("complete"),
        })
    }
}
