//! Page acquisition strategies.
//!
//! Adapters never talk to the network directly; they describe the page they
//! need as a [`PageRequest`] and hand it to a [`PageFetcher`]. Two strategies
//! are provided:
//!
//! - [`HttpFetcher`] issues a plain GET or form POST and returns the body.
//! - [`RenderedFetcher`] asks a headless-browser rendering service to load the
//!   page, wait for a selector and return the rendered DOM. It is needed for
//!   carriers whose timeline is drawn client-side. A [`Reveal`] step expands
//!   a collapsed region by clicking its toggle before the DOM is captured.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::json;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::AdapterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMethod {
    Get,
    /// Submit a URL-encoded form, as a carrier's search box would.
    PostForm(Vec<(String, String)>),
}

/// Description of the page an adapter wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub method: PageMethod,
    /// CSS selector that must be visible before a rendered page counts as
    /// loaded. Ignored by plain HTTP fetching.
    pub wait_for: Option<String>,
    /// Expand a collapsed region first. Rendered fetching only.
    pub reveal: Option<Reveal>,
}

/// A region that may load collapsed behind a clickable toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    /// Selector of the region that has to be visible.
    pub target: String,
    /// Selector of the element clicked when `target` is hidden. The first
    /// match is used.
    pub toggle: String,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: PageMethod::Get,
            wait_for: None,
            reveal: None,
        }
    }

    pub fn post_form<K, V>(url: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            url: url.into(),
            method: PageMethod::PostForm(
                fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ),
            wait_for: None,
            reveal: None,
        }
    }

    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    pub fn reveal(mut self, target: impl Into<String>, toggle: impl Into<String>) -> Self {
        self.reveal = Some(Reveal {
            target: target.into(),
            toggle: toggle.into(),
        });
        self
    }
}

/// Fetch raw carrier markup.
#[async_trait]
pub trait PageFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, request: &PageRequest) -> Result<String, AdapterError>;
}

const USER_AGENT: &str = concat!("trackeame/", env!("CARGO_PKG_VERSION"));

fn build_client(builder: ClientBuilder) -> Result<Client, AdapterError> {
    builder
        .build()
        .map_err(|e| AdapterError::ClientSetup(e.to_string()))
}

fn http_client(timeout: Duration) -> Result<Client, AdapterError> {
    build_client(Client::builder().user_agent(USER_AGENT).timeout(timeout))
}

/// Bodies of these statuses are still handed to the adapter, which knows how
/// the carrier words "not found".
fn is_readable(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

async fn read_body(
    url: &str,
    timeout: Duration,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<String, AdapterError> {
    let response = response.map_err(|e| with_deadline(AdapterError::fetch(url, e), timeout))?;
    let status = response.status();
    if !is_readable(status) {
        return Err(AdapterError::FetchFailure {
            url: url.to_owned(),
            message: format!("unexpected HTTP status {status}"),
        });
    }
    response
        .text()
        .await
        .map_err(|e| with_deadline(AdapterError::fetch(url, e), timeout))
}

fn with_deadline(err: AdapterError, timeout: Duration) -> AdapterError {
    match err {
        AdapterError::FetchTimeout { url, .. } => AdapterError::FetchTimeout { url, after: timeout },
        other => other,
    }
}

/// Plain HTTP acquisition.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: http_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, AdapterError> {
        debug!(url = %request.url, "fetching carrier page");
        let builder = match &request.method {
            PageMethod::Get => self.client.get(&request.url),
            PageMethod::PostForm(fields) => self.client.post(&request.url).form(fields),
        };
        read_body(&request.url, self.timeout, builder.send().await).await
    }
}

/// A held slot in the renderer's page budget.
///
/// The slot is returned when the guard is dropped, which also happens when
/// the owning future is cancelled by a job timeout.
pub struct RenderPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl fmt::Debug for RenderPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPermit").finish()
    }
}

/// Runs on the rendering service for requests with a [`Reveal`] step.
///
/// When the target is missing or hidden, the first toggle match is clicked
/// and the target must then become visible. A page with neither element is
/// returned as is, so the adapter can read the carrier's "not found" copy.
const REVEAL_SCRIPT: &str = r#"export default async function ({ page, context }) {
  const { url, target, toggle, gotoTimeout, waitTimeout } = context;
  await page.goto(url, { waitUntil: "domcontentloaded", timeout: gotoTimeout });
  await page.waitForSelector(`${target}, ${toggle}`, { timeout: waitTimeout }).catch(() => null);
  const region = await page.$(target);
  if (!region || !(await region.isVisible())) {
    const button = await page.$(toggle);
    if (button) {
      await button.click();
      await page.waitForSelector(target, { visible: true, timeout: waitTimeout });
    }
  }
  return { data: await page.content(), type: "text/html" };
}"#;

/// Acquisition through a headless-browser rendering service.
///
/// The service speaks the browserless HTTP API. Plain requests go to
/// `/content`, which loads the URL, waits for the `wait_for` selector to be
/// visible and returns the rendered HTML. Requests with a [`Reveal`] step go
/// to `/function`, which runs the expand script against the page. Either way
/// the browser page lives exactly as long as the HTTP exchange, so dropping
/// the request (error, timeout or cancellation) closes it on the service side.
#[derive(Debug, Clone)]
pub struct RenderedFetcher {
    client: Client,
    base_url: String,
    wait_timeout: Duration,
    timeout: Duration,
    pages: Arc<Semaphore>,
}

impl RenderedFetcher {
    /// * `base_url`     – root URL of the rendering service.
    /// * `capacity`     – concurrent pages allowed on the service.
    /// * `wait_timeout` – how long the service waits for a selector.
    /// * `timeout`      – whole-exchange deadline, navigation included.
    pub fn new(
        base_url: impl Into<String>,
        capacity: usize,
        wait_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
            wait_timeout,
            timeout,
            pages: Arc::new(Semaphore::new(capacity.max(1))),
        })
    }

    fn route(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url.trim_end_matches('/'))
    }

    /// Wait for a free page slot.
    pub async fn acquire(&self) -> Result<RenderPermit, AdapterError> {
        Arc::clone(&self.pages)
            .acquire_owned()
            .await
            .map(|permit| RenderPermit { permit })
            .map_err(|_| AdapterError::FetchFailure {
                url: self.base_url.clone(),
                message: "renderer page pool closed".to_owned(),
            })
    }

    /// Free page slots right now.
    pub fn available_pages(&self) -> usize {
        self.pages.available_permits()
    }

    fn render_body(&self, request: &PageRequest) -> serde_json::Value {
        let mut body = json!({
            "url": request.url,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.timeout.as_millis() as u64,
            },
        });
        if let Some(selector) = &request.wait_for {
            body["waitForSelector"] = json!({
                "selector": selector,
                "visible": true,
                "timeout": self.wait_timeout.as_millis() as u64,
            });
        }
        body
    }

    fn reveal_body(&self, request: &PageRequest, reveal: &Reveal) -> serde_json::Value {
        json!({
            "code": REVEAL_SCRIPT,
            "context": {
                "url": request.url,
                "target": reveal.target,
                "toggle": reveal.toggle,
                "gotoTimeout": self.timeout.as_millis() as u64,
                "waitTimeout": self.wait_timeout.as_millis() as u64,
            },
        })
    }
}

#[async_trait]
impl PageFetcher for RenderedFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<String, AdapterError> {
        if request.method != PageMethod::Get {
            return Err(AdapterError::FetchFailure {
                url: request.url.clone(),
                message: "the renderer only performs GET navigation".to_owned(),
            });
        }

        let _page = self.acquire().await?;
        let (route, body) = match &request.reveal {
            Some(reveal) => (self.route("function"), self.reveal_body(request, reveal)),
            None => (self.route("content"), self.render_body(request)),
        };
        debug!(url = %request.url, %route, wait_for = ?request.wait_for, "rendering carrier page");

        let response = self.client.post(&route).json(&body).send().await;
        read_body(&request.url, self.timeout, response).await
    }
}
