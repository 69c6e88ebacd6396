//! Browser session seam
//!
//! The collector never talks to a concrete WebDriver binding. It consumes
//! this trait, which mirrors the handful of capabilities the scroll loop
//! needs: navigation, element lookup, element reads, script execution and
//! bounded waits. Bindings translate their own "stale element" failures into
//! [`SessionError::StaleElement`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::collection_error::{SessionError, SessionResult};

/// Opaque reference to an element inside the remote document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Argument passed to [`BrowserSession::execute_script`] as `arguments[i]`
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Element(ElementHandle),
    Number(f64),
}

impl From<&ElementHandle> for ScriptArg {
    fn from(handle: &ElementHandle) -> Self {
        Self::Element(handle.clone())
    }
}

impl From<u32> for ScriptArg {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

/// Capabilities consumed from the browser binding
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> SessionResult<()>;

    async fn current_url(&self) -> SessionResult<String>;

    async fn title(&self) -> SessionResult<String>;

    /// All elements in the document matching `selector`, possibly empty
    async fn find_elements(&self, selector: &str) -> SessionResult<Vec<ElementHandle>>;

    /// Descendants of `parent` matching `selector`, possibly empty
    async fn find_elements_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> SessionResult<Vec<ElementHandle>>;

    /// Rendered text of the element
    async fn text(&self, element: &ElementHandle) -> SessionResult<String>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>>;

    async fn screenshot_png(&self, element: &ElementHandle) -> SessionResult<Vec<u8>>;

    async fn click(&self, element: &ElementHandle) -> SessionResult<()>;

    /// Simulated pointer move onto the element followed by a click
    async fn move_and_click(&self, element: &ElementHandle) -> SessionResult<()>;

    async fn execute_script(&self, script: &str, args: &[ScriptArg]) -> SessionResult<Value>;

    /// Blocks until `selector` matches something or `timeout` elapses
    async fn wait_for(&self, selector: &str, timeout: Duration) -> SessionResult<()>;

    async fn find_element(&self, selector: &str) -> SessionResult<ElementHandle> {
        self.find_elements(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::no_such_element(selector))
    }

    async fn find_element_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> SessionResult<ElementHandle> {
        self.find_elements_in(parent, selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::no_such_element(selector))
    }
}

/// Trimmed text of the first element matching any selector, in order
pub async fn first_text(session: &dyn BrowserSession, selectors: &[String]) -> Option<String> {
    for selector in selectors {
        let Ok(element) = session.find_element(selector).await else {
            continue;
        };
        if let Ok(text) = session.text(&element).await {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}
