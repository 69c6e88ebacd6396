//! Error types for browser-driven playlist collection
//!
//! Two layers are kept apart here: `SessionError` describes what went wrong
//! talking to the remote browser, `CollectionError` is the typed per-list
//! failure the collector hands back to its caller.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a browser session binding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Element is no longer attached to the document: {handle}")]
    StaleElement { handle: String },

    #[error("No element matches selector '{selector}'")]
    NoSuchElement { selector: String },

    #[error("Timed out after {waited_ms}ms waiting for '{selector}'")]
    Timeout { selector: String, waited_ms: u64 },

    #[error("Script execution failed: {message}")]
    Script { message: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Operation not supported by this session: {operation}")]
    Unsupported { operation: String },
}

impl SessionError {
    pub fn stale(handle: impl Into<String>) -> Self {
        Self::StaleElement {
            handle: handle.into(),
        }
    }

    pub fn no_such_element(selector: impl Into<String>) -> Self {
        Self::NoSuchElement {
            selector: selector.into(),
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Element or container was invalidated between read and use
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Check if this error can be absorbed by re-locating or skipping
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::StaleElement { .. } => true,
            Self::NoSuchElement { .. } => true,
            Self::Script { .. } => true,
            Self::Timeout { .. } => false,
            Self::Navigation { .. } => false,
            Self::Unsupported { .. } => false,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Fatal, per-list collection failures
///
/// Everything recoverable (stale rows, failed scroll steps, unparseable rows)
/// is absorbed inside the collector and never surfaces as one of these.
#[derive(Error, Debug, Clone)]
pub enum CollectionError {
    #[error("No scroll container found (tried: {})", .tried_selectors.join(", "))]
    ContainerMissing { tried_selectors: Vec<String> },

    #[error("Timed out after {}s waiting for the track list at {url}", .waited.as_secs())]
    Timeout { url: String, waited: Duration },

    #[error("Failed to open {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: SessionError,
    },

    #[error("Invalid playlist reference: '{reference}'")]
    InvalidReference { reference: String },

    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl CollectionError {
    pub fn container_missing(tried_selectors: &[String]) -> Self {
        Self::ContainerMissing {
            tried_selectors: tried_selectors.to_vec(),
        }
    }

    /// Only the scroll-loop failures; the rest happen before scrolling starts
    pub fn is_scroll_failure(&self) -> bool {
        matches!(self, Self::ContainerMissing { .. } | Self::Timeout { .. })
    }
}

pub type CollectResult<T> = Result<T, CollectionError>;
