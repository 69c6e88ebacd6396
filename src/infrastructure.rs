//! Infrastructure layer for the browser seam, parsing, scrolling and configuration
//!
//! Everything that touches the remote document lives here; the application
//! layer only sees typed records and metrics.

pub mod browser;
pub mod collection_error;
pub mod config;
pub mod logging;
pub mod parsing;
pub mod scroll_controller;

// Re-export commonly used items
pub use browser::{BrowserSession, ElementHandle, ScriptArg};
pub use collection_error::{CollectResult, CollectionError, SessionError, SessionResult};
pub use config::{AppConfig, CollectorConfig, ConfigManager, LoggingConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config, log_system_info};
pub use parsing::{MetadataProber, SelectorConfig, TrackRowParser};
pub use scroll_controller::{ScrollController, ScrollMetrics, ScrollStrategy};
