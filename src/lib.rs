pub mod broker;
pub mod cli;
pub mod config;
pub mod health;
pub mod logging;
pub mod mirror;
pub mod models;
pub mod network;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod url_utils;

// Re-export main types for library usage
pub use broker::{BrokerError, QueueManager};
pub use config::{ConfigError, Settings};
pub use health::{Check, CheckStatus, HealthCheck};
pub use models::{Job, Response};
pub use network::{CrawlError, Crawler};
pub use parser::extract_links;
pub use state::{CrawlStatus, StoreError, UrlStore};
