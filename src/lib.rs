pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod detail;
pub mod diagnostics;
pub mod discovery;
pub mod domain_utils;
pub mod driver;
pub mod email;
pub mod enrich;
pub mod export;
pub mod extract;
pub mod input;
pub mod logger;
pub mod pacing;
pub mod pipeline;
pub mod result_sink;
pub mod retry;

pub use config::AppConfig;
pub use detail::{DetailRecord, FetchOutcome};
pub use driver::{BrowserSession, Locator, Page, PageDriver};
