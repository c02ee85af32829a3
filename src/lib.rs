pub mod config;
pub mod error;
pub mod history;
pub mod monitor;
pub mod presenter;
pub mod requests;
pub mod scheduler;
pub mod scraping_context;
pub mod timeline;
pub mod timeline_scraper;

mod text_manipulators;

pub use config::MonitorConfig;
pub use error::{Field, MonitorError};
pub use history::{ArchiveOutcome, HistoryStore};
pub use monitor::{Monitor, RefreshOutcome, RefreshStatus};
pub use requests::{PageSource, RelayFetcher};
pub use scheduler::{ManualRefresh, Scheduler};
pub use scraping_context::ScrapingContext;
pub use timeline::{CompletedCount, CompletedEntry, PendingEntry, Snapshot};
