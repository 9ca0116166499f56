//! Prelude module for the tunegate library
//!
//! Re-exports the items a bot front end needs to wire up the admission layer with a
//! single `use tunegate::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tunegate::prelude::*;
//!
//! # async fn example(fetcher: Arc<dyn Fetcher>, transport: Arc<dyn Transport>) -> Result<()> {
//! let store = Arc::new(SqliteStore::open("./data/database.db").await?);
//! let context = AppContext::new(ContextConfig::default(), store, fetcher, transport);
//!
//! let eligibility = context.quota_status(42).await?;
//! println!("can download: {}", eligibility.can_download);
//! # Ok(())
//! # }
//! ```

// Core result types
pub use crate::errors::{AppError, DownloadError, FetchFailure, Result};

// Components and their configuration
pub use crate::app::{
    AppContext, ContextConfig, DownloadOrchestrator, DownloadReceipt, JanitorConfig,
    JanitorScheduler, QuotaCoordinator, RateLimiter, SearchPage, Selection, SessionCache,
    SessionScope,
};

// Collaborator seams and stores
pub use crate::app::{
    DeliveryMetadata, DownloadStore, FetchRequest, Fetcher, MemoryStore, Publisher,
    SqliteStore, TopChartPublisher, Transport,
};

// Data types
pub use crate::app::{ConsumptionPath, Eligibility, Period, Track, UserId};

// Configuration loading
pub use crate::config::{AppConfig, RuntimeConfig};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
