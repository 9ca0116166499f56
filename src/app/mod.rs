//! Core application logic for tunegate
//!
//! This module contains the request admission and download coordination layer:
//! the per-user session cache, the search rate limiter, quota bookkeeping, the
//! download orchestrator and the background janitor.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunegate::app::{AppContext, ContextConfig, MemoryStore, Selection};
//! # use tunegate::app::{Fetcher, Transport};
//!
//! # async fn example(fetcher: Arc<dyn Fetcher>, transport: Arc<dyn Transport>) {
//! let context = AppContext::new(
//!     ContextConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     fetcher,
//!     transport,
//! );
//!
//! if context.admit_search(42).await.allowed {
//!     // ... run the search, then cache its results
//!     context.remember_search(42, "lofi beats", Vec::new()).await;
//! }
//!
//! match context.select(42, Selection::search(1)).await {
//!     Ok(receipt) => println!("Delivered {}", receipt.track),
//!     Err(e) => println!("{}", e.user_message()),
//! }
//! # }
//! ```

pub mod collaborators;
pub mod context;
pub mod janitor;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod quota;
pub mod session;
pub mod storage;

// Re-export main public API
pub use collaborators::{DownloadStore, FetchRequest, Fetcher, Publisher, Transport};
pub use context::{AppContext, ContextConfig, SearchPage};
pub use janitor::{JanitorConfig, JanitorScheduler, SweepReport, SweepTargets, TopChartPublisher};
pub use limiter::{RateDecision, RateLimitConfig, RateLimiter, RateStats};
pub use models::{
    ConsumptionPath, DeliveryId, DeliveryMetadata, DownloadJob, DownloadRecord, Period,
    PremiumStatus, QuotaState, SearchSession, TopTrack, Track, UserId,
};
pub use orchestrator::{DownloadOrchestrator, DownloadReceipt, OrchestratorConfig, Selection};
pub use quota::{Eligibility, QuotaConfig, QuotaCoordinator};
pub use session::{SessionCache, SessionConfig, SessionKey, SessionScope};
pub use storage::{MemoryStore, SqliteStore, StorageConfig};
