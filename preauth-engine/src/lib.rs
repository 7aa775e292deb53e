//! Preauthorization engine for durable medical equipment orders
//!
//! Decides whether an order needs carrier preauthorization, checks
//! eligibility, writes the medical necessity letter, submits through the
//! carrier's channel and follows the request to a terminal status:
//! - Rule resolution with wildcards, priority and quantity thresholds
//! - Eligibility from cache, real-time check, or assumption flagged for staff
//! - Submission over carrier API, EDI 278, portal hand-off, fax or staff queue
//! - Scheduled retry, status and expiry sweeps that are safe to overlap
//! - An append-only audit trail for every transition
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = PreauthOrchestrator::new(config, EngineDeps {
//!     store: Arc::new(PgPreauthStore::new(pool.clone())),
//!     orders: Arc::new(PgOrderSource::new(pool.clone())),
//!     rules: Arc::new(PgRuleRepository::new(pool.clone())),
//!     eligibility_cache: Arc::new(PgEligibilityCache::new(pool)),
//!     real_time_eligibility: None,
//!     text_generator: None,
//!     router,
//!     notifiers: vec![Arc::new(TracingNotifier)],
//!     clock: Arc::new(SystemClock),
//! })?;
//!
//! let outcome = orchestrator.process_order(order_id).await?;
//! let report = orchestrator.run_retry_sweep().await?;
//! ```

pub mod clock;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod necessity;
pub mod notify;
pub mod orchestrator;
pub mod rules;
pub mod state;
pub mod store;
pub mod submission;
pub mod sweeps;

pub use clock::*;
pub use eligibility::*;
pub use error::*;
pub use models::*;
pub use necessity::*;
pub use notify::*;
pub use orchestrator::*;
pub use rules::*;
pub use state::*;
pub use store::*;
pub use submission::*;
