//! Services - the check-in engine
//!
//! This module contains the engine components:
//! - `scan_buffer` - Digit accumulation and idle timeout governor
//! - `resolver` - Classifies a candidate against the member directory
//! - `dispatcher` - Turns a classification into an action and writes visits
//! - `guard` - Lease-based concurrency guard over resolutions
//! - `surface` - Per-surface event loop wiring the above together

pub mod dispatcher;
pub mod guard;
pub mod resolver;
pub mod scan_buffer;
pub mod surface;

// Re-export commonly used types
pub use dispatcher::{DispatchAction, ResolutionDispatcher, SelectionAction};
pub use guard::{ConcurrencyGuard, LeaseStore, MemoryLeaseStore, PersistedLease};
pub use resolver::MatchResolver;
pub use scan_buffer::{FeedOutcome, IdleOutcome, ScanBuffer};
pub use surface::CheckinSurface;
