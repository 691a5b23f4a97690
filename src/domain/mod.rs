//! Domain models - core check-in types
//!
//! This module contains the canonical data types used throughout the engine:
//! - `MemberRef` / `VisitRecord` - records owned by external collaborators
//! - `Candidate` / `MatchResult` - what a scan resolves to
//! - `SurfaceCommand` / `CheckinNotification` - the presentation contract
//! - `CheckinError` - failures reported to the user

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::CheckinError;
pub use types::{
    CheckinNotification, MatchResult, MemberId, MemberRef, ResolutionToken, SessionState,
    SurfaceCommand, VisitRecord, VisitSource,
};
