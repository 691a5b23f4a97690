//! External collaborators consumed by the check-in engine
//!
//! Adapters live next to this module; tests substitute their own stubs.

use crate::domain::{MemberId, MemberRef, VisitRecord, VisitSource};
use async_trait::async_trait;

/// Member lookup by card identifier fragment
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Members whose card identifier contains `fragment` (not strict equality:
    /// a scanned code may be shorter than, or part of, the stored identifier).
    async fn find_by_card_fragment(&self, fragment: &str) -> anyhow::Result<Vec<MemberRef>>;
}

/// Append-only store of member visits
#[async_trait]
pub trait VisitLedger: Send + Sync {
    async fn record_visit(
        &self,
        member_id: MemberId,
        source: VisitSource,
    ) -> anyhow::Result<VisitRecord>;
}
