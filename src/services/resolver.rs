//! Match resolver
//!
//! Looks a captured candidate up in the member directory and classifies
//! the outcome. Directory failures and timeouts become
//! [`CheckinError::LookupFailure`]; they never leave the resolver as panics
//! or raw adapter errors.

use crate::domain::types::Candidate;
use crate::domain::{CheckinError, MatchResult, MemberRef};
use crate::infra::Config;
use crate::io::MemberDirectory;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct MatchResolver {
    directory: Arc<dyn MemberDirectory>,
    lookup_timeout: Duration,
    max_candidates: usize,
}

impl MatchResolver {
    pub fn new(config: &Config, directory: Arc<dyn MemberDirectory>) -> Self {
        Self {
            directory,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms()),
            max_candidates: config.max_candidates(),
        }
    }

    /// Resolve a candidate against the directory
    pub async fn resolve(&self, candidate: &Candidate) -> Result<MatchResult, CheckinError> {
        let lookup = self.directory.find_by_card_fragment(candidate.as_str());
        let members = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(members)) => members,
            Ok(Err(e)) => {
                warn!(candidate_len = %candidate.len(), error = %format!("{:#}", e), "lookup_failed");
                return Err(CheckinError::LookupFailure { reason: format!("{:#}", e) });
            }
            Err(_) => {
                warn!(
                    candidate_len = %candidate.len(),
                    timeout_ms = %self.lookup_timeout.as_millis(),
                    "lookup_timed_out"
                );
                return Err(CheckinError::LookupFailure {
                    reason: format!("timed out after {}ms", self.lookup_timeout.as_millis()),
                });
            }
        };

        let found = members.len();
        let result = MatchResult::classify(rank(candidate.as_str(), members), self.max_candidates);
        debug!(found = %found, result = %result.as_str(), "candidate_classified");
        Ok(result)
    }
}

/// Order matches by relevance: exact card first, then prefix matches, then
/// the rest. Directory order is kept within each rank.
fn rank(candidate: &str, mut members: Vec<MemberRef>) -> Vec<MemberRef> {
    members.sort_by_key(|m| {
        if m.card_identifier == candidate {
            0u8
        } else if m.card_identifier.starts_with(candidate) {
            1
        } else {
            2
        }
    });
    members
}
