//! Check-in error types surfaced to the presentation layer

use super::types::MemberId;
use thiserror::Error;

/// Failures a check-in surface reports through `onError`.
///
/// Non-digit input and stale completions are not errors: the first is
/// ignored by the scan buffer, the second is dropped by the surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckinError {
    /// Member directory call failed or timed out. The scan is discarded and
    /// the user has to rescan.
    #[error("member lookup failed: {reason}")]
    LookupFailure { reason: String },

    /// Identity was resolved but the visit could not be persisted
    #[error("visit write failed for member {member_id}: {reason}")]
    LedgerWriteFailure { member_id: MemberId, reason: String },
}

impl CheckinError {
    /// Whether the surface offers an explicit retry for this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckinError::LedgerWriteFailure { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinError::LookupFailure { .. } => "lookup_failure",
            CheckinError::LedgerWriteFailure { .. } => "ledger_write_failure",
        }
    }
}
