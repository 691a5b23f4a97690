//! Shared types for the check-in engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use super::error::CheckinError;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for member IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MemberId(pub i64);

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing tag attached to every resolution on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ResolutionToken(pub u64);

impl std::fmt::Display for ResolutionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Member as seen by the check-in engine. Owned by the member directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: MemberId,
    pub display_name: String,
    pub card_identifier: String,
}

/// How a visit came to be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitSource {
    /// Automatic check-in from a single-match scan
    Scan,
    /// Operator picked the member from a disambiguation list
    Manual,
}

impl VisitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitSource::Scan => "scan",
            VisitSource::Manual => "manual",
        }
    }
}

/// One visit in the ledger. Owned by the visit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub member_id: MemberId,
    pub logged_at: DateTime<Utc>,
    pub source: VisitSource,
}

impl VisitRecord {
    pub fn new(member_id: MemberId, source: VisitSource) -> Self {
        Self { member_id, logged_at: Utc::now(), source }
    }
}

/// Buffer content captured at the moment resolution begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate(String);

impl Candidate {
    /// Only the scan buffer captures candidates, so the content is always digits
    pub(crate) fn capture(digits: String) -> Self {
        Self(digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a candidate against the member directory
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch,
    SingleMatch(MemberRef),
    MultipleMatches(Vec<MemberRef>),
}

impl MatchResult {
    /// Classify a lookup result. `members` must already be ranked; only the
    /// first `max_candidates` are kept for presentation.
    pub fn classify(mut members: Vec<MemberRef>, max_candidates: usize) -> Self {
        match members.len() {
            0 => MatchResult::NoMatch,
            1 => MatchResult::SingleMatch(members.remove(0)),
            _ => {
                members.truncate(max_candidates.max(2));
                MatchResult::MultipleMatches(members)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchResult::NoMatch => "no_match",
            MatchResult::SingleMatch(_) => "single_match",
            MatchResult::MultipleMatches(_) => "multiple_matches",
        }
    }
}

/// Lifecycle state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Accumulating,
    Resolving,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Accumulating => "accumulating",
            SessionState::Resolving => "resolving",
        }
    }
}

/// Point-in-time view of the live session on a check-in surface
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub buffer: String,
    pub started_at: Option<Instant>,
    pub last_digit_at: Option<Instant>,
    pub state: SessionState,
}

/// Inbound commands from the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    /// A single keystroke. Non-digits are ignored by the engine.
    Digit(char),
    Cancel,
    /// Pick a member from the disambiguation list
    Select(MemberId),
    /// Re-issue the visit write that last failed
    RetryVisit,
}

/// Outbound notifications to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum CheckinNotification {
    Idle,
    Accumulating { len: usize },
    /// Offer to create a new member for this card
    NoMatch { candidate: String },
    /// Visit recorded; navigate to the member
    SingleMatchResolved { member_id: MemberId },
    MultipleMatches { members: Vec<MemberRef> },
    /// Disambiguation pick without a visit
    Navigate { member_id: MemberId },
    Error {
        #[serde(serialize_with = "serialize_error")]
        error: CheckinError,
        retry: bool,
    },
}

fn serialize_error<S>(error: &CheckinError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(error)
}

impl CheckinNotification {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinNotification::Idle => "idle",
            CheckinNotification::Accumulating { .. } => "accumulating",
            CheckinNotification::NoMatch { .. } => "no_match",
            CheckinNotification::SingleMatchResolved { .. } => "single_match_resolved",
            CheckinNotification::MultipleMatches { .. } => "multiple_matches",
            CheckinNotification::Navigate { .. } => "navigate",
            CheckinNotification::Error { .. } => "error",
        }
    }
}
