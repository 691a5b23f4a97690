//! Resolution dispatcher
//!
//! Maps a classified match to the action the surface takes, and performs
//! the visit writes those actions call for.

use crate::domain::types::Candidate;
use crate::domain::{CheckinError, MatchResult, MemberId, MemberRef, VisitRecord, VisitSource};
use crate::infra::{Config, SelectionMode};
use crate::io::VisitLedger;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What the surface does with a lookup result
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    /// Single match: record a visit, then navigate
    RecordVisit(MemberRef),
    /// No match: offer to create a member with this card
    OfferCreate(Candidate),
    /// Several matches: let the operator pick
    ShowDisambiguation(Vec<MemberRef>),
}

/// What the surface does with a disambiguation pick
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionAction {
    Navigate(MemberId),
    RecordVisit(MemberRef),
}

#[derive(Clone)]
pub struct ResolutionDispatcher {
    mode: SelectionMode,
    ledger: Arc<dyn VisitLedger>,
    ledger_timeout: Duration,
}

impl ResolutionDispatcher {
    pub fn new(config: &Config, ledger: Arc<dyn VisitLedger>) -> Self {
        Self {
            mode: config.selection_mode(),
            ledger,
            ledger_timeout: Duration::from_millis(config.ledger_timeout_ms()),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn dispatch(&self, candidate: Candidate, result: MatchResult) -> DispatchAction {
        match result {
            MatchResult::NoMatch => DispatchAction::OfferCreate(candidate),
            MatchResult::SingleMatch(member) => DispatchAction::RecordVisit(member),
            MatchResult::MultipleMatches(members) => DispatchAction::ShowDisambiguation(members),
        }
    }

    /// Resolve a pick against the list that was offered. Returns `None` when
    /// `member_id` is not in `choices`.
    pub fn select(&self, choices: &[MemberRef], member_id: MemberId) -> Option<SelectionAction> {
        let member = choices.iter().find(|m| m.id == member_id)?;
        Some(match self.mode {
            SelectionMode::Navigate => SelectionAction::Navigate(member.id),
            SelectionMode::CheckIn => SelectionAction::RecordVisit(member.clone()),
        })
    }

    /// Append a visit to the ledger
    pub async fn record_visit(
        &self,
        member_id: MemberId,
        source: VisitSource,
    ) -> Result<VisitRecord, CheckinError> {
        let write = self.ledger.record_visit(member_id, source);
        match tokio::time::timeout(self.ledger_timeout, write).await {
            Ok(Ok(record)) => {
                info!(member_id = %member_id, source = %source.as_str(), "visit_recorded");
                Ok(record)
            }
            Ok(Err(e)) => {
                warn!(member_id = %member_id, error = %format!("{:#}", e), "visit_write_failed");
                Err(CheckinError::LedgerWriteFailure { member_id, reason: format!("{:#}", e) })
            }
            Err(_) => {
                warn!(
                    member_id = %member_id,
                    timeout_ms = %self.ledger_timeout.as_millis(),
                    "visit_write_timed_out"
                );
                Err(CheckinError::LedgerWriteFailure {
                    member_id,
                    reason: format!("timed out after {}ms", self.ledger_timeout.as_millis()),
                })
            }
        }
    }
}
