//! Command, timer and completion handlers for the CheckinSurface
//!
//! Handlers run on the surface loop only. Anything that can suspend (lookups,
//! ledger writes) is spawned and comes back through `handle_completion`.

use super::{CheckinSurface, Completion};
use crate::domain::types::Candidate;
use crate::domain::{
    CheckinError, CheckinNotification, MatchResult, MemberId, MemberRef, ResolutionToken,
    VisitRecord, VisitSource,
};
use crate::services::dispatcher::{DispatchAction, SelectionAction};
use crate::services::scan_buffer::{FeedOutcome, IdleOutcome};
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl CheckinSurface {
    /// Feed one keystroke from the input source
    pub fn feed_digit(&mut self, ch: char) {
        let now = Instant::now();
        match self.buffer.feed(ch, now) {
            FeedOutcome::Ignored => {}
            FeedOutcome::Accumulating(len) => {
                self.notify.send(CheckinNotification::Accumulating { len });
            }
            FeedOutcome::Complete(candidate) => {
                self.notify.send(CheckinNotification::Accumulating { len: candidate.len() });
                self.begin_resolution(candidate, now);
            }
        }
    }

    /// Idle timer wakeup. A wakeup before the deadline, or against an empty
    /// buffer, does nothing.
    pub fn on_timeout(&mut self) {
        let now = Instant::now();
        match self.buffer.on_idle(now) {
            IdleOutcome::NotDue => {}
            IdleOutcome::Discarded(len) => {
                self.metrics.record_scan_discarded();
                info!(len = %len, "scan_discarded");
                self.notify_idle_if_quiet();
            }
            IdleOutcome::Complete(candidate) => self.begin_resolution(candidate, now),
        }
    }

    /// Explicit cancel. Clears the session at once and invalidates whatever is
    /// in flight; its completion will be dropped as stale.
    pub fn cancel(&mut self) {
        let discarded = self.buffer.clear();
        let abandoned = self.in_flight.take();
        self.guard.force_release();
        self.pending_choices.clear();
        self.pending_retry = None;
        self.metrics.record_cancel();

        info!(
            discarded_len = %discarded,
            abandoned_token = %abandoned.map(|t| t.0).unwrap_or(0),
            "scan_cancelled"
        );
        self.notify.send(CheckinNotification::Idle);
    }

    /// Pick a member from the disambiguation list
    pub fn select_candidate(&mut self, member_id: MemberId) {
        if self.pending_choices.is_empty() {
            debug!(member_id = %member_id, "selection_without_choices");
            return;
        }

        match self.dispatcher.select(&self.pending_choices, member_id) {
            None => {
                warn!(member_id = %member_id, offered = %self.pending_choices.len(), "selection_not_offered");
            }
            Some(SelectionAction::Navigate(member_id)) => {
                info!(member_id = %member_id, "candidate_selected");
                self.close_session();
                self.notify.send(CheckinNotification::Navigate { member_id });
            }
            Some(SelectionAction::RecordVisit(member)) => {
                info!(member_id = %member.id, "candidate_selected");
                if self.begin_visit_write(member, VisitSource::Manual, Instant::now()) {
                    self.pending_choices.clear();
                }
            }
        }
    }

    /// Re-issue the visit write that last failed
    pub fn retry_visit(&mut self) {
        let Some((member, source)) = self.pending_retry.take() else {
            debug!("retry_without_failure");
            return;
        };

        info!(member_id = %member.id, source = %source.as_str(), "visit_retry_requested");
        if !self.begin_visit_write(member.clone(), source, Instant::now()) {
            self.pending_retry = Some((member, source));
        }
    }

    /// Apply a lookup or ledger completion, unless it is stale
    pub(crate) fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Lookup { token, candidate, result, latency_ms } => {
                if self.is_stale(token) {
                    return;
                }
                self.handle_lookup(token, candidate, result, latency_ms);
            }
            Completion::Ledger { token, member, source, result } => {
                if self.is_stale(token) {
                    return;
                }
                self.handle_visit_written(token, member, source, result);
            }
        }
    }

    fn handle_lookup(
        &mut self,
        token: ResolutionToken,
        candidate: Candidate,
        result: Result<MatchResult, CheckinError>,
        latency_ms: u64,
    ) {
        self.metrics.record_lookup(latency_ms, result.as_ref().ok());
        let result = match result {
            Ok(result) => result,
            Err(error) => {
                self.finish(token);
                self.close_session();
                self.notify.send(CheckinNotification::Error { error, retry: false });
                self.notify_idle_if_quiet();
                return;
            }
        };

        info!(token = %token, result = %result.as_str(), latency_ms = %latency_ms, "lookup_completed");

        match self.dispatcher.dispatch(candidate, result) {
            DispatchAction::RecordVisit(member) => {
                // Guard stays held until the write lands
                self.spawn_visit_write(token, member, VisitSource::Scan);
            }
            DispatchAction::OfferCreate(candidate) => {
                self.finish(token);
                self.close_session();
                self.notify.send(CheckinNotification::NoMatch { candidate: candidate.to_string() });
            }
            DispatchAction::ShowDisambiguation(members) => {
                // Session stays open until a pick, a cancel or a newer scan
                self.finish(token);
                self.pending_choices = members.clone();
                self.notify.send(CheckinNotification::MultipleMatches { members });
            }
        }
    }

    fn handle_visit_written(
        &mut self,
        token: ResolutionToken,
        member: MemberRef,
        source: VisitSource,
        result: Result<VisitRecord, CheckinError>,
    ) {
        self.finish(token);
        match result {
            Ok(record) => {
                self.metrics.record_visit();
                self.close_session();
                self.notify.send(CheckinNotification::SingleMatchResolved {
                    member_id: record.member_id,
                });
            }
            Err(error) => {
                self.metrics.record_ledger_failure();
                self.pending_retry = Some((member, source));
                self.notify.send(CheckinNotification::Error { error, retry: true });
            }
        }
    }

    /// Enter the guard and start a lookup for `candidate`. A rejected entry
    /// drops the scan without touching the resolution already in flight.
    fn begin_resolution(&mut self, candidate: Candidate, now: Instant) {
        let Some(token) = self.enter_guard(now) else {
            return;
        };

        // A newer completed scan supersedes any open list or failed write
        self.pending_choices.clear();
        self.pending_retry = None;
        self.metrics.record_resolution_started();
        info!(token = %token, candidate_len = %candidate.len(), "resolution_started");
        debug!(token = %token, candidate = %candidate, "resolution_candidate");

        let resolver = self.resolver.clone();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = resolver.resolve(&candidate).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            if tx.send(Completion::Lookup { token, candidate, result, latency_ms }).await.is_err() {
                debug!(token = %token, "surface_closed_before_lookup_completed");
            }
        });
    }

    /// Enter the guard and write a visit outside the scan path (picks, retries)
    fn begin_visit_write(&mut self, member: MemberRef, source: VisitSource, now: Instant) -> bool {
        let Some(token) = self.enter_guard(now) else {
            return false;
        };
        self.spawn_visit_write(token, member, source);
        true
    }

    fn spawn_visit_write(&mut self, token: ResolutionToken, member: MemberRef, source: VisitSource) {
        let dispatcher = self.dispatcher.clone();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = dispatcher.record_visit(member.id, source).await;
            if tx.send(Completion::Ledger { token, member, source, result }).await.is_err() {
                debug!(token = %token, "surface_closed_before_visit_written");
            }
        });
    }

    /// Take the guard under a fresh token and mark it in flight
    fn enter_guard(&mut self, now: Instant) -> Option<ResolutionToken> {
        let token = ResolutionToken(self.next_token);
        if !self.guard.try_enter(token, now) {
            self.metrics.record_guard_rejection();
            info!(
                rejected = %token,
                in_flight = %self.in_flight.map(|t| t.0).unwrap_or(0),
                "guard_rejected"
            );
            return None;
        }
        self.next_token += 1;
        self.in_flight = Some(token);
        Some(token)
    }

    /// Release the guard for a terminal outcome of `token`
    fn finish(&mut self, token: ResolutionToken) {
        self.in_flight = None;
        if !self.guard.leave(token) {
            debug!(token = %token, "guard_not_held_on_finish");
        }
    }

    fn is_stale(&self, token: ResolutionToken) -> bool {
        if self.in_flight == Some(token) {
            return false;
        }
        self.metrics.record_stale_completion();
        debug!(
            token = %token,
            in_flight = %self.in_flight.map(|t| t.0).unwrap_or(0),
            "stale_completion_discarded"
        );
        true
    }

    /// Reset the session after a terminal outcome
    fn close_session(&mut self) {
        let dropped = self.buffer.clear();
        if dropped > 0 {
            debug!(len = %dropped, "partial_scan_cleared");
        }
        self.pending_choices.clear();
    }

    /// onIdle fires only when nothing else is pending on the surface
    fn notify_idle_if_quiet(&self) {
        if self.buffer.is_empty()
            && self.in_flight.is_none()
            && self.pending_choices.is_empty()
            && self.pending_retry.is_none()
        {
            self.notify.send(CheckinNotification::Idle);
        }
    }
}
