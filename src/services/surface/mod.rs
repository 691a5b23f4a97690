//! Check-in surface: one live scan session and its event loop
//!
//! The CheckinSurface owns everything a single check-in surface needs:
//! - Scan buffer and idle timer (governor)
//! - Concurrency guard lease
//! - Match resolution and dispatch
//! - Disambiguation choices and the failed visit awaiting retry
//!
//! Directory lookups and ledger writes run on spawned tasks and report back
//! over a channel, tagged with the token of the resolution that started
//! them. Only the loop mutates session state, so commands are applied in
//! arrival order and a completion for a superseded token is dropped.

mod handlers;

use crate::domain::types::{Candidate, ScanSession};
use crate::domain::{
    CheckinError, MatchResult, MemberRef, ResolutionToken, SessionState, SurfaceCommand,
    VisitRecord, VisitSource,
};
use crate::infra::{Config, Metrics};
use crate::io::{MemberDirectory, NotificationSender, VisitLedger};
use crate::services::dispatcher::ResolutionDispatcher;
use crate::services::guard::{ConcurrencyGuard, LeaseStore};
use crate::services::resolver::MatchResolver;
use crate::services::scan_buffer::ScanBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::info;

/// Completion channel depth. At most one task is in flight per token, so
/// this only needs to absorb stale completions after cancels.
const COMPLETION_BUFFER: usize = 64;

/// Result of a spawned lookup or ledger write
#[derive(Debug)]
pub(crate) enum Completion {
    Lookup {
        token: ResolutionToken,
        candidate: Candidate,
        result: Result<MatchResult, CheckinError>,
        latency_ms: u64,
    },
    Ledger {
        token: ResolutionToken,
        member: MemberRef,
        source: VisitSource,
        result: Result<VisitRecord, CheckinError>,
    },
}

/// Per-surface check-in engine
pub struct CheckinSurface {
    /// Digit accumulation and idle timer
    pub(crate) buffer: ScanBuffer,
    /// Single-holder lease over the resolution critical section
    pub(crate) guard: ConcurrencyGuard,
    pub(crate) resolver: MatchResolver,
    pub(crate) dispatcher: ResolutionDispatcher,
    /// Next token to hand out
    pub(crate) next_token: u64,
    /// Token whose lookup or write is outstanding
    pub(crate) in_flight: Option<ResolutionToken>,
    /// Members offered for disambiguation, empty when no list is shown
    pub(crate) pending_choices: Vec<MemberRef>,
    /// Member whose visit write failed, kept for an explicit retry
    pub(crate) pending_retry: Option<(MemberRef, VisitSource)>,
    pub(crate) notify: NotificationSender,
    pub(crate) completion_tx: mpsc::Sender<Completion>,
    pub(crate) completion_rx: mpsc::Receiver<Completion>,
    pub(crate) metrics: Arc<Metrics>,
}

impl CheckinSurface {
    /// Create a surface with the given configuration and collaborators
    pub fn new(
        config: &Config,
        directory: Arc<dyn MemberDirectory>,
        ledger: Arc<dyn VisitLedger>,
        lease_store: Arc<dyn LeaseStore>,
        metrics: Arc<Metrics>,
        notify: NotificationSender,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER);
        let guard = ConcurrencyGuard::new(
            Duration::from_millis(config.lease_ttl_ms()),
            lease_store,
            config.reset_on_start(),
        );
        Self {
            buffer: ScanBuffer::new(config),
            guard,
            resolver: MatchResolver::new(config, directory),
            dispatcher: ResolutionDispatcher::new(config, ledger),
            next_token: 1,
            in_flight: None,
            pending_choices: Vec::new(),
            pending_retry: None,
            notify,
            completion_tx,
            completion_rx,
            metrics,
        }
    }

    /// Start the surface, consuming commands until the channel closes. A
    /// scan that is still buffered or in flight when input closes is carried
    /// to its outcome before the surface stops.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<SurfaceCommand>) {
        self.guard.restore().await;
        info!(
            policy = %self.buffer.policy().as_str(),
            selection_mode = %self.dispatcher.mode().as_str(),
            "checkin_surface_started"
        );

        let mut input_open = true;
        loop {
            if !input_open && self.is_settled() {
                break;
            }

            let deadline = self.buffer.deadline();
            tokio::select! {
                cmd = cmd_rx.recv(), if input_open => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            input_open = false;
                            info!(
                                buffered = %self.buffer.len(),
                                in_flight = %self.in_flight.map(|t| t.0).unwrap_or(0),
                                "checkin_input_closed"
                            );
                        }
                    }
                }
                Some(done) = self.completion_rx.recv() => {
                    self.handle_completion(done);
                }
                // Idle timer; only armed while digits are buffered
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timeout();
                }
            }
        }

        // Let the final lease write land before the caller exits
        self.guard.flush().await;
        info!("checkin_surface_stopped");
    }

    /// Nothing buffered and no lookup or write outstanding. Stale
    /// completions don't count: only the current token is waited for.
    fn is_settled(&self) -> bool {
        self.in_flight.is_none() && self.buffer.is_empty()
    }

    /// Apply one inbound command
    pub fn handle_command(&mut self, cmd: SurfaceCommand) {
        match cmd {
            SurfaceCommand::Digit(ch) => self.feed_digit(ch),
            SurfaceCommand::Cancel => self.cancel(),
            SurfaceCommand::Select(member_id) => self.select_candidate(member_id),
            SurfaceCommand::RetryVisit => self.retry_visit(),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        if self.in_flight.is_some() {
            SessionState::Resolving
        } else {
            self.buffer.state()
        }
    }

    /// Snapshot of the live session
    pub fn session(&self) -> ScanSession {
        ScanSession {
            buffer: self.buffer.as_str().to_string(),
            started_at: self.buffer.started_at(),
            last_digit_at: self.buffer.last_digit_at(),
            state: self.state(),
        }
    }

    /// Members currently offered for disambiguation
    pub fn pending_choices(&self) -> &[MemberRef] {
        &self.pending_choices
    }

    /// Whether a failed visit write is waiting for a retry
    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }
}
