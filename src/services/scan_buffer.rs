//! Scan buffer and idle timeout governor
//!
//! Accumulates digit keystrokes into a candidate card identifier and
//! decides when a burst is complete. The idle timer is modelled as a
//! deadline: the owner sleeps until [`ScanBuffer::deadline`] and then calls
//! [`ScanBuffer::on_idle`]. Every exit path clears the deadline, so a late
//! wakeup against an emptied buffer is a no-op.

use crate::domain::types::Candidate;
use crate::domain::SessionState;
use crate::infra::{Config, ResolvePolicy};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Result of feeding one keystroke
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// Not a digit; buffer untouched
    Ignored,
    /// Digit appended, burst still open
    Accumulating(usize),
    /// Burst complete; buffer emptied and captured
    Complete(Candidate),
}

/// Result of an idle timer wakeup
#[derive(Debug, Clone, PartialEq)]
pub enum IdleOutcome {
    /// No timer running, or it has not expired yet
    NotDue,
    /// Burst within the length window; buffer emptied and captured
    Complete(Candidate),
    /// Burst outside the window (stray keystrokes); buffer emptied
    Discarded(usize),
}

pub struct ScanBuffer {
    digits: String,
    started_at: Option<Instant>,
    last_digit_at: Option<Instant>,
    deadline: Option<Instant>,
    idle_timeout: Duration,
    min_len: usize,
    max_len: usize,
    policy: ResolvePolicy,
}

impl ScanBuffer {
    pub fn new(config: &Config) -> Self {
        Self {
            digits: String::with_capacity(config.max_length() + 1),
            started_at: None,
            last_digit_at: None,
            deadline: None,
            idle_timeout: Duration::from_millis(config.idle_timeout_ms()),
            min_len: config.min_length(),
            max_len: config.max_length(),
            policy: config.resolve_policy(),
        }
    }

    /// Feed one keystroke
    pub fn feed(&mut self, ch: char, now: Instant) -> FeedOutcome {
        if !ch.is_ascii_digit() {
            return FeedOutcome::Ignored;
        }

        if self.digits.is_empty() {
            self.started_at = Some(now);
        }
        // Past max the burst is already out of the window; stop growing
        if self.digits.len() <= self.max_len {
            self.digits.push(ch);
        }
        self.last_digit_at = Some(now);
        self.deadline = Some(now + self.idle_timeout);

        let len = self.digits.len();
        let complete = match self.policy {
            ResolvePolicy::Eager => self.in_window(len),
            ResolvePolicy::Burst => len >= self.max_len,
            ResolvePolicy::Idle => false,
        };

        if complete {
            debug!(len = %len, policy = %self.policy.as_str(), "scan_burst_complete");
            FeedOutcome::Complete(self.take())
        } else {
            FeedOutcome::Accumulating(len)
        }
    }

    /// Handle an idle timer wakeup
    pub fn on_idle(&mut self, now: Instant) -> IdleOutcome {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return IdleOutcome::NotDue,
        }

        let len = self.digits.len();
        if self.in_window(len) {
            IdleOutcome::Complete(self.take())
        } else {
            self.clear();
            IdleOutcome::Discarded(len)
        }
    }

    /// Drop the buffer and stop the timer. Returns the discarded length.
    pub fn clear(&mut self) -> usize {
        let len = self.digits.len();
        self.digits.clear();
        self.started_at = None;
        self.last_digit_at = None;
        self.deadline = None;
        len
    }

    /// When the idle timer fires, if running
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn last_digit_at(&self) -> Option<Instant> {
        self.last_digit_at
    }

    /// Governor state, ignoring any resolution in flight
    pub fn state(&self) -> SessionState {
        if self.digits.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Accumulating
        }
    }

    fn in_window(&self, len: usize) -> bool {
        (self.min_len..=self.max_len).contains(&len)
    }

    fn take(&mut self) -> Candidate {
        let digits = std::mem::take(&mut self.digits);
        self.clear();
        Candidate::capture(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(policy: ResolvePolicy) -> ScanBuffer {
        ScanBuffer::new(&Config::default().with_scan_window(8, 12).with_resolve_policy(policy))
    }

    fn feed_all(buffer: &mut ScanBuffer, digits: &str, now: Instant) -> Vec<FeedOutcome> {
        digits.chars().map(|c| buffer.feed(c, now)).collect()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_non_digits_ignored() {
        let mut buffer = buffer(ResolvePolicy::Eager);
        let now = Instant::now();
        assert_eq!(buffer.feed('a', now), FeedOutcome::Ignored);
        assert_eq!(buffer.feed('\n', now), FeedOutcome::Ignored);
        assert!(buffer.is_empty());
        assert!(buffer.deadline().is_none());
        assert_eq!(buffer.state(), SessionState::Idle);
    }

    #[test]
    fn test_eager_resolves_at_min() {
        let mut buffer = buffer(ResolvePolicy::Eager);
        let now = Instant::now();
        let outcomes = feed_all(&mut buffer, "12345678", now);

        assert_eq!(outcomes[6], FeedOutcome::Accumulating(7));
        match &outcomes[7] {
            FeedOutcome::Complete(candidate) => assert_eq!(candidate.as_str(), "12345678"),
            other => panic!("expected complete, got {:?}", other),
        }
        assert!(buffer.is_empty());
        assert!(buffer.deadline().is_none());
    }

    #[test]
    fn test_burst_resolves_at_max_without_idle() {
        let mut buffer = buffer(ResolvePolicy::Burst);
        let now = Instant::now();
        let outcomes = feed_all(&mut buffer, "123456789012", now);

        assert!(outcomes[..11].iter().all(|o| matches!(o, FeedOutcome::Accumulating(_))));
        assert!(matches!(outcomes[11], FeedOutcome::Complete(ref c) if c.len() == 12));
        assert!(buffer.deadline().is_none());
    }

    #[test]
    fn test_burst_resolves_on_idle_within_window() {
        let mut buffer = buffer(ResolvePolicy::Burst);
        let start = Instant::now();
        feed_all(&mut buffer, "1234567890", start);

        assert_eq!(buffer.on_idle(start + ms(999)), IdleOutcome::NotDue);
        match buffer.on_idle(start + ms(1000)) {
            IdleOutcome::Complete(candidate) => assert_eq!(candidate.as_str(), "1234567890"),
            other => panic!("expected complete, got {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_short_burst_discarded_on_idle() {
        for policy in [ResolvePolicy::Eager, ResolvePolicy::Burst, ResolvePolicy::Idle] {
            let mut buffer = buffer(policy);
            let start = Instant::now();
            feed_all(&mut buffer, "123", start);
            assert_eq!(buffer.state(), SessionState::Accumulating);

            assert_eq!(buffer.on_idle(start + ms(1001)), IdleOutcome::Discarded(3));
            assert!(buffer.is_empty());
            assert!(buffer.deadline().is_none());
            // A second wakeup after discard does nothing
            assert_eq!(buffer.on_idle(start + ms(5000)), IdleOutcome::NotDue);
        }
    }

    #[test]
    fn test_idle_policy_waits_even_at_max() {
        let mut buffer = buffer(ResolvePolicy::Idle);
        let start = Instant::now();
        let outcomes = feed_all(&mut buffer, "123456789012", start);
        assert!(outcomes.iter().all(|o| matches!(o, FeedOutcome::Accumulating(_))));

        assert!(matches!(buffer.on_idle(start + ms(1000)), IdleOutcome::Complete(ref c) if c.len() == 12));
    }

    #[test]
    fn test_idle_policy_discards_overlong_burst() {
        let mut buffer = buffer(ResolvePolicy::Idle);
        let start = Instant::now();
        feed_all(&mut buffer, "12345678901234567890", start);
        // Growth stops one past max
        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.on_idle(start + ms(1000)), IdleOutcome::Discarded(13));
    }

    #[test]
    fn test_each_digit_restarts_idle_timer() {
        let mut buffer = buffer(ResolvePolicy::Burst);
        let start = Instant::now();
        buffer.feed('1', start);
        buffer.feed('2', start + ms(800));

        assert_eq!(buffer.deadline(), Some(start + ms(1800)));
        assert_eq!(buffer.on_idle(start + ms(1200)), IdleOutcome::NotDue);
        assert_eq!(buffer.started_at(), Some(start));
        assert_eq!(buffer.last_digit_at(), Some(start + ms(800)));
    }

    #[test]
    fn test_clear_stops_timer() {
        let mut buffer = buffer(ResolvePolicy::Eager);
        let start = Instant::now();
        feed_all(&mut buffer, "1234", start);

        assert_eq!(buffer.clear(), 4);
        assert!(buffer.deadline().is_none());
        assert_eq!(buffer.on_idle(start + ms(2000)), IdleOutcome::NotDue);
    }
}
