//! Input source port and line-oriented adapter
//!
//! The engine never listens to a keyboard itself. Host wiring (including
//! suppressing keystrokes while a text field has focus) produces
//! [`SurfaceCommand`]s through an [`InputSource`].
//!
//! Line protocol, one keyboard burst per line:
//! - `cancel` / `esc` -> cancel
//! - `select <member_id>` -> pick from the disambiguation list
//! - `retry` -> retry the last failed visit write
//! - anything else -> one `Digit` per character

use crate::domain::{MemberId, SurfaceCommand};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Source of inbound commands for a check-in surface
#[async_trait]
pub trait InputSource: Send {
    /// Next command in arrival order, or None when the source is exhausted
    async fn next_command(&mut self) -> Option<SurfaceCommand>;
}

/// Parse one input line into commands
pub fn parse_line(line: &str) -> Vec<SurfaceCommand> {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => return Vec::new(),
        "cancel" | "esc" => return vec![SurfaceCommand::Cancel],
        "retry" => return vec![SurfaceCommand::RetryVisit],
        _ => {}
    }

    if let Some(id) = trimmed.strip_prefix("select ") {
        return match id.trim().parse::<i64>() {
            Ok(id) => vec![SurfaceCommand::Select(MemberId(id))],
            Err(_) => {
                warn!(line = %trimmed, "input_invalid_select");
                Vec::new()
            }
        };
    }

    trimmed.chars().map(SurfaceCommand::Digit).collect()
}

/// Reads commands from any line-oriented async reader
pub struct LineInput<R> {
    lines: Lines<R>,
    pending: VecDeque<SurfaceCommand>,
}

impl<R: AsyncBufRead + Unpin + Send> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), pending: VecDeque::new() }
    }
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> InputSource for LineInput<R> {
    async fn next_command(&mut self) -> Option<SurfaceCommand> {
        loop {
            if let Some(cmd) = self.pending.pop_front() {
                return Some(cmd);
            }
            match self.lines.next_line().await {
                Ok(Some(line)) => self.pending.extend(parse_line(&line)),
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "input_read_failed");
                    return None;
                }
            }
        }
    }
}

/// Forward commands from `source` to the surface until the source ends,
/// the surface goes away, or shutdown is signalled.
pub async fn pump_input<S: InputSource>(
    mut source: S,
    cmd_tx: mpsc::Sender<SurfaceCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("input_source_started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            cmd = source.next_command() => {
                let Some(cmd) = cmd else {
                    debug!("input_source_exhausted");
                    break;
                };
                // Awaiting send keeps keystrokes in order; digits are never dropped
                if cmd_tx.send(cmd).await.is_err() {
                    warn!("input_surface_closed");
                    break;
                }
            }
        }
    }
    info!("input_source_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("123"), vec![
            SurfaceCommand::Digit('1'),
            SurfaceCommand::Digit('2'),
            SurfaceCommand::Digit('3'),
        ]);
        assert_eq!(parse_line("  ESC "), vec![SurfaceCommand::Cancel]);
        assert_eq!(parse_line("cancel"), vec![SurfaceCommand::Cancel]);
        assert_eq!(parse_line("retry"), vec![SurfaceCommand::RetryVisit]);
        assert_eq!(parse_line("select 42"), vec![SurfaceCommand::Select(MemberId(42))]);
        assert!(parse_line("select abc").is_empty());
        assert!(parse_line("").is_empty());
        // Non-digits pass through; the scan buffer ignores them
        assert_eq!(parse_line("1a"), vec![SurfaceCommand::Digit('1'), SurfaceCommand::Digit('a')]);
    }

    #[tokio::test]
    async fn test_pump_preserves_order() {
        let input = LineInput::new(&b"12\nesc\n3\n"[..]);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        pump_input(input, cmd_tx, shutdown_rx).await;

        let mut received = Vec::new();
        while let Ok(cmd) = cmd_rx.try_recv() {
            received.push(cmd);
        }
        assert_eq!(received, vec![
            SurfaceCommand::Digit('1'),
            SurfaceCommand::Digit('2'),
            SurfaceCommand::Cancel,
            SurfaceCommand::Digit('3'),
        ]);
    }
}
