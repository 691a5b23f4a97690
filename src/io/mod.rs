//! IO modules - external system interfaces
//!
//! This module contains the engine's ports and their adapters:
//! - `ports` - `MemberDirectory` and `VisitLedger` traits
//! - `directory` - Member directory loaded from a JSON file
//! - `ledger` - Append-only visit ledger (JSONL format)
//! - `lease_file` - File-persisted busy lease for the concurrency guard
//! - `input` - `InputSource` port and line-oriented adapter (stdin)
//! - `notifications` - Bounded channel for outbound notifications

pub mod directory;
pub mod input;
pub mod lease_file;
pub mod ledger;
pub mod notifications;
pub mod ports;

// Re-export commonly used types
pub use directory::{FileMemberDirectory, MemberRecord};
pub use input::{pump_input, InputSource, LineInput};
pub use lease_file::FileLeaseStore;
pub use ledger::JsonlVisitLedger;
pub use notifications::{create_notification_channel, NotificationPayload, NotificationSender};
pub use ports::{MemberDirectory, VisitLedger};
