//! Barcode check-in engine
//!
//! Turns bursts of scanner keystrokes into exactly-once visit records.
//! Keystrokes come from stdin (one burst per line); notifications for the
//! presentation layer are printed to stdout as JSON lines.
//!
//! Module structure:
//! - `domain/` - Core types (MemberRef, VisitRecord, MatchResult, notifications)
//! - `io/` - Ports and adapters (directory, ledger, lease file, input)
//! - `services/` - Engine (ScanBuffer, MatchResolver, Dispatcher, Guard, Surface)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use scan_checkin::infra::{Config, Metrics};
use scan_checkin::io::{
    create_notification_channel, pump_input, FileLeaseStore, FileMemberDirectory,
    JsonlVisitLedger, LineInput, NotificationPayload,
};
use scan_checkin::services::{CheckinSurface, LeaseStore, MemoryLeaseStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Barcode check-in engine for a single front-desk surface
#[derive(Parser, Debug)]
#[command(name = "scan-checkin", version, about)]
struct Args {
    /// Path to TOML configuration file (else CONFIG_FILE, else config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries notifications
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("scan-checkin starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        min_length = %config.min_length(),
        max_length = %config.max_length(),
        idle_timeout_ms = %config.idle_timeout_ms(),
        resolve_policy = %config.resolve_policy().as_str(),
        selection_mode = %config.selection_mode().as_str(),
        lease_ttl_ms = %config.lease_ttl_ms(),
        "config_loaded"
    );

    let directory = Arc::new(
        FileMemberDirectory::from_file(config.members_file())
            .context("Member directory unavailable")?,
    );
    let ledger = JsonlVisitLedger::new(config.ledger_file());
    let lease_store: Arc<dyn LeaseStore> = match config.lease_file() {
        Some(path) => Arc::new(FileLeaseStore::new(path)),
        None => Arc::new(MemoryLeaseStore::new()),
    };
    info!(
        members = %directory.len(),
        ledger_file = %ledger.file_path().display(),
        lease_file = %config.lease_file().unwrap_or("memory"),
        "adapters_ready"
    );

    let metrics = Arc::new(Metrics::new());

    // Presentation stand-in: print notifications as JSON lines
    let (notify, mut notify_rx) = create_notification_channel(256);
    let notify = notify.with_metrics(metrics.clone());
    let site = config.site_id().to_string();
    let printer = tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            println!("{}", NotificationPayload::new(&site, &notification).to_json());
        }
    });

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Keystrokes keep arrival order through a single bounded channel
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    tokio::spawn(pump_input(LineInput::stdin(), cmd_tx, shutdown_rx));

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Re-read the members file on SIGHUP
    #[cfg(unix)]
    {
        let directory = directory.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut hangup) = signal(SignalKind::hangup()) else {
                return;
            };
            while hangup.recv().await.is_some() {
                if let Err(e) = directory.reload() {
                    warn!(error = %format!("{:#}", e), "member_directory_reload_failed");
                }
            }
        });
    }

    let surface = CheckinSurface::new(
        &config,
        directory,
        Arc::new(ledger),
        lease_store,
        metrics.clone(),
        notify,
    );

    // Run surface - consumes commands until input closes and the last scan settles
    surface.run(cmd_rx).await;

    // The surface owned the only notification sender; wait for the printer to drain
    if let Err(e) = printer.await {
        warn!(error = %e, "notification_printer_failed");
    }

    metrics.report().log();
    info!("scan-checkin shutdown complete");

    // The blocking stdin read cannot be cancelled; don't wait for it on runtime drop
    std::process::exit(0)
}
