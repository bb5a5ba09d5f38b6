//! Status command implementation.

use super::Settings;
use amedias_core::SyncInfo;
use amedias_storage::StoreStats;
use serde::Serialize;

/// Status report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Sharing summary.
    pub sync: SyncInfo,
    /// Local store summary.
    pub store: StoreStats,
    /// Whether remote sharing is available.
    pub remote_configured: bool,
}

/// Runs the status command.
pub async fn run(
    settings: &Settings,
    address: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = settings.open(address).await?;
    let coordinator = ctx.coordinator();

    let report = StatusReport {
        sync: coordinator.get_sync_info(),
        store: ctx.store().stats().await,
        remote_configured: coordinator.has_remote_config(),
    };
    ctx.shutdown().await;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print_text_output(&report),
        other => return Err(format!("unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text_output(report: &StatusReport) {
    let sync = &report.sync;
    println!("Sharing");
    println!("  Mode:    {} ({})", sync.mode, sync.backend);
    println!("  Status:  {}", sync.status);
    if let Some(link) = &sync.share_url {
        println!("  Link:    {}", link);
    }
    if let Some(session) = &sync.session {
        if let Some(id) = &session.remote_id {
            println!("  Share:   {}", id);
        }
        if let Some(at) = session.last_synced_at {
            println!("  Synced:  {}", at.to_rfc3339());
        }
    }
    println!(
        "  Remote:  {}",
        if report.remote_configured {
            "configured"
        } else {
            "not configured"
        }
    );

    println!("Local store");
    println!("  Backend: {}", report.store.backend);
    println!("  Keys:    {}", report.store.item_count);
    if let Some(path) = &report.store.location {
        println!("  Path:    {}", path.display());
    }
}
