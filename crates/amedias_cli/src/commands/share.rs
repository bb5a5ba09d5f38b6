//! Share link commands.

use super::{read_state, Settings};
use amedias_share_url::Integrity;
use std::path::Path;
use tracing::info;

/// Starts sharing the state in `file` and prints the link.
pub async fn create(
    settings: &Settings,
    file: &Path,
    remote: bool,
    qr_size: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = read_state(file)?;
    let ctx = settings.open(None).await?;
    let coordinator = ctx.coordinator();

    coordinator.on_local_change(state.clone()).await?;
    let link = if remote {
        coordinator.start_remote_share(&state).await?
    } else {
        coordinator.start_url_share(&state).await?
    };
    let qr = coordinator.generate_qr_code(qr_size)?;
    ctx.shutdown().await;

    println!("✓ Share link created");
    println!("  Mode: {}", coordinator.mode().backend_label());
    println!("  Size: {} characters", link.len());
    println!("  Link: {}", link);
    println!("  QR:   {}", qr);
    Ok(())
}

/// Decodes a share link and prints its state.
///
/// With `save`, the application is opened at the link so the state is
/// adopted into the local store.
pub async fn read(
    settings: &Settings,
    url: &str,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = settings.open(if save { Some(url) } else { None }).await?;
    let shared = ctx.coordinator().links().read_share_url(url)?;

    match shared.integrity {
        Integrity::Verified => info!("fingerprint verified"),
        Integrity::Mismatch => eprintln!("warning: link fingerprint does not match its data"),
        Integrity::Unchecked => info!("link carries no fingerprint"),
    }
    if save {
        println!("✓ State saved locally ({})", ctx.coordinator().mode());
    }
    println!("{}", serde_json::to_string_pretty(&shared.data)?);

    ctx.shutdown().await;
    Ok(())
}

/// Prints the expected link size for the state in `file`.
pub async fn estimate(settings: &Settings, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let state = read_state(file)?;
    let ctx = settings.open(None).await?;
    let links = ctx.coordinator().links();
    let estimate = links.estimate_size(&state)?;

    println!("Compressed bytes:  {}", estimate.compressed_bytes);
    println!("Encoded chars:     {}", estimate.encoded_chars);
    println!(
        "Estimated length:  {} / {}",
        estimate.estimated_url_length,
        links.config().max_url_length
    );
    println!("Compression ratio: {:.1}%", estimate.compression_ratio);
    println!(
        "Can share:         {}",
        if estimate.can_share { "yes" } else { "no" }
    );

    ctx.shutdown().await;
    Ok(())
}
