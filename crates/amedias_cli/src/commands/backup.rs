//! Backup, restore and reset commands.

use super::Settings;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes a backup of the local snapshot.
pub async fn export(
    settings: &Settings,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = settings.open(None).await?;
    let backup = ctx.coordinator().export_all_data().await?;
    ctx.shutdown().await;

    let path = output.unwrap_or_else(|| PathBuf::from(&backup.file_name));
    info!("Writing backup to {:?}", path);
    let mut file = fs::File::create(&path)?;
    file.write_all(backup.contents.as_bytes())?;
    file.sync_all()?;

    println!("✓ Backup written");
    println!("  Path: {:?}", path);
    println!("  Size: {} bytes", backup.contents.len());
    Ok(())
}

/// Replaces the local snapshot with the backup in `file`.
pub async fn import(settings: &Settings, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(file)?;
    let ctx = settings.open(None).await?;
    ctx.coordinator().import_data(&contents).await?;
    ctx.shutdown().await;

    println!("✓ Backup imported from {:?}", file);
    Ok(())
}

/// Erases every local key.
pub async fn clear(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = settings.open(None).await?;
    let cleared = ctx.coordinator().clear_all_data().await;
    ctx.shutdown().await;

    if !cleared {
        return Err("local store could not be cleared".into());
    }
    println!("✓ All local data erased");
    Ok(())
}
