use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    let mut dirs = vec![cfg.data_dir.as_path()];
    for asset in [&cfg.font_bold, &cfg.font_regular, &cfg.face_model] {
        if let Some(parent) = asset.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent);
        }
    }

    for dir in dirs {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

/// Warns about missing fonts or face model. Both have runtime fallbacks, so
/// nothing here is fatal.
pub async fn check_assets(cfg: &Config) -> bool {
    let mut all_present = true;
    for (what, path) in [
        ("bold font", &cfg.font_bold),
        ("regular font", &cfg.font_regular),
        ("face model", &cfg.face_model),
    ] {
        if !is_file(path).await {
            warn!("{} not found at {}; using fallback", what, path.display());
            all_present = false;
        }
    }
    all_present
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
