//! Best-effort failure snapshots.
//!
//! Nothing here returns an error: a failed capture is logged and dropped so it
//! never replaces the failure being diagnosed.

use crate::driver::{Driver, Element};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
    enabled: bool,
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
        }
    }

    /// Failure captures become no-ops.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::from("."),
            enabled: false,
        }
    }

    /// Snapshot the page after a failure, tagged with `context`
    /// (workflow and step). Returns the written path.
    pub async fn capture<D: Driver>(&self, driver: &D, context: &str) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = format!("failure_{}_{}.png", sanitize(context), stamp);
        self.write(driver, &name).await
    }

    /// Snapshot the page under a fixed file name.
    pub async fn snapshot<D: Driver>(&self, driver: &D, name: &str) -> Option<PathBuf> {
        let name = sanitize_file_name(name);
        self.save(&name, driver.screenshot().await)
    }

    /// Snapshot only `element`, under a fixed file name.
    pub async fn snapshot_element<D: Driver>(
        &self,
        driver: &D,
        element: &Element,
        name: &str,
    ) -> Option<PathBuf> {
        let name = sanitize_file_name(name);
        self.save(&name, driver.screenshot_element(element).await)
    }

    async fn write<D: Driver>(&self, driver: &D, name: &str) -> Option<PathBuf> {
        self.save(name, driver.screenshot().await)
    }

    fn save(&self, name: &str, shot: crate::Result<Vec<u8>>) -> Option<PathBuf> {
        let data = match shot {
            Ok(data) => data,
            Err(e) => {
                warn!("snapshot '{}' skipped: {}", name, e);
                return None;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("cannot create {}: {}", self.dir.display(), e);
            return None;
        }
        let path = self.dir.join(name);
        match std::fs::write(&path, data) {
            Ok(()) => {
                info!("snapshot saved: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("failed to save snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{}", sanitize(stem), sanitize(ext)),
        None => sanitize(name),
    }
}
