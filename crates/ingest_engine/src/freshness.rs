use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::repository::Repository;

/// Decides whether a work is due for another sync pass.
///
/// Fails open on repository read errors: a spurious re-sync is idempotent
/// and cheap, missing updates is not.
#[derive(Debug, Clone)]
pub struct FreshnessGate {
    min_interval: Duration,
}

impl Default for FreshnessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

impl FreshnessGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// True when the work is unknown or its last sync is at least
    /// `min_interval` ago.
    pub async fn should_sync(&self, repository: &dyn Repository, slug: &str) -> bool {
        match repository.last_synced_at(slug).await {
            Ok(None) => true,
            Ok(Some(last)) => {
                let elapsed = (Utc::now() - last)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.min_interval {
                    true
                } else {
                    info!("skipping {slug}: synced {}s ago", elapsed.as_secs());
                    false
                }
            }
            Err(err) => {
                warn!("freshness check for {slug} failed, syncing anyway: {err}");
                true
            }
        }
    }
}
