use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use atelier_catalog::{MaterializeOutcome, MaterializeScope, MediaCatalog};
use atelier_types::MediaId;

/// Counts from one migration scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Items that held an inline reference when the scan started.
    pub scanned: usize,
    pub migrated: usize,
    /// Items whose save failed; they keep their reference and are retried
    /// by the next scan.
    pub failed: usize,
    /// Items removed meanwhile, or left unchanged by the saver.
    pub skipped: usize,
}

impl MigrationReport {
    fn record(&mut self, outcome: MaterializeOutcome) {
        match outcome {
            MaterializeOutcome::Migrated => self.migrated += 1,
            MaterializeOutcome::Failed => self.failed += 1,
            MaterializeOutcome::Unchanged | MaterializeOutcome::Discarded => self.skipped += 1,
        }
    }
}

/// Move every inline reference in `catalog` to durable storage.
///
/// Each item migrates in its own task. Failures are logged and counted,
/// never returned. Running it again once no inline references remain does
/// nothing.
pub async fn migrate_inline_references(catalog: &MediaCatalog) -> MigrationReport {
    let candidates: Vec<MediaId> = catalog
        .catalog()
        .media_files
        .iter()
        .filter(|m| m.has_inline_reference())
        .map(|m| m.id.clone())
        .collect();

    let mut report = MigrationReport {
        scanned: candidates.len(),
        ..MigrationReport::default()
    };
    if candidates.is_empty() {
        debug!("no inline references to migrate");
        return report;
    }

    let mut tasks = JoinSet::new();
    for id in candidates {
        let catalog = catalog.clone();
        tasks.spawn(async move { catalog.materialize_item(&id, MaterializeScope::Inline).await });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                warn!(error = %e, "migration task failed");
                report.failed += 1;
            }
        }
    }

    info!(
        scanned = report.scanned,
        migrated = report.migrated,
        failed = report.failed,
        skipped = report.skipped,
        "inline reference migration finished"
    );
    report
}

/// Handle to a migration scan running in the background.
///
/// Dropping the handle does not stop the scan.
#[derive(Debug)]
pub struct MigrationScan {
    handle: JoinHandle<MigrationReport>,
}

impl MigrationScan {
    pub fn spawn(catalog: MediaCatalog) -> Self {
        Self {
            handle: tokio::spawn(async move { migrate_inline_references(&catalog).await }),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the scan. A panicked scan reports nothing migrated.
    pub async fn join(self) -> MigrationReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "migration scan did not complete");
                MigrationReport::default()
            }
        }
    }
}
