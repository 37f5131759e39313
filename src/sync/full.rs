use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result};

use crate::pan_api::{RemoteFile, validate_pickcode};

use super::mapper::{MappingRule, MappingRules};
use super::source::DirectoryListing;
use super::writer::{StrmWriter, WriteOutcome};
use super::{StrmUrl, SyncReport};

/// Walks every configured pair's remote subtree and emits one pointer
/// file per allow-listed media file.
///
/// Pairs are isolated: a pair whose remote root cannot be resolved or
/// whose walk fails is logged and the next pair still runs. Per-file
/// problems are counted and never abort the walk.
pub struct FullSyncEngine<'a, S> {
    source: &'a S,
    writer: &'a StrmWriter,
    urls: &'a StrmUrl,
    /// Opt-in orphan sweep: delete local pointer files no longer backed
    /// by a remote file.
    remove_orphans: bool,
}

impl<'a, S: DirectoryListing> FullSyncEngine<'a, S> {
    pub fn new(
        source: &'a S,
        writer: &'a StrmWriter,
        urls: &'a StrmUrl,
        remove_orphans: bool,
    ) -> Self {
        Self {
            source,
            writer,
            urls,
            remove_orphans,
        }
    }

    /// Run a full sync over all configured pairs and report the counts.
    pub async fn run(&self, rules: &MappingRules) -> SyncReport {
        let mut report = SyncReport::default();

        for rule in rules.iter() {
            tracing::info!(
                local = %rule.local_root.display(),
                remote = %rule.remote_root,
                "syncing pair"
            );
            if let Err(e) = self.sync_pair(rule, &mut report).await {
                tracing::error!(remote = %rule.remote_root, error = %e, "sync pair failed");
            }
        }

        tracing::info!(%report, "full sync finished");
        report
    }

    async fn sync_pair(&self, rule: &MappingRule, report: &mut SyncReport) -> Result<()> {
        let dir_id = self
            .source
            .dir_id_by_path(&rule.remote_root)
            .await
            .with_context(|| format!("cannot resolve remote root {}", rule.remote_root))?;
        tracing::debug!(dir_id, remote = %rule.remote_root, "remote root resolved");

        let failed_before = report.failed;
        let mut confirmed = HashSet::new();
        self.walk(dir_id, String::new(), rule, report, &mut confirmed)
            .await?;

        if self.remove_orphans {
            // A pair that was not a total success keeps its existing
            // pointer files: a partial listing must never trigger deletes.
            if report.failed == failed_before {
                self.sweep_orphans(&rule.local_root, &confirmed, report)
                    .await;
            } else {
                tracing::warn!(
                    remote = %rule.remote_root,
                    "pair had per-file failures, skipping orphan sweep"
                );
            }
        }
        Ok(())
    }

    fn walk<'b>(
        &'b self,
        dir_id: u64,
        prefix: String,
        rule: &'b MappingRule,
        report: &'b mut SyncReport,
        confirmed: &'b mut HashSet<PathBuf>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'b>> {
        Box::pin(async move {
            let items = self
                .source
                .list_children(dir_id)
                .await
                .with_context(|| format!("listing failed under {:?}", prefix))?;

            for item in items {
                let rel = if prefix.is_empty() {
                    item.name.clone()
                } else {
                    format!("{prefix}/{}", item.name)
                };

                if item.is_dir {
                    self.walk(item.id, rel, rule, report, confirmed).await?;
                } else {
                    self.emit_file(&item, &rel, rule, report, confirmed).await;
                }
            }
            Ok(())
        })
    }

    /// Emit the pointer file for one remote file. All failure modes here
    /// are per-file: counted and logged, never propagated.
    async fn emit_file(
        &self,
        item: &RemoteFile,
        rel: &str,
        rule: &MappingRule,
        report: &mut SyncReport,
        confirmed: &mut HashSet<PathBuf>,
    ) {
        if !self.writer.allows(&item.name) {
            tracing::warn!(path = %rel, "skipping non-media file");
            report.skipped += 1;
            return;
        }

        let Some(pickcode) = item.pickcode.as_deref().filter(|p| !p.is_empty()) else {
            tracing::error!(path = %rel, "file has no pickcode, cannot emit pointer");
            report.failed += 1;
            return;
        };
        let pickcode = match validate_pickcode(pickcode) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(path = %rel, error = %e, "rejecting file");
                report.failed += 1;
                return;
            }
        };

        let local = rule.local_root.join(rel);
        let url = self.urls.pickcode(&pickcode);
        match self.writer.write(&local, &url).await {
            Ok(WriteOutcome::Written(path)) => {
                report.generated += 1;
                confirmed.insert(path);
            }
            Ok(WriteOutcome::SkippedExtension) => report.skipped += 1,
            Err(e) => {
                tracing::error!(path = %local.display(), error = %e, "pointer write failed");
                report.failed += 1;
            }
        }
    }

    /// Delete pointer files under `root` that this walk did not confirm.
    /// The sweep aborts without deleting anything when the local listing
    /// itself is incomplete.
    async fn sweep_orphans(
        &self,
        root: &Path,
        confirmed: &HashSet<PathBuf>,
        report: &mut SyncReport,
    ) {
        let mut existing = Vec::new();
        if let Err(e) = collect_strm_files(root, &mut existing).await {
            tracing::warn!(root = %root.display(), error = %e, "orphan scan failed, keeping files");
            return;
        }

        for path in existing {
            if confirmed.contains(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed orphaned pointer file");
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove orphan");
                }
            }
        }
    }
}

/// Recursively collect every `.strm` file under `dir`. A missing root is
/// fine (first sync); any other error aborts the collection.
fn collect_strm_files<'a>(
    dir: &'a Path,
    out: &'a mut Vec<PathBuf>,
) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
    Box::pin(async move {
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", dir.display()));
            }
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_strm_files(&path, out).await?;
            } else if path.extension().is_some_and(|e| e == "strm") {
                out.push(path);
            }
        }
        Ok(())
    })
}
