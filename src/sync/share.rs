use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pan_api::RemoteFile;
use crate::util::path as sync_path;

use super::source::ShareListing;
use super::writer::{StrmWriter, WriteOutcome};
use super::{StrmUrl, SyncReport};

/// Pause length and spacing for the share walk. Share listing quotas are
/// much stricter than account listing quotas.
const THROTTLE_EVERY: u64 = 100;
const THROTTLE_PAUSE: Duration = Duration::from_secs(2);

/// One configured share sync job.
#[derive(Debug, Clone)]
pub struct ShareJob {
    pub share_code: String,
    pub receive_code: String,
    /// Share-internal directory id to start from (0 = share root).
    pub root_id: u64,
    /// Only files under this share-internal prefix are mirrored.
    pub share_prefix: String,
    pub local_root: PathBuf,
}

/// Extract `(share_code, receive_code)` from a share link of the form
/// `https://115.com/s/<code>?password=<receive>`. The password part is
/// optional; public shares have none.
pub fn parse_share_link(link: &str) -> Option<(String, String)> {
    let url = url::Url::parse(link.trim()).ok()?;
    let mut segments = url.path_segments()?;
    if segments.next() != Some("s") {
        return None;
    }
    let share_code = segments.next().filter(|s| !s.is_empty())?.to_string();
    let receive_code = url
        .query_pairs()
        .find(|(k, _)| k == "password")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();
    Some((share_code, receive_code))
}

/// Mirrors a share's subtree into pointer files, share-scoped listing
/// API and all.
pub struct ShareSyncEngine<'a, S> {
    source: &'a S,
    writer: &'a StrmWriter,
    urls: &'a StrmUrl,
}

impl<'a, S: ShareListing> ShareSyncEngine<'a, S> {
    pub fn new(source: &'a S, writer: &'a StrmWriter, urls: &'a StrmUrl) -> Self {
        Self {
            source,
            writer,
            urls,
        }
    }

    /// Walk the share and report the counts. Listing failures abort the
    /// job; per-file problems are counted and the walk continues.
    pub async fn run(&self, job: &ShareJob) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut processed: u64 = 0;

        self.walk(job, job.root_id, String::new(), &mut report, &mut processed)
            .await?;

        tracing::info!(share_code = %job.share_code, %report, "share sync finished");
        Ok(report)
    }

    fn walk<'b>(
        &'b self,
        job: &'b ShareJob,
        dir_id: u64,
        current: String,
        report: &'b mut SyncReport,
        processed: &'b mut u64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'b>> {
        Box::pin(async move {
            let items = self
                .source
                .list_share_children(&job.share_code, &job.receive_code, dir_id)
                .await
                .with_context(|| format!("share listing failed under {:?}", current))?;

            for item in items {
                let item_path = format!("{current}/{}", item.name);

                if item.is_dir {
                    self.walk(job, item.id, item_path, report, processed).await?;
                } else {
                    self.emit_file(&item, &item_path, job, report).await;

                    *processed += 1;
                    if *processed % THROTTLE_EVERY == 0 {
                        tracing::info!(
                            processed = *processed,
                            "pausing {THROTTLE_PAUSE:?} to respect share quota"
                        );
                        tokio::time::sleep(THROTTLE_PAUSE).await;
                    }
                }
            }
            Ok(())
        })
    }

    async fn emit_file(
        &self,
        item: &RemoteFile,
        item_path: &str,
        job: &ShareJob,
        report: &mut SyncReport,
    ) {
        if !sync_path::is_segment_prefix(&job.share_prefix, item_path) {
            tracing::debug!(path = %item_path, "outside configured share prefix");
            report.skipped += 1;
            return;
        }
        let Some(rel) = sync_path::strip_segment_prefix(item_path, &job.share_prefix) else {
            report.skipped += 1;
            return;
        };

        if !self.writer.allows(&item.name) {
            tracing::warn!(path = %item_path, "skipping non-media file");
            report.skipped += 1;
            return;
        }

        // A write needs the full share coordinate triple.
        if item.id == 0 || job.share_code.is_empty() || job.receive_code.is_empty() {
            tracing::error!(
                path = %item_path,
                "missing share coordinates, cannot emit pointer"
            );
            report.failed += 1;
            return;
        }

        let local = job.local_root.join(rel);
        let url = self
            .urls
            .share(&job.share_code, &job.receive_code, item.id);
        match self.writer.write(&local, &url).await {
            Ok(WriteOutcome::Written(_)) => report.generated += 1,
            Ok(WriteOutcome::SkippedExtension) => report.skipped += 1,
            Err(e) => {
                tracing::error!(path = %local.display(), error = %e, "pointer write failed");
                report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pan_api::ApiError;
    use crate::sync::writer::MediaExts;
    use std::collections::HashMap;

    struct FakeShare {
        children: HashMap<u64, Vec<RemoteFile>>,
        expected_codes: (&'static str, &'static str),
    }

    fn file(id: u64, name: &str) -> RemoteFile {
        RemoteFile {
            id,
            parent_id: None,
            name: name.to_string(),
            pickcode: None,
            is_dir: false,
            size: Some(1),
        }
    }

    fn dir(id: u64, name: &str) -> RemoteFile {
        RemoteFile {
            id,
            parent_id: None,
            name: name.to_string(),
            pickcode: None,
            is_dir: true,
            size: None,
        }
    }

    impl ShareListing for FakeShare {
        async fn list_share_children(
            &self,
            share_code: &str,
            receive_code: &str,
            dir_id: u64,
        ) -> Result<Vec<RemoteFile>, ApiError> {
            assert_eq!(
                (share_code, receive_code),
                self.expected_codes,
                "listing must be share-scoped"
            );
            Ok(self.children.get(&dir_id).cloned().unwrap_or_default())
        }
    }

    fn job(local_root: PathBuf, share_prefix: &str) -> ShareJob {
        ShareJob {
            share_code: "swabc".into(),
            receive_code: "1234".into(),
            root_id: 0,
            share_prefix: share_prefix.into(),
            local_root,
        }
    }

    #[tokio::test]
    async fn test_mirrors_share_under_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let share = FakeShare {
            expected_codes: ("swabc", "1234"),
            children: HashMap::from([
                (0, vec![dir(1, "Shows"), file(90, "readme.mkv")]),
                (1, vec![file(91, "Pilot.mkv"), file(92, "notes.txt")]),
            ]),
        };
        let writer = StrmWriter::new(MediaExts::parse("mkv"));
        let urls = StrmUrl::new("http://srv:3000", "k");
        let engine = ShareSyncEngine::new(&share, &writer, &urls);

        let report = engine
            .run(&job(tmp.path().to_path_buf(), "/Shows"))
            .await
            .unwrap();

        assert_eq!(report.generated, 1);
        assert_eq!(report.skipped, 2, "outside prefix + non-media");
        let content = std::fs::read_to_string(tmp.path().join("Pilot.strm")).unwrap();
        assert_eq!(
            content,
            "http://srv:3000/redirect_url?apikey=k&share_code=swabc&receive_code=1234&id=91"
        );
    }

    #[tokio::test]
    async fn test_missing_file_id_is_per_file_error() {
        let tmp = tempfile::tempdir().unwrap();
        let share = FakeShare {
            expected_codes: ("swabc", "1234"),
            children: HashMap::from([(0, vec![file(0, "Broken.mkv"), file(91, "Fine.mkv")])]),
        };
        let writer = StrmWriter::new(MediaExts::parse("mkv"));
        let urls = StrmUrl::new("http://srv:3000", "k");
        let engine = ShareSyncEngine::new(&share, &writer, &urls);

        let report = engine
            .run(&job(tmp.path().to_path_buf(), "/"))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.generated, 1);
    }

    #[test]
    fn test_parse_share_link() {
        assert_eq!(
            parse_share_link("https://115.com/s/sw31cab?password=b5h6"),
            Some(("sw31cab".into(), "b5h6".into()))
        );
        assert_eq!(
            parse_share_link("https://115.com/s/sw31cab"),
            Some(("sw31cab".into(), "".into())),
            "public shares have no password"
        );
        assert_eq!(parse_share_link("https://115.com/other/x"), None);
        assert_eq!(parse_share_link("not a url"), None);
    }
}
