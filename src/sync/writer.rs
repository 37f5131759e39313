use std::path::{Path, PathBuf};

use crate::util::path as sync_path;

/// The configured media-extension allow-list.
///
/// Input is comma-separated (ASCII `,` or full-width `，`), with or
/// without leading dots; entries are normalized to dotted form. Matching
/// is case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct MediaExts {
    exts: Vec<String>,
}

impl MediaExts {
    pub fn parse(input: &str) -> Self {
        let exts = input
            .replace('，', ",")
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| {
                if e.starts_with('.') {
                    e.to_string()
                } else {
                    format!(".{e}")
                }
            })
            .collect();
        Self { exts }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match sync_path::dotted_extension(file_name) {
            Some(ext) => self.exts.iter().any(|e| e == ext),
            None => false,
        }
    }
}

/// Result of a pointer-file write attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The pointer file was written; carries its path.
    Written(PathBuf),
    /// The media extension is not allow-listed; nothing was written.
    SkippedExtension,
}

/// Writes `.strm` pointer files.
///
/// The writer re-validates the extension gate independently of its
/// callers, creates missing parent directories, and writes with
/// create-or-truncate semantics so a retried write can never leave an
/// existing pointer worse than most-recent-wins.
#[derive(Debug, Clone)]
pub struct StrmWriter {
    exts: MediaExts,
}

impl StrmWriter {
    pub fn new(exts: MediaExts) -> Self {
        Self { exts }
    }

    /// Whether a file name passes the extension gate. Engines use this to
    /// count skips before doing per-file work; `write` re-validates.
    pub fn allows(&self, file_name: &str) -> bool {
        self.exts.matches(file_name)
    }

    /// Write the pointer file for the media file at `media_path`,
    /// replacing its extension with `.strm`. Filesystem errors are
    /// returned to the caller, which counts them and moves on.
    pub async fn write(
        &self,
        media_path: &Path,
        url: &str,
    ) -> Result<WriteOutcome, std::io::Error> {
        let file_name = media_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if !self.exts.matches(file_name) {
            tracing::warn!(path = %media_path.display(), "skipping non-media extension");
            return Ok(WriteOutcome::SkippedExtension);
        }

        let strm_path = media_path.with_file_name(sync_path::strm_file_name(file_name));

        if let Some(parent) = strm_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&strm_path, url).await?;

        tracing::info!(path = %strm_path.display(), "pointer file written");
        Ok(WriteOutcome::Written(strm_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_commas_and_dots() {
        let exts = MediaExts::parse("mp4,.mkv，ts, iso ");
        assert!(exts.matches("a.mp4"));
        assert!(exts.matches("b.mkv"));
        assert!(exts.matches("c.ts"), "full-width comma separates entries");
        assert!(exts.matches("d.iso"));
        assert!(!exts.matches("e.srt"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let exts = MediaExts::parse("mkv");
        assert!(exts.matches("a.mkv"));
        assert!(!exts.matches("a.MKV"));
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(MediaExts::parse("mkv"));

        let media = dir.path().join("tv/Show/S01E01.mkv");
        let outcome = writer.write(&media, "http://srv/redirect?x=1").await.unwrap();

        let WriteOutcome::Written(path) = outcome else {
            panic!("expected a write");
        };
        assert_eq!(path, dir.path().join("tv/Show/S01E01.strm"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "http://srv/redirect?x=1");
    }

    #[tokio::test]
    async fn test_write_is_idempotent_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(MediaExts::parse("mkv"));
        let media = dir.path().join("A.mkv");

        writer.write(&media, "http://srv/old-and-longer-url").await.unwrap();
        writer.write(&media, "http://srv/new").await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("A.strm")).unwrap();
        assert_eq!(content, "http://srv/new", "full overwrite, no leftover bytes");
    }

    #[tokio::test]
    async fn test_write_skips_unlisted_extension() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StrmWriter::new(MediaExts::parse("mkv"));
        let media = dir.path().join("notes.txt");

        let outcome = writer.write(&media, "http://srv/x").await.unwrap();
        assert_eq!(outcome, WriteOutcome::SkippedExtension);
        assert!(!dir.path().join("notes.strm").exists());
    }
}
