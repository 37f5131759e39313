/// Split a remote path into its non-empty segments.
/// Remote paths always use forward slashes; duplicate or trailing
/// separators are tolerated.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Check whether `prefix` is a segment-wise prefix of `path`.
/// `/media` is a prefix of `/media/tv` but not of `/media2/tv`.
pub fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    let prefix: Vec<&str> = segments(prefix).collect();
    let full: Vec<&str> = segments(path).collect();

    if prefix.len() > full.len() {
        return false;
    }
    full[..prefix.len()] == prefix[..]
}

/// Strip `prefix` from `path` segment-wise, returning the remainder
/// joined with forward slashes. `None` when `prefix` does not match.
pub fn strip_segment_prefix(path: &str, prefix: &str) -> Option<String> {
    let prefix: Vec<&str> = segments(prefix).collect();
    let full: Vec<&str> = segments(path).collect();

    if prefix.len() > full.len() || full[..prefix.len()] != prefix[..] {
        return None;
    }
    Some(full[prefix.len()..].join("/"))
}

/// The dotted extension of a file name (`".mkv"`), or `None` when the
/// name has no extension. A leading dot alone (`".hidden"`) does not
/// count as an extension.
pub fn dotted_extension(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            Some(&file_name[stem.len()..])
        }
        _ => None,
    }
}

/// Replace a media file name's extension with `.strm`, keeping the stem.
pub fn strm_file_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.strm"),
        _ => format!("{file_name}.strm"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_prefix() {
        assert!(is_segment_prefix("/media", "/media/tv/show.mkv"));
        assert!(is_segment_prefix("/media", "/media"));
        assert!(is_segment_prefix("/", "/anything"));
    }

    #[test]
    fn test_segment_prefix_not_substring() {
        assert!(!is_segment_prefix("/media", "/media2/x.mkv"));
        assert!(!is_segment_prefix("/media/tv", "/media/tvshows"));
    }

    #[test]
    fn test_strip_segment_prefix() {
        assert_eq!(
            strip_segment_prefix("/media/tv/show.mkv", "/media").as_deref(),
            Some("tv/show.mkv")
        );
        assert_eq!(strip_segment_prefix("/media2/x.mkv", "/media"), None);
        assert_eq!(strip_segment_prefix("/media", "/media").as_deref(), Some(""));
    }

    #[test]
    fn test_strip_tolerates_trailing_slash() {
        assert_eq!(
            strip_segment_prefix("/media/tv/a.mkv", "/media/").as_deref(),
            Some("tv/a.mkv")
        );
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension("A.mkv"), Some(".mkv"));
        assert_eq!(dotted_extension("archive.tar.gz"), Some(".gz"));
        assert_eq!(dotted_extension("noext"), None);
        assert_eq!(dotted_extension(".hidden"), None);
    }

    #[test]
    fn test_strm_file_name() {
        assert_eq!(strm_file_name("A.mkv"), "A.strm");
        assert_eq!(strm_file_name("show.S01E01.1080p.mkv"), "show.S01E01.1080p.strm");
        assert_eq!(strm_file_name("noext"), "noext.strm");
    }
}
