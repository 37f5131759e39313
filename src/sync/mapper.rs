use std::path::PathBuf;

use crate::util::path as sync_path;

/// One configured local/remote root pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub local_root: PathBuf,
    pub remote_root: String,
}

impl MappingRule {
    /// Mirror an absolute remote path under this rule's local root.
    /// `None` when the path is not under the rule's remote root.
    pub fn local_target(&self, remote_path: &str) -> Option<PathBuf> {
        let rel = sync_path::strip_segment_prefix(remote_path, &self.remote_root)?;
        if rel.is_empty() {
            return Some(self.local_root.clone());
        }
        Some(self.local_root.join(rel))
    }
}

/// The ordered list of configured path mappings, parsed from one
/// `local#remote` pair per line.
#[derive(Debug, Clone, Default)]
pub struct MappingRules {
    rules: Vec<MappingRule>,
}

impl MappingRules {
    /// Parse the pair list. Blank lines are ignored and lines without a
    /// `#` separator are dropped at load time, not at resolve time.
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((local, remote)) = line.split_once('#') else {
                tracing::debug!(line, "ignoring malformed mapping line");
                continue;
            };
            rules.push(MappingRule {
                local_root: PathBuf::from(local.trim()),
                remote_root: remote.trim().to_string(),
            });
        }
        Self { rules }
    }

    /// The first rule (in file order) whose remote root is a segment-wise
    /// prefix of `remote_path`. `None` means the caller skips the item.
    pub fn resolve(&self, remote_path: &str) -> Option<&MappingRule> {
        self.rules
            .iter()
            .find(|r| sync_path::is_segment_prefix(&r.remote_root, remote_path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
