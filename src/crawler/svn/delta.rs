//! SVN's update-editor protocol, expressed as a plain Rust trait so the
//! accumulator logic in [`FileRecordCollector`] can be driven directly by
//! synthetic callback sequences in tests, independent of any real SVN
//! server or even the `svn` CLI.

use std::collections::HashSet;

/// One callback per SVN delta-editor operation.
pub trait SvnDeltaEditor {
    fn target_revision(&mut self, rev: i64);
    fn open_root(&mut self, rev: i64);
    fn open_dir(&mut self, path: &str, rev: i64);
    fn add_dir(&mut self, path: &str, copy_from_path: Option<&str>, copy_from_rev: Option<i64>);
    fn close_dir(&mut self);
    fn open_file(&mut self, path: &str, rev: i64);
    fn add_file(&mut self, path: &str, copy_from_path: Option<&str>, copy_from_rev: Option<i64>);
    fn delete_entry(&mut self, path: &str, rev: i64);
    fn apply_text_delta(&mut self);
    fn text_delta_chunk(&mut self, window: &[u8]);
    fn text_delta_end(&mut self);
    fn change_file_property(&mut self, name: &str, value: &str);
    fn change_dir_property(&mut self, name: &str, value: &str);
    fn close_file(&mut self, path: &str, md5: Option<&str>);
    fn close_edit(&mut self);
}

const MAX_ACCUMULATOR_BYTES: usize = 5 * 1024 * 1024;

/// A file touched in the revision range being replayed, plus whatever
/// this editor pass could reconstruct about it. Finalization (outside
/// this module) still fetches authoritative content/properties at the
/// target revision -- see the driver.
#[derive(Debug, Clone, Default)]
pub struct CollectedFile {
    pub path: String,
    pub content: Option<String>,
    pub size: u64,
    pub readable: bool,
    pub last_author: Option<String>,
    pub last_date: Option<String>,
    pub project: Option<String>,
    pub version: String,
}

struct FileAccumulator {
    path: String,
    readable: bool,
    excluded: bool,
    buffer: Vec<u8>,
    discard: bool,
    last_author: Option<String>,
    last_date: Option<String>,
}

/// Drives directory-stack bookkeeping, the `tags` skip state, and
/// project/version inference while accumulating per-file content across
/// the `applyTextDelta`/`textDeltaChunk`/`textDeltaEnd`/`closeFile`
/// sequence.
pub struct FileRecordCollector<'a> {
    policy: &'a crate::exclusion::ExclusionPolicy,
    dir_stack: Vec<String>,
    skip_depth: Option<usize>,
    current_project: Option<String>,
    current_branch: Option<String>,
    current_file: Option<FileAccumulator>,
    pub updated: Vec<CollectedFile>,
    pub deleted: HashSet<String>,
}

impl<'a> FileRecordCollector<'a> {
    pub fn new(policy: &'a crate::exclusion::ExclusionPolicy) -> Self {
        Self {
            policy,
            dir_stack: Vec::new(),
            skip_depth: None,
            current_project: None,
            current_branch: None,
            current_file: None,
            updated: Vec::new(),
            deleted: HashSet::new(),
        }
    }

    fn skipping(&self) -> bool {
        self.skip_depth.is_some()
    }

    fn enter_dir(&mut self, path: &str) {
        let leaf = path.rsplit('/').next().unwrap_or(path);
        if leaf == "tags" && self.skip_depth.is_none() {
            self.skip_depth = Some(self.dir_stack.len());
        }
        if leaf == "trunk" || leaf == "branches" {
            self.current_project = self.dir_stack.last().cloned();
            self.current_branch = if leaf == "trunk" { Some("trunk".to_string()) } else { None };
        } else if self.current_branch.is_none() && self.dir_stack.last().map(String::as_str) == Some("branches") {
            self.current_branch = Some(leaf.to_string());
        }
        self.dir_stack.push(leaf.to_string());
    }

    fn exit_dir(&mut self) {
        if let Some(leaf) = self.dir_stack.pop() {
            if leaf == "trunk" || leaf == "branches" || self.dir_stack.last().map(String::as_str) == Some("branches") {
                self.current_project = None;
                self.current_branch = None;
            }
        }
        if let Some(depth) = self.skip_depth {
            if self.dir_stack.len() <= depth {
                self.skip_depth = None;
            }
        }
    }

    fn version(&self) -> String {
        self.current_branch.clone().unwrap_or_else(|| "trunk".to_string())
    }
}

impl<'a> SvnDeltaEditor for FileRecordCollector<'a> {
    fn target_revision(&mut self, _rev: i64) {}

    fn open_root(&mut self, _rev: i64) {
        self.dir_stack.clear();
        self.skip_depth = None;
        self.current_project = None;
        self.current_branch = None;
    }

    fn open_dir(&mut self, path: &str, _rev: i64) {
        self.enter_dir(path);
    }

    fn add_dir(&mut self, path: &str, _copy_from_path: Option<&str>, _copy_from_rev: Option<i64>) {
        self.enter_dir(path);
    }

    fn close_dir(&mut self) {
        self.exit_dir();
    }

    fn open_file(&mut self, path: &str, _rev: i64) {
        self.start_file(path);
    }

    fn add_file(&mut self, path: &str, _copy_from_path: Option<&str>, _copy_from_rev: Option<i64>) {
        self.start_file(path);
    }

    fn delete_entry(&mut self, path: &str, _rev: i64) {
        if self.skipping() {
            return;
        }
        self.deleted.insert(path.to_string());
    }

    fn apply_text_delta(&mut self) {}

    fn text_delta_chunk(&mut self, window: &[u8]) {
        let Some(file) = self.current_file.as_mut() else { return };
        if file.excluded || file.discard {
            return;
        }
        if file.buffer.len() + window.len() > MAX_ACCUMULATOR_BYTES {
            file.readable = false;
            file.discard = true;
            file.buffer.clear();
            return;
        }
        file.buffer.extend_from_slice(window);
    }

    fn text_delta_end(&mut self) {}

    fn change_file_property(&mut self, name: &str, value: &str) {
        let Some(file) = self.current_file.as_mut() else { return };
        match name {
            "svn:entry:last-author" => file.last_author = Some(value.to_string()),
            "svn:entry:committed-date" => file.last_date = Some(value.to_string()),
            "svn:mime-type" if !value.starts_with("text/") => file.readable = false,
            "svn:executable" => file.readable = false,
            _ => {}
        }
    }

    fn change_dir_property(&mut self, _name: &str, _value: &str) {}

    fn close_file(&mut self, _path: &str, _md5: Option<&str>) {
        let Some(file) = self.current_file.take() else { return };
        if file.excluded || self.skipping() {
            return;
        }
        let content = if file.readable {
            Some(ISO_8859_1.decode(&file.buffer))
        } else {
            None
        };
        self.updated.push(CollectedFile {
            size: file.buffer.len() as u64,
            path: file.path,
            content,
            readable: file.readable,
            last_author: file.last_author,
            last_date: file.last_date,
            project: self.current_project.clone(),
            version: self.version(),
        });
    }

    fn close_edit(&mut self) {}
}

impl<'a> FileRecordCollector<'a> {
    fn start_file(&mut self, path: &str) {
        let excluded = self.skipping() || self.policy.is_file_excluded(std::path::Path::new(path));
        let extension = crate::identity::extract_extension(path.rsplit('/').next().unwrap_or(path));
        self.current_file = Some(FileAccumulator {
            path: path.to_string(),
            readable: self.policy.is_readable_extension(&extension),
            excluded,
            buffer: Vec::new(),
            discard: false,
            last_author: None,
            last_date: None,
        });
    }
}

/// Lossless byte-to-Unicode-scalar decode: every ISO-8859-1 byte maps to
/// the codepoint of the same value.
struct Latin1;
const ISO_8859_1: Latin1 = Latin1;
impl Latin1 {
    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerConfig;
    use crate::exclusion::ExclusionPolicy;

    fn collector(policy: &ExclusionPolicy) -> FileRecordCollector<'_> {
        FileRecordCollector::new(policy)
    }

    #[test]
    fn skips_tags_subtree() {
        let policy = ExclusionPolicy::new(CrawlerConfig::default());
        let mut c = collector(&policy);
        c.open_root(1);
        c.open_dir("trunk", 1);
        c.close_dir();
        c.add_dir("tags", None, None);
        c.add_dir("tags/v2", None, None);
        c.add_file("tags/v2/a.rs", None, None);
        c.apply_text_delta();
        c.text_delta_chunk(b"fn main() {}");
        c.text_delta_end();
        c.close_file("tags/v2/a.rs", None);
        c.close_dir();
        c.close_dir();
        assert!(c.updated.is_empty());
    }

    #[test]
    fn infers_project_and_branch() {
        let policy = ExclusionPolicy::new(CrawlerConfig::default());
        let mut c = collector(&policy);
        c.open_root(1);
        c.open_dir("a", 1);
        c.open_dir("a/branches", 1);
        c.add_dir("a/branches/release-1", None, None);
        c.add_file("a/branches/release-1/x.rs", None, None);
        c.apply_text_delta();
        c.text_delta_chunk(b"fn x() {}");
        c.text_delta_end();
        c.close_file("a/branches/release-1/x.rs", None);
        c.close_dir();
        c.close_dir();
        c.close_dir();

        assert_eq!(c.updated.len(), 1);
        assert_eq!(c.updated[0].project.as_deref(), Some("a"));
        assert_eq!(c.updated[0].version, "release-1");
        assert_eq!(c.updated[0].content.as_deref(), Some("fn x() {}"));
    }

    #[test]
    fn delete_entry_enqueues_deleted_set() {
        let policy = ExclusionPolicy::new(CrawlerConfig::default());
        let mut c = collector(&policy);
        c.open_root(1);
        c.open_dir("a", 1);
        c.open_dir("a/branches", 1);
        c.open_dir("a/branches/legacy", 1);
        c.delete_entry("a/branches/legacy/c.rs", 1);
        c.close_dir();
        c.close_dir();
        c.close_dir();
        assert!(c.deleted.contains("a/branches/legacy/c.rs"));
    }

    #[test]
    fn executable_and_binary_mime_mark_unreadable() {
        let policy = ExclusionPolicy::new(CrawlerConfig::default());
        let mut c = collector(&policy);
        c.open_root(1);
        c.open_dir("trunk", 1);
        c.add_file("trunk/bin.out", None, None);
        c.change_file_property("svn:executable", "*");
        c.apply_text_delta();
        c.text_delta_chunk(b"\x00\x01binary");
        c.text_delta_end();
        c.close_file("trunk/bin.out", None);
        c.close_dir();

        assert_eq!(c.updated.len(), 1);
        assert!(c.updated[0].content.is_none());
    }
}
