//! Predicate over paths/extensions/MIME types, shared by every crawler
//! backend.

use crate::config::CrawlerConfig;
use crate::identity::extract_extension;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    config: CrawlerConfig,
}

impl ExclusionPolicy {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }

    /// True iff `dir`'s leaf name matches the configured excluded-directory
    /// set, or is literally `tags` -- SVN/FS tag subtrees are always
    /// skipped, independent of the configured set. Matching is
    /// case-sensitive, consistently across platforms.
    pub fn is_directory_excluded(&self, dir: &Path) -> bool {
        match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name == "tags" || self.config.directories_to_exclude.contains(name),
            None => false,
        }
    }

    /// True iff any path segment strictly between `root` and `path` matches
    /// the excluded-directory set. Used by count passes that may be handed
    /// a descendant directly, skipping the walk that would otherwise have
    /// pruned it.
    pub fn any_ancestor_excluded(&self, root: &Path, path: &Path) -> bool {
        let relative = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => return false,
        };
        relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|segment| segment == "tags" || self.config.directories_to_exclude.contains(segment))
    }

    /// True if the leaf name is in the files-to-exclude set, ends in `~`,
    /// has an excluded lowercase extension, or the detected MIME type of
    /// its first few kilobytes falls in the excluded-MIME set.
    pub fn is_file_excluded(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if self.config.files_to_exclude.contains(name) {
            return true;
        }
        if name.ends_with('~') {
            return true;
        }
        let ext = extract_extension(name);
        if self.config.extensions_to_exclude.contains(&ext) {
            return true;
        }
        match self.probe_mime(path) {
            Some(mime) => self.config.mimes_to_exclude.contains(&mime),
            None => false,
        }
    }

    /// `ext` is empty (extensionless files are assumed text) or in the
    /// configured readable set.
    pub fn is_readable_extension(&self, ext: &str) -> bool {
        ext.is_empty() || self.config.extensions_to_read.contains(ext)
    }

    /// Whether the content of `path` (size `size` bytes) should be read
    /// into the index, as opposed to indexing metadata only.
    pub fn should_read_content(&self, path: &Path, size: u64) -> bool {
        let ext = extract_extension(path.file_name().and_then(|n| n.to_str()).unwrap_or(""));
        self.is_readable_extension(&ext)
            && size <= self.config.max_file_bytes
            && !self.is_file_excluded(path)
    }

    /// Guess `path`'s MIME type from its extension. An unrecognized
    /// extension is logged and treated as "no MIME type", which the caller
    /// does not exclude on -- most programming-language extensions have no
    /// registered MIME type, so excluding on an unknown guess would drop
    /// ordinary source files rather than the binary/media content this
    /// check exists to catch.
    fn probe_mime(&self, path: &Path) -> Option<String> {
        match mime_guess::from_path(path).first() {
            Some(mime) => Some(mime.essence_str().to_string()),
            None => {
                warn!(path = %path.display(), "could not guess MIME type from extension");
                None
            }
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }
}

/// Simple `*`/`?` glob match, anchored at both ends, for GitLab/GitHub
/// project-name exclusion patterns.
pub fn glob_excludes(pattern: &str, name: &str) -> bool {
    glob_match::glob_match(pattern, name)
}
