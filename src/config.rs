use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Everything an [`crate::exclusion::ExclusionPolicy`] and the various
/// crawlers need that isn't specific to one `Repository`.
///
/// The application embedding this crate owns loading this from TOML/env/CLI
/// flags (the way the teacher's own `AppConfig` layers `ServerConfig` etc.);
/// this crate only defines the shape and a reasonable `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub directories_to_exclude: HashSet<String>,
    pub files_to_exclude: HashSet<String>,
    pub extensions_to_exclude: HashSet<String>,
    pub mimes_to_exclude: HashSet<String>,
    pub extensions_to_read: HashSet<String>,
    pub batch_size: usize,
    pub working_directory: PathBuf,
    pub max_file_bytes: u64,
    pub max_symlink_depth: u32,
}

impl CrawlerConfig {
    /// Overlay the scalar fields with environment variables, the way the
    /// teacher's `AppConfig::new` does for its own sections. The set fields
    /// are left at their defaults -- callers that want custom exclusion
    /// sets construct `CrawlerConfig` directly instead.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CRAWLER_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                config.batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("CRAWLER_MAX_FILE_BYTES") {
            if let Ok(n) = v.parse() {
                config.max_file_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("CRAWLER_MAX_SYMLINK_DEPTH") {
            if let Ok(n) = v.parse() {
                config.max_symlink_depth = n;
            }
        }
        if let Ok(v) = std::env::var("CRAWLER_WORKING_DIRECTORY") {
            config.working_directory = PathBuf::from(v);
        }

        config
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let directories_to_exclude = [
            ".git", ".svn", ".hg", "node_modules", "target", "__pycache__", "dist", "build",
            "vendor", ".venv", "venv",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let files_to_exclude = [".DS_Store", "Thumbs.db", "package-lock.json", "Cargo.lock"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let extensions_to_exclude = [
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "pdf", "zip", "tar", "gz",
            "7z", "rar", "exe", "dll", "so", "dylib", "bin", "class", "jar", "war", "woff",
            "woff2", "ttf", "eot", "mp3", "mp4", "avi", "mov", "lock",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mimes_to_exclude = [
            "application/octet-stream",
            "application/zip",
            "application/x-executable",
            "image/png",
            "image/jpeg",
            "image/gif",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let extensions_to_read = [
            "rs", "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "cc", "h", "hpp", "go",
            "rb", "php", "cs", "swift", "kt", "scala", "clj", "hs", "ml", "fs", "elm", "dart",
            "vue", "html", "css", "scss", "less", "sql", "sh", "bash", "zsh", "fish", "ps1",
            "bat", "cmd", "yaml", "yml", "json", "toml", "xml", "md", "txt", "cfg", "conf",
            "ini", "properties", "gradle", "pom", "sbt", "cmake", "r", "m", "pl", "lua",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            directories_to_exclude,
            files_to_exclude,
            extensions_to_exclude,
            mimes_to_exclude,
            extensions_to_read,
            batch_size: 100,
            working_directory: PathBuf::from("./work"),
            max_file_bytes: 5 * 1024 * 1024,
            max_symlink_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CrawlerConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_file_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_symlink_depth, 64);
        assert!(config.directories_to_exclude.contains("node_modules"));
        assert!(config.extensions_to_read.contains("rs"));
    }
}
