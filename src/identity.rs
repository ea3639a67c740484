//! Deterministic identity for [`crate::models::FileRecord`]s.
//!
//! Unlike the random UUIDs a database-backed catalogue would hand out, an
//! index document's id has to be reproducible from the path alone: the same
//! path crawled twice must upsert the same document rather than leave a
//! stale duplicate behind.

use sha2::{Digest, Sha256};

/// `hex(sha256(utf8(path)))`.
pub fn file_id(canonical_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_path.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercased suffix after the last `.`, or `""` when the name has no dot
/// at a position greater than zero (so a dotfile like `.project` has no
/// extension, but `archive.tar.gz` has extension `gz`).
pub fn extract_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name[pos + 1..].to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_deterministic() {
        let a = file_id("/r/a/trunk/x.rs");
        let b = file_id("/r/a/trunk/x.rs");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn file_id_differs_by_path() {
        assert_ne!(file_id("/a"), file_id("/b"));
    }

    #[test]
    fn extract_extension_lowercases_and_handles_dotfiles() {
        assert_eq!(extract_extension("main.RS"), "rs");
        assert_eq!(extract_extension("archive.tar.gz"), "gz");
        assert_eq!(extract_extension(".project"), "");
        assert_eq!(extract_extension("Makefile"), "");
    }
}
