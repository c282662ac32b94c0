//! Content addressing for source artifacts
//!
//! Source files are deduplicated by the pair (virtual path, MD5 digest).
//! The virtual path is the file's location on the machine that executed
//! the run, not where the snapshot currently lives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Compute the lowercase hex MD5 digest of a byte slice
#[must_use]
pub fn content_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Deduplication key of an artifact
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress {
    /// `base_dir` joined with the source file name
    pub path: String,
    /// MD5 digest from the source manifest, lowercase hex
    pub md5: String,
}

impl ContentAddress {
    /// Build the address of `source_name` recorded under `base_dir`.
    ///
    /// The digest is normalized to the lowercase hex [`content_md5`] emits.
    #[must_use]
    pub fn new(base_dir: &str, source_name: &str, md5: impl AsRef<str>) -> Self {
        Self {
            path: virtual_path(base_dir, source_name),
            md5: md5.as_ref().trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.md5)
    }
}

/// Join a recorded base directory and a source name.
///
/// An absolute source name replaces the base directory.
#[must_use]
pub fn virtual_path(base_dir: &str, source_name: &str) -> String {
    Path::new(base_dir)
        .join(source_name)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_md5() {
        assert_eq!(content_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_virtual_path() {
        assert_eq!(virtual_path("/home/user/exp", "a.py"), "/home/user/exp/a.py");
        assert_eq!(
            virtual_path("/home/user/exp", "pkg/model.py"),
            "/home/user/exp/pkg/model.py"
        );
        assert_eq!(virtual_path("/home/user/exp", "/opt/lib.py"), "/opt/lib.py");
    }

    #[test]
    fn test_content_address_display() {
        let addr = ContentAddress::new("/exp", "a.py", "abc");
        assert_eq!(addr.path, "/exp/a.py");
        assert_eq!(addr.to_string(), "/exp/a.py@abc");
    }

    #[test]
    fn test_content_address_normalizes_digest() {
        let addr = ContentAddress::new("/exp", "a.py", " 5D41402ABC4B2A76B9719D911017C592\n");
        assert_eq!(addr.md5, content_md5(b"hello"));
    }
}
