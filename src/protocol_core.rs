//! Resource name handling shared by the listener and the initiator
//!
//! Peer-supplied names are mapped to local paths here and nowhere else.

use std::path::{Path, PathBuf};

/// Literal substituted for any name containing a parent-directory marker.
pub const UNSAFE_NAME: &str = "unsafe";

/// Literal substituted for a name that is empty after stripping directories.
pub const EMPTY_NAME: &str = "file";

/// Reduce a peer-supplied resource name to a bare local file name.
///
/// 1. Any `..` anywhere in the name replaces the whole name with `unsafe`
/// 2. Otherwise keep only the text after the last `/` or `\`
/// 3. An empty remainder becomes `file`
///
/// The `..` check runs on the full name, so a traversal attempt is flagged
/// even when the directory part is stripped away. This is the entire
/// traversal defense for uploads. Names like `.` survive unchanged and fail
/// later at file creation.
pub fn safe_name(name: &str) -> String {
    if name.contains("..") {
        return UNSAFE_NAME.to_string();
    }
    let base = match name.rfind(|c| c == '/' || c == '\\') {
        Some(idx) => &name[idx + 1..],
        None => name,
    };
    if base.is_empty() {
        return EMPTY_NAME.to_string();
    }
    base.to_string()
}

/// Destination of a PUT: always the sanitized name directly under `root`.
pub fn resolve_write_path(root: &Path, name: &str) -> PathBuf {
    root.join(safe_name(name))
}

/// Source of a GET.
///
/// Unconfined, the name is taken as a literal path: relative names resolve
/// against `root`, absolute names are used as-is. Confined, the name goes
/// through the same sanitizer as uploads.
pub fn resolve_read_path(root: &Path, name: &str, confine: bool) -> PathBuf {
    if confine {
        resolve_write_path(root, name)
    } else {
        root.join(name)
    }
}

/// Default name derived from a path on the initiator side (upload remote
/// name, download save name). Only the final component is considered, so a
/// relative source like `../build/out.bin` still maps to `out.bin`.
pub fn default_local_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    safe_name(&base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name_traversal() {
        assert_eq!(safe_name("../../etc/passwd"), "unsafe");
        assert_eq!(safe_name(".."), "unsafe");
        assert_eq!(safe_name("a/b/..hidden"), "unsafe");
        assert_eq!(safe_name("dir\\..\\..\\x..y"), "unsafe");
    }

    #[test]
    fn test_safe_name_strips_directories() {
        assert_eq!(safe_name("a/b/report.txt"), "report.txt");
        assert_eq!(safe_name("C:\\Users\\me\\notes.md"), "notes.md");
        assert_eq!(safe_name("mixed/sep\\last.bin"), "last.bin");
        assert_eq!(safe_name("noslash.txt"), "noslash.txt");
    }

    #[test]
    fn test_safe_name_empty() {
        assert_eq!(safe_name(""), "file");
        assert_eq!(safe_name("trailing/"), "file");
        assert_eq!(safe_name("\\"), "file");
    }

    #[test]
    fn test_safe_name_dot_survives() {
        assert_eq!(safe_name("."), ".");
        assert_eq!(safe_name("a.b.c"), "a.b.c");
    }

    #[test]
    fn test_resolve_paths() {
        let root = Path::new("/srv/drop");
        assert_eq!(
            resolve_write_path(root, "../../etc/cron.d/job"),
            PathBuf::from("/srv/drop/unsafe")
        );
        assert_eq!(
            resolve_read_path(root, "sub/data.bin", false),
            PathBuf::from("/srv/drop/sub/data.bin")
        );
        assert_eq!(
            resolve_read_path(root, "/etc/hosts", false),
            PathBuf::from("/etc/hosts")
        );
        assert_eq!(
            resolve_read_path(root, "/etc/hosts", true),
            PathBuf::from("/srv/drop/hosts")
        );
        assert_eq!(
            resolve_read_path(root, "../secret", true),
            PathBuf::from("/srv/drop/unsafe")
        );
    }

    #[test]
    fn test_default_local_name() {
        assert_eq!(default_local_name(Path::new("/tmp/x/upload.iso")), "upload.iso");
        assert_eq!(default_local_name(Path::new("../build/out.bin")), "out.bin");
        assert_eq!(default_local_name(Path::new("")), "file");
        assert_eq!(default_local_name(Path::new("..")), "file");
    }
}
