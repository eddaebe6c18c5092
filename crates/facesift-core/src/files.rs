//! File-name and file-description helpers shared by the registry and pipeline.

use std::path::Path;

/// Case-insensitive suffix test against an extension allow-list.
///
/// Entries carry their leading dot (".jpg") and match as suffixes of the
/// file name, so `IMG.JPG` and `shot.final.jpg` both pass for ".jpg".
pub fn extension_allowed(path: &Path, allowed: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();
    allowed.iter().any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// Human-readable `name (size, modified time)` string for log lines.
///
/// Falls back to the bare name when the file cannot be stat'ed (it may
/// already be gone).
pub fn describe_file(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let Ok(meta) = std::fs::metadata(path) else {
        return name;
    };

    let size = format_size(meta.len());
    match meta.modified() {
        Ok(modified) => {
            let local = chrono::DateTime::<chrono::Local>::from(modified);
            format!("{name} ({size}, modified {})", local.format("%Y-%m-%d %H:%M:%S"))
        }
        Err(_) => format!("{name} ({size})"),
    }
}

/// Format a byte count with 1024-based units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_allowed_case_insensitive() {
        let allowed = exts(&[".jpg", ".png"]);
        assert!(extension_allowed(Path::new("/tmp/a.jpg"), &allowed));
        assert!(extension_allowed(Path::new("/tmp/A.JPG"), &allowed));
        assert!(extension_allowed(Path::new("/tmp/b.PnG"), &allowed));
    }

    #[test]
    fn test_extension_allowed_rejects_others() {
        let allowed = exts(&[".jpg"]);
        assert!(!extension_allowed(Path::new("/tmp/a.txt"), &allowed));
        assert!(!extension_allowed(Path::new("/tmp/a.jpeg2"), &allowed));
        assert!(!extension_allowed(Path::new("/tmp/noext"), &allowed));
    }

    #[test]
    fn test_extension_allowed_is_suffix_match() {
        // ".jpg" matches any name ending in it, dotfiles included.
        let allowed = exts(&[".jpg"]);
        assert!(extension_allowed(Path::new("/tmp/archive.tar.jpg"), &allowed));
        assert!(extension_allowed(Path::new("/tmp/.jpg"), &allowed));
    }

    #[test]
    fn test_extension_allowed_empty_list() {
        assert!(!extension_allowed(Path::new("/tmp/a.jpg"), &[]));
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_describe_file_missing_falls_back_to_name() {
        let path = PathBuf::from("/nonexistent/dir/ghost.jpg");
        assert_eq!(describe_file(&path), "ghost.jpg");
    }

    #[test]
    fn test_describe_file_includes_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let described = describe_file(&path);
        assert!(described.starts_with("photo.jpg (2.0 KB"), "got: {described}");
    }
}
