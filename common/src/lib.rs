pub mod data;
pub mod error;
pub mod hash;
pub mod payloads;

pub use error::AnalysisError;
pub use hash::{hash_file, hash_reader};

/// Container extensions the server will analyse.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// Checks the extension only, case-insensitively. The content is not sniffed.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::allowed_file;

    #[test]
    fn extensions() {
        assert!(allowed_file("clip.mp4"));
        assert!(allowed_file("CLIP.MKV"));
        assert!(allowed_file("a.b.webm"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("mp4"));
        assert!(!allowed_file("clip.mp4.exe"));
    }
}
