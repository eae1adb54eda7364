//! Storage key naming.
//!
//! Inputs live under `source/`, separated stems under `pre/<job_id>/`. Every
//! upload gets a fresh UUID segment, so keys are unique per upload even when
//! hints repeat.

use crate::error::StorageError;

/// Prefix for uploaded source audio.
pub const SOURCE_PREFIX: &str = "source";

/// Prefix for separated stems.
pub const STEMS_PREFIX: &str = "pre";

/// Maximum length of a sanitized file name component.
const MAX_FILE_NAME_LEN: usize = 128;

/// Hint for an uploaded source file. The client-supplied name is sanitized.
pub fn source_hint(file_name: Option<&str>) -> String {
    let name = file_name
        .map(sanitize_file_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "input".to_string());
    format!("{SOURCE_PREFIX}/{name}")
}

/// Hint for one separated stem of a job.
pub fn stem_hint(job_id: &str, stem: &str) -> String {
    format!("{STEMS_PREFIX}/{job_id}/{stem}.wav")
}

/// Turn a hint such as `pre/<job>/vocals.wav` into a unique key
/// `pre/<job>/<uuid>/vocals.wav`.
pub fn derive_key(hint: &str) -> Result<String, StorageError> {
    let hint = hint.trim_matches('/');
    if hint.is_empty() {
        return Err(StorageError::InvalidKey("hint must not be empty".into()));
    }
    if hint.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(StorageError::InvalidKey(format!(
            "hint '{hint}' contains an empty or relative path segment"
        )));
    }

    let unique = uuid::Uuid::now_v7();
    Ok(match hint.rsplit_once('/') {
        Some((prefix, name)) => format!("{prefix}/{unique}/{name}"),
        None => format!("{unique}/{hint}"),
    })
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; replace everything else.
fn sanitize_file_name(name: &str) -> String {
    // Browsers may send a full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();
    cleaned.trim_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_are_unique_for_same_hint() {
        let a = derive_key("source/song.mp3").unwrap();
        let b = derive_key("source/song.mp3").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("source/"));
        assert!(a.ends_with("/song.mp3"));
    }

    #[test]
    fn bare_hint_gets_uuid_prefix() {
        let key = derive_key("blob").unwrap();
        assert!(key.ends_with("/blob"));
        assert_eq!(key.split('/').count(), 2);
    }

    #[test]
    fn relative_segments_rejected() {
        assert!(derive_key("source/../secret").is_err());
        assert!(derive_key("a//b").is_err());
        assert!(derive_key("").is_err());
    }

    #[test]
    fn source_hint_sanitizes_client_names() {
        assert_eq!(source_hint(Some("C:\\music\\my song.mp3")), "source/my_song.mp3");
        assert_eq!(source_hint(Some("../../etc/passwd")), "source/passwd");
        assert_eq!(source_hint(Some("..")), "source/input");
        assert_eq!(source_hint(None), "source/input");
    }

    #[test]
    fn stem_hint_layout() {
        assert_eq!(stem_hint("abc", "vocals"), "pre/abc/vocals.wav");
    }
}
