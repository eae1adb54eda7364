//! Stem naming constants and validation.

use crate::error::CoreError;

/// Stem produced by the default four-stem models.
pub const STEM_VOCALS: &str = "vocals";
pub const STEM_DRUMS: &str = "drums";
pub const STEM_BASS: &str = "bass";
pub const STEM_OTHER: &str = "other";

/// Default stem set, in model output order.
pub const DEFAULT_STEMS: [&str; 4] = [STEM_VOCALS, STEM_DRUMS, STEM_BASS, STEM_OTHER];

/// Maximum length of a stem name.
const MAX_STEM_NAME_LEN: usize = 32;

/// Validate a stem name supplied by a caller or a model.
///
/// Rules:
/// - Must not be empty or exceed `MAX_STEM_NAME_LEN` characters.
/// - Lowercase ASCII letters, digits, `-` and `_` only (names end up in storage keys).
pub fn validate_stem_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Stem name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_STEM_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Stem name must not exceed {MAX_STEM_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Stem name '{name}' may only contain lowercase letters, digits, hyphen or underscore"
        )));
    }
    Ok(())
}
