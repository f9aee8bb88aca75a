pub const DEFAULT_FILTER_THRESHOLD: f64 = 0.5;

/// Fraction of characters that are not alphanumeric. Whitespace and
/// punctuation both count against the text. Empty text yields 1.0.
pub fn non_alnum_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 1.0;
    }
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    1.0 - (alnum as f64 / total as f64)
}

/// Rejects empty text and text noisier than `threshold`.
pub fn is_acceptable(text: &str, threshold: f64) -> bool {
    if text.is_empty() {
        return false;
    }
    non_alnum_ratio(text) <= threshold
}
