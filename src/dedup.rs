use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Normalized keys shorter than this are too generic to tell reviews apart.
pub const MIN_MEANINGFUL_LEN: usize = 20;

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonical dedup key: lowercase, punctuation stripped, whitespace collapsed.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NOISE_RE.replace_all(&lower, "");
    SPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Keys accepted so far in the current run. Grows only.
#[derive(Debug, Default)]
pub struct DedupIndex {
    keys: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `text` must be treated as a duplicate. Otherwise the
    /// key is recorded and false is returned.
    pub fn seen(&mut self, text: &str) -> bool {
        let key = normalize(text);
        if key.chars().count() < MIN_MEANINGFUL_LEN {
            return true;
        }
        !self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
