use regex::Regex;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, hyphen separated, no leading/trailing hyphens.
pub fn slugify(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}
