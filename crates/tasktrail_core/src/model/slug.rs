//! Slug normalization shared by containers, tasks and path references.

/// Normalizes free text into a path-safe slug.
///
/// Lowercases, maps whitespace and `_` to `-`, drops everything outside
/// `[a-z0-9.-]`, then collapses and trims dashes. May return an empty string.
pub fn normalize_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '.' => Some(ch),
            '-' | '_' => None,
            ch if ch.is_whitespace() => None,
            _ => continue,
        };
        match mapped {
            Some(ch) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(ch);
            }
            None => pending_dash = true,
        }
    }
    slug
}

/// Returns whether `value` is already in normalized slug form.
pub fn is_normalized_slug(value: &str) -> bool {
    !value.is_empty() && normalize_slug(value) == value
}

#[cfg(test)]
mod tests {
    use super::{is_normalized_slug, normalize_slug};

    #[test]
    fn normalize_lowercases_and_dashes_separators() {
        assert_eq!(normalize_slug("Fix Login_Bug"), "fix-login-bug");
        assert_eq!(normalize_slug("  release  v1.2  "), "release-v1.2");
    }

    #[test]
    fn normalize_drops_unsafe_characters_and_collapses_dashes() {
        assert_eq!(normalize_slug("a//b??c"), "abc");
        assert_eq!(normalize_slug("--a -- b--"), "a-b");
        assert_eq!(normalize_slug("!!!"), "");
    }

    #[test]
    fn normalized_check_rejects_empty_and_raw_values() {
        assert!(is_normalized_slug("fix-login"));
        assert!(!is_normalized_slug(""));
        assert!(!is_normalized_slug("Fix Login"));
    }
}
