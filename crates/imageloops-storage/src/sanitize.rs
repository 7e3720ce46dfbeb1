/// Characters kept by [`sanitize_filename`] besides ASCII letters and digits.
const EXTRA_ALLOWED: &[char] = &['-', '_', '.', '(', ')', ' '];

/// Number of prompt characters used when deriving directory and file names.
pub const PROMPT_PREFIX_CHARS: usize = 50;

/// Returns true if `c` survives sanitization (before the space substitution).
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || EXTRA_ALLOWED.contains(&c)
}

/// Turn arbitrary text into a filename component.
///
/// Drops every character outside `[A-Za-z0-9-_.() ]`, then replaces spaces
/// with underscores. The result can still be empty, `.` or `..`; see
/// [`path_component`] for a variant that never is.
pub fn sanitize_filename(s: &str) -> String {
    s.chars()
        .filter(|c| is_allowed_char(*c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// First [`PROMPT_PREFIX_CHARS`] characters of a prompt, sanitized.
pub fn prompt_prefix(prompt: &str) -> String {
    let prefix: String = prompt.chars().take(PROMPT_PREFIX_CHARS).collect();
    sanitize_filename(&prefix)
}

/// Sanitized prompt prefix that is safe to use as a single path component.
pub fn path_component(prompt: &str) -> String {
    let name = prompt_prefix(prompt);
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_disallowed_characters() {
        assert_eq!(
            sanitize_filename("In Houston at 8pm, Heavy rain! 40°F?"),
            "In_Houston_at_8pm_Heavy_rain_40F"
        );
    }

    #[test]
    fn test_keeps_allowed_punctuation() {
        assert_eq!(sanitize_filename("a-b_c.d (e)"), "a-b_c.d_(e)");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Heavy rain, low visibility, 40s",
            "  leading and trailing  ",
            "slashes/and\\backslashes:colons*stars",
            "ünïcödé ☔ weather",
            "",
            "..",
        ];
        for input in inputs {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_output_never_contains_space_or_disallowed() {
        let input = "Sunny sky with few clouds; Temperature low at 37° & high up to 72°";
        let out = sanitize_filename(input);
        assert!(!out.contains(' '));
        assert!(out.chars().all(|c| is_allowed_char(c) && c != ' '));
    }

    #[test]
    fn test_prompt_prefix_counts_characters() {
        let prompt = "é".repeat(60) + "abc";
        assert_eq!(prompt_prefix(&prompt), "");

        let prompt = "x".repeat(80);
        assert_eq!(prompt_prefix(&prompt).len(), PROMPT_PREFIX_CHARS);
    }

    #[test]
    fn test_path_component_never_degenerate() {
        assert_eq!(path_component("☔☔☔"), "untitled");
        assert_eq!(path_component(".."), "untitled");
        assert_eq!(path_component("rain"), "rain");
    }
}
