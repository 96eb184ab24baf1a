//! ISO-639-1 → English language names, for the expression view.

const LANGUAGES: &[(&str, &str)] = &[
    ("aa", "Afar"),
    ("ar", "Arabic"),
    ("bn", "Bengali"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ms", "Malay"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sv", "Swedish"),
    ("ta", "Tamil"),
    ("th", "Thai"),
    ("tl", "Tagalog"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

/// English name for an ISO-639-1 code; unknown codes pass through as-is.
#[must_use]
pub fn english_name(code: &str) -> String {
    let lowered = code.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(iso, _)| *iso == lowered)
        .map_or_else(|| code.to_string(), |(_, name)| (*name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_codes() {
        assert_eq!(english_name("ja"), "Japanese");
        assert_eq!(english_name("EN"), "English");
    }

    #[test]
    fn unknown_codes_pass_through() {
        assert_eq!(english_name("xx"), "xx");
    }
}
