/// Prefix written by the upload path when a document's text could not be
/// extracted.
pub const EXTRACTION_FAILED_SENTINEL: &str = "[Unable to extract";

/// Per-source character cap applied before prompting.
pub const MAX_SOURCE_CHARS: usize = 2000;

/// A source that survived sanitization, tagged with its 1-based position in
/// the caller's original selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSource {
    pub position: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sanitized {
    pub sources: Vec<SanitizedSource>,
    /// 1-based positions of sources dropped as failed extractions.
    pub skipped_positions: Vec<usize>,
}

pub fn is_failed_extraction(text: &str) -> bool {
    text.starts_with(EXTRACTION_FAILED_SENTINEL)
}

pub fn sanitize<S: AsRef<str>>(sources: &[S]) -> Sanitized {
    let mut out = Sanitized::default();

    for (i, source) in sources.iter().enumerate() {
        let text = source.as_ref();
        let position = i + 1;
        if is_failed_extraction(text) {
            out.skipped_positions.push(position);
            continue;
        }
        out.sources.push(SanitizedSource {
            position,
            text: truncate_chars(text, MAX_SOURCE_CHARS),
        });
    }

    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_failed_extractions_and_keeps_positions() {
        let sources = vec![
            "first".to_string(),
            "[Unable to extract text from scan.pdf]".to_string(),
            "third".to_string(),
        ];
        let result = sanitize(&sources);

        assert_eq!(result.skipped_positions, vec![2]);
        assert_eq!(
            result.sources,
            vec![
                SanitizedSource {
                    position: 1,
                    text: "first".to_string()
                },
                SanitizedSource {
                    position: 3,
                    text: "third".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sentinel_only_matches_prefix() {
        let result = sanitize(&["intro [Unable to extract] later"]);
        assert_eq!(result.sources.len(), 1);
        assert!(result.skipped_positions.is_empty());
    }

    #[test]
    fn test_truncates_to_max_chars() {
        let long = "a".repeat(MAX_SOURCE_CHARS + 500);
        let result = sanitize(&[long.as_str(), "short"]);
        assert_eq!(result.sources[0].text.len(), MAX_SOURCE_CHARS);
        assert_eq!(result.sources[1].text, "short");
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let long = "é".repeat(MAX_SOURCE_CHARS + 1);
        let result = sanitize(&[long]);
        assert_eq!(result.sources[0].text.chars().count(), MAX_SOURCE_CHARS);
    }

    #[test]
    fn test_exact_length_untouched() {
        let exact = "x".repeat(MAX_SOURCE_CHARS);
        let result = sanitize(&[exact.clone()]);
        assert_eq!(result.sources[0].text, exact);
    }

    #[test]
    fn test_empty_input() {
        let empty: Vec<String> = vec![];
        assert_eq!(sanitize(&empty), Sanitized::default());
    }
}
