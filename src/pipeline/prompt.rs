use super::sanitize::SanitizedSource;

pub const DEFAULT_INSTRUCTIONS: &str = "Generate a comprehensive report based on the following sources. \
Include key findings, analysis, and recommendations.";

const CLOSING_INSTRUCTION: &str = "Please generate a comprehensive report based on the above sources. \
Include relevant details, comparisons, and insights from all provided sources.";

/// Renders the report prompt. Sources keep their selection position as the
/// `Source n:` label, so gaps remain where failed extractions were dropped.
pub fn compose(query: &str, instruction_template: &str, sources: &[SanitizedSource]) -> String {
    let combined = sources
        .iter()
        .map(|s| format!("Source {}:\n{}", s.position, s.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "\nSearch Topic: {query}\n\nInstructions: {instruction_template}\n\nSource Materials:\n{combined}\n\n{CLOSING_INSTRUCTION}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sanitize::sanitize;

    fn src(position: usize, text: &str) -> SanitizedSource {
        SanitizedSource {
            position,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_layout() {
        let prompt = compose(
            "solid state batteries",
            "Compare the approaches.",
            &[src(1, "Alpha text"), src(2, "Beta text")],
        );

        let expected = "\nSearch Topic: solid state batteries\n\n\
            Instructions: Compare the approaches.\n\n\
            Source Materials:\n\
            Source 1:\nAlpha text\n\n\
            Source 2:\nBeta text\n\n\
            Please generate a comprehensive report based on the above sources. \
            Include relevant details, comparisons, and insights from all provided sources.";
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_deterministic() {
        let sources = vec![src(1, "a"), src(3, "c")];
        assert_eq!(
            compose("q", DEFAULT_INSTRUCTIONS, &sources),
            compose("q", DEFAULT_INSTRUCTIONS, &sources)
        );
    }

    #[test]
    fn test_failed_sources_absent_and_positions_stable() {
        let raw = vec![
            "kept one".to_string(),
            "[Unable to extract content]".to_string(),
            "x".repeat(2500),
        ];
        let sanitized = sanitize(&raw);
        let prompt = compose("topic", "inst", &sanitized.sources);

        assert!(!prompt.contains("[Unable to extract"));
        assert!(prompt.contains("Source 1:\nkept one"));
        assert!(!prompt.contains("Source 2:"));
        assert!(prompt.contains(&format!("Source 3:\n{}\n\n", "x".repeat(2000))));
        assert!(!prompt.contains(&"x".repeat(2001)));
    }

    #[test]
    fn test_preserves_order_and_duplicates() {
        let prompt = compose("q", "i", &[src(1, "same"), src(2, "same")]);
        let first = prompt.find("Source 1:").unwrap();
        let second = prompt.find("Source 2:").unwrap();
        assert!(first < second);
        assert_eq!(prompt.matches("same").count(), 2);
    }
}
