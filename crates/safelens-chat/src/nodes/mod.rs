//! Workflow nodes.
//!
//! Each node reads the fields it needs from [`WorkflowState`](safelens_core::WorkflowState),
//! writes its outputs back, and returns. Only intent classification and the
//! run context (cancellation, deadline) can abort a run; every other failure
//! is folded into state.

mod clarifier;
mod executor;
mod greeting;
mod intent;
mod resolver;
mod semantic;
mod summarizer;
mod synthesizer;
mod visualizer;

use std::sync::LazyLock;

use regex::Regex;

pub use clarifier::ClarificationAgent;
pub use executor::QueryExecutor;
pub use greeting::GreetingAgent;
pub use intent::IntentClassifier;
pub use resolver::TableResolver;
pub use semantic::SemanticLoad;
pub use summarizer::ResultSummarizer;
pub use synthesizer::QuerySynthesizer;
pub use visualizer::VisualizationSynthesizer;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```(?:[A-Za-z0-9_-]*[ \t]*\n)?(.*?)\n?[ \t]*```\s*$")
        .expect("Invalid code fence regex")
});

/// Remove a surrounding markdown code fence, if the whole text is one.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("SELECT 1"), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1 \n"), "SELECT 1");
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```\nSELECT 1;\n```\n"), "SELECT 1;");
        assert_eq!(strip_code_fences("```json\n{\"type\": \"bar\"}\n```"), "{\"type\": \"bar\"}");
        assert_eq!(strip_code_fences("```SELECT 2```"), "SELECT 2");
    }

    #[test]
    fn test_strip_code_fences_keeps_inner_text() {
        assert_eq!(
            strip_code_fences("SELECT '```' AS tick"),
            "SELECT '```' AS tick"
        );
    }
}
