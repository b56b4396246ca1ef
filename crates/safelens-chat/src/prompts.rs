//! Prompt templates for each completion-backed node.

use safelens_core::{Row, SemanticContext};

/// Cap on rows serialized into summarization and visualization prompts.
pub const MAX_PROMPT_ROWS: usize = 50;

pub const INTENT_SYSTEM: &str = "You classify messages sent to a workplace safety data assistant. \
Reply with exactly one word: `general` if the message is small talk, a greeting, thanks, or a \
question about the assistant itself; `data_query` if it asks about incidents, near misses, \
inspections or any other safety data. No punctuation, no explanation.";

pub const GREETING_SYSTEM: &str = "You are a friendly assistant for workplace safety incident data. \
Reply to the user's message in one or two short sentences. If it fits, mention that you can answer \
questions about incident reports, near-miss events and safety inspections.";

pub const RESOLVER_SYSTEM: &str = "You pick the dataset that can answer a question about workplace \
safety. Reply with the bare dataset id only, exactly as written in the catalog. No quotes, no \
formatting, no explanation.";

pub const SYNTHESIS_SYSTEM: &str = "You write a single SQL SELECT statement that answers the \
user's question against the given dataset. Use only the columns described. Reply with the bare \
query only: no code fences, no comments, no explanation.";

pub const CLARIFICATION_SYSTEM: &str = "You help a user whose question about safety data could not \
be answered. Politely ask them to rephrase or add detail (time period, location, type of event). \
Do not mention databases, SQL, queries, tables, errors or any technical detail. Keep it to two \
sentences.";

pub const SUMMARY_SYSTEM: &str = "You summarize query results for a workplace safety team. Answer \
the user's question in plain language using only the rows given. Refer to the data source by its \
display name. Be concise and include the key numbers.";

pub const VISUALIZATION_SYSTEM: &str = "You design one chart for a set of query results. Reply with \
exactly one JSON object and nothing else. Use the shape {\"type\": \"bar|line|pie|scatter\", \
\"title\": string, \"x\": {\"field\": string, \"label\": string}, \"y\": {\"field\": string, \
\"label\": string}, \"series\": [{\"name\": string, \"field\": string}]}. If a chart would not be \
meaningful, reply with {}.";

pub fn intent_prompt(question: &str) -> String {
    format!("Message: {}", question)
}

pub fn resolver_prompt(question: &str, catalog: &str) -> String {
    format!("Available datasets:\n{}\n\nQuestion: {}", catalog, question)
}

pub fn synthesis_prompt(question: &str, dataset_id: &str, semantics: &SemanticContext) -> String {
    let semantics = if semantics.is_empty() {
        "(no column descriptions available)".to_string()
    } else {
        serde_json::to_string_pretty(semantics).unwrap_or_default()
    };
    format!(
        "Dataset: {}\nColumn semantics:\n{}\n\nQuestion: {}",
        dataset_id, semantics, question
    )
}

pub fn clarification_prompt(question: &str, error: &str) -> String {
    format!(
        "The user asked: {}\nInternal failure note (never repeat or paraphrase it): {}",
        question, error
    )
}

pub fn summary_prompt(question: &str, dataset_label: &str, rows: &[Row]) -> String {
    format!(
        "Data source: {}\nRows returned: {}\nRows:\n{}\n\nQuestion: {}",
        dataset_label,
        rows.len(),
        render_rows(rows),
        question
    )
}

pub fn visualization_prompt(question: &str, rows: &[Row]) -> String {
    format!(
        "Question: {}\nRows returned: {}\nRows:\n{}",
        question,
        rows.len(),
        render_rows(rows)
    )
}

/// Rows as a JSON array, truncated to [`MAX_PROMPT_ROWS`].
pub fn render_rows(rows: &[Row]) -> String {
    let shown = &rows[..rows.len().min(MAX_PROMPT_ROWS)];
    let mut text = serde_json::to_string(shown).unwrap_or_else(|_| "[]".to_string());
    if rows.len() > MAX_PROMPT_ROWS {
        text.push_str(&format!("\n({} more rows omitted)", rows.len() - MAX_PROMPT_ROWS));
    }
    text
}
