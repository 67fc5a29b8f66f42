//! Prompt templates and reply parsing

use crate::graph::QueryResult;
use crate::llm::Message;

/// Rows of a Cypher result included in the answer prompt
pub const MAX_PROMPT_ROWS: usize = 25;

pub const ANSWER_SYSTEM_PROMPT: &str = "\
You are SchemaGenie, an assistant for exploring a catalog of OCA (Overlays Capture Architecture) \
data schemas stored in a graph database.

Answer using only the catalog context and query results you are given. Refer to schemas and \
attributes by their exact names. When an attribute is shared by several schemas, say which ones. \
Mention units, formats and allowed values when they matter to the question. If the context does \
not contain the answer, say so plainly and suggest what to search for instead. Keep answers short.";

pub const CYPHER_SYSTEM_PROMPT: &str = "\
You translate questions about a schema catalog into a single read-only Cypher query for Neo4j.

Graph model:
- (:Schema {id, name, displayName, capture_base_id, type, attribute_ordering, entry_code_ordering})
- (:Attribute {name, type, unit, description, format, vocabulary, codes})
  `description` and `vocabulary` are JSON strings keyed by language code (e.g. \"eng\").
  Attribute nodes are shared: one node per attribute name across all schemas.
- (:Meta {name, schema_id, language, description})
- (:Schema)-[:HAS_ATTRIBUTE]->(:Attribute)
- (:Schema)-[:HAS_META]->(:Meta)

Rules:
- Use only MATCH, OPTIONAL MATCH, WHERE, WITH, UNWIND, RETURN, ORDER BY and LIMIT.
- Never create, merge, set, remove or delete anything.
- Match text case-insensitively with toLower(...) CONTAINS.
- Return named columns and add LIMIT 25 unless the question asks for a count.
- Reply with the query in one ```cypher fenced block and nothing else.";

/// Messages asking the model for a Cypher query
pub fn cypher_messages(question: &str, context: &str) -> Vec<Message> {
    vec![
        Message::system(CYPHER_SYSTEM_PROMPT),
        Message::user(format!(
            "Catalog context:\n{}\nQuestion: {}",
            context.trim_end(),
            question
        )),
    ]
}

/// Text block describing the outcome of the generated query
pub fn render_query_section(
    cypher: Option<&str>,
    rows: Option<&QueryResult>,
    query_error: Option<&str>,
) -> Option<String> {
    let cypher = cypher?;
    let mut out = format!("Cypher query:\n{}\n", cypher);

    match (rows, query_error) {
        (_, Some(error)) => {
            out.push_str(&format!("The query failed: {}\n", error));
        }
        (Some(rows), None) if rows.is_empty() => out.push_str("The query returned no rows.\n"),
        (Some(rows), None) => {
            out.push_str(&format!("Query results ({} rows):\n", rows.rows.len()));
            out.push_str(&rows.to_text(MAX_PROMPT_ROWS));
        }
        (None, None) => {}
    }
    Some(out)
}

/// Messages asking the model for the final answer
pub fn answer_messages(
    history: &[Message],
    question: &str,
    context: &str,
    query_section: Option<&str>,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(ANSWER_SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());

    let mut prompt = format!("Catalog context:\n{}\n", context.trim_end());
    if let Some(section) = query_section {
        prompt.push('\n');
        prompt.push_str(section.trim_end());
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nQuestion: {}", question));

    messages.push(Message::user(prompt));
    messages
}

/// The query in a model reply
///
/// Takes the first ```cypher or untagged fenced block; failing that, a
/// reply that is itself a bare `MATCH` query.
pub fn extract_cypher(reply: &str) -> Option<String> {
    let mut rest = reply;

    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let (tag, body) = match after_fence.find('\n') {
            Some(nl) => (after_fence[..nl].trim(), &after_fence[nl + 1..]),
            None => return None,
        };
        let Some(end) = body.find("```") else {
            return None;
        };

        if tag.is_empty() || tag.eq_ignore_ascii_case("cypher") {
            let query = body[..end].trim();
            return (!query.is_empty()).then(|| query.to_string());
        }
        rest = &body[end + 3..];
    }

    let trimmed = reply.trim();
    let starts_with_match = trimmed
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("match"));
    starts_with_match.then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use serde_json::json;

    #[test]
    fn test_extract_tagged_block() {
        let reply = "Here you go:\n```cypher\nMATCH (s:Schema) RETURN s.name\n```\nDone.";
        assert_eq!(extract_cypher(reply).unwrap(), "MATCH (s:Schema) RETURN s.name");
    }

    #[test]
    fn test_extract_untagged_block() {
        let reply = "```\nMATCH (a:Attribute) RETURN a.name LIMIT 5\n```";
        assert_eq!(extract_cypher(reply).unwrap(), "MATCH (a:Attribute) RETURN a.name LIMIT 5");
    }

    #[test]
    fn test_extract_skips_other_languages() {
        let reply = "```sql\nSELECT 1\n```\n```Cypher\nMATCH (n) RETURN n\n```";
        assert_eq!(extract_cypher(reply).unwrap(), "MATCH (n) RETURN n");
    }

    #[test]
    fn test_extract_bare_match() {
        assert_eq!(
            extract_cypher("  match (n) return count(n)\n").unwrap(),
            "match (n) return count(n)"
        );
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_cypher("I cannot answer that.").is_none());
        assert!(extract_cypher("```cypher\n\n```").is_none());
        assert!(extract_cypher("```cypher\nMATCH (n)").is_none());
    }

    #[test]
    fn test_query_section() {
        let rows = QueryResult {
            columns: vec!["name".to_string()],
            rows: vec![vec![json!("soil_sample")]],
        };
        let section = render_query_section(Some("MATCH (s) RETURN s.name"), Some(&rows), None).unwrap();
        assert!(section.contains("Query results (1 rows)"));
        assert!(section.contains("soil_sample"));

        let failed = render_query_section(Some("MATCH"), None, Some("syntax error")).unwrap();
        assert!(failed.contains("The query failed: syntax error"));

        let empty = render_query_section(Some("MATCH"), Some(&QueryResult::default()), None).unwrap();
        assert!(empty.contains("no rows"));

        assert!(render_query_section(None, None, None).is_none());
    }

    #[test]
    fn test_answer_messages_layout() {
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let messages = answer_messages(&history, "Which units?", "ctx", Some("Cypher query:\nMATCH"));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "earlier");
        let last = &messages[3].content;
        assert!(last.starts_with("Catalog context:\nctx"));
        assert!(last.contains("Cypher query:"));
        assert!(last.ends_with("Question: Which units?"));
    }

    #[test]
    fn test_cypher_messages() {
        let messages = cypher_messages("How many schemas?", "ctx\n");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("HAS_ATTRIBUTE"));
        assert!(messages[1].content.ends_with("Question: How many schemas?"));
    }
}
