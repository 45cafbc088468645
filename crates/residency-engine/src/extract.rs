//! Structured-output extraction from generated markdown.
//!
//! Lesson and homework text may open with a fenced ```json summary block.
//! Parsing it enriches the next stage's prompt; a missing or malformed block
//! degrades to an empty structure and must never abort the pipeline.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured facts a lesson exposes for homework generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonMetadata {
    pub key_points: Vec<String>,
    pub definitions: Vec<String>,
    pub core_derivations: Vec<String>,
    #[serde(rename = "labAPIs", alias = "labApis")]
    pub lab_apis: Vec<String>,
    pub edge_cases: Vec<String>,
    pub attack_scenario: Option<String>,
}

impl LessonMetadata {
    pub fn is_empty(&self) -> bool {
        self.key_points.is_empty()
            && self.definitions.is_empty()
            && self.core_derivations.is_empty()
            && self.lab_apis.is_empty()
            && self.edge_cases.is_empty()
            && self.attack_scenario.is_none()
    }
}

fn default_problem_kind() -> String {
    "problem".into()
}

/// One problem item from a homework's structured list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeworkProblem {
    pub id: String,
    #[serde(rename = "type", default = "default_problem_kind")]
    pub kind: String,
    #[serde(default)]
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeworkProblemList {
    pub problems: Vec<HomeworkProblem>,
}

impl HomeworkProblemList {
    pub fn total_points(&self) -> u32 {
        self.problems.iter().map(|p| p.points).sum()
    }
}

fn json_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A```(?:json)?[ \t]*\n(.*?)\n```").expect("fence regex is valid")
    })
}

fn leading_json_block(markdown: &str) -> Option<&str> {
    json_fence_re()
        .captures(markdown.trim_start())
        .map(|caps| caps.get(1).expect("capture 1 always present").as_str())
}

/// Parse a lesson's leading JSON summary block. `None` on any miss or
/// malformation; the caller falls back to defaults.
pub fn parse_lesson_metadata(markdown: &str) -> Option<LessonMetadata> {
    let block = leading_json_block(markdown)?;
    serde_json::from_str(block.trim()).ok()
}

/// Parse a homework's leading JSON problem list. Same degradation contract
/// as [`parse_lesson_metadata`].
pub fn parse_homework_problems(markdown: &str) -> Option<HomeworkProblemList> {
    let block = leading_json_block(markdown)?;
    serde_json::from_str(block.trim()).ok()
}

/// Strip a leading fenced JSON block so the remainder is the main content.
pub fn strip_leading_json_block(markdown: &str) -> &str {
    let trimmed = markdown.trim_start();
    match json_fence_re().find(trimmed) {
        Some(m) => trimmed[m.end()..].trim_start(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON: &str = r#"```json
{
  "keyPoints": ["Inverses exist for all nonzero elements"],
  "definitions": ["A field is a commutative ring where every nonzero element is a unit"],
  "edgeCases": ["p = 2"],
  "attackScenario": "Small subgroup confinement"
}
```

# Finite Fields

Lesson body here.
"#;

    #[test]
    fn test_parse_lesson_metadata() {
        let meta = parse_lesson_metadata(LESSON).unwrap();
        assert_eq!(meta.key_points.len(), 1);
        assert_eq!(meta.edge_cases, vec!["p = 2"]);
        assert_eq!(
            meta.attack_scenario.as_deref(),
            Some("Small subgroup confinement")
        );
        assert!(meta.core_derivations.is_empty());
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_missing_fence_degrades_to_none() {
        assert!(parse_lesson_metadata("# Just a heading\n\nNo fence.").is_none());
        // A fence that is not at the start does not count.
        assert!(parse_lesson_metadata("intro\n```json\n{}\n```").is_none());
    }

    #[test]
    fn test_malformed_json_degrades_to_none() {
        let md = "```json\n{ not valid json\n```\nrest";
        assert!(parse_lesson_metadata(md).is_none());
        assert!(parse_homework_problems(md).is_none());
    }

    #[test]
    fn test_parse_homework_problems() {
        let md = r#"```json
{"problems": [
  {"id": "P1", "type": "math", "points": 25, "title": "Inverse computation"},
  {"id": "P2", "type": "implementation", "points": 25},
  {"id": "P3", "points": 50}
]}
```

## Problems
"#;
        let list = parse_homework_problems(md).unwrap();
        assert_eq!(list.problems.len(), 3);
        assert_eq!(list.problems[1].kind, "implementation");
        assert_eq!(list.problems[2].kind, "problem");
        assert_eq!(list.total_points(), 100);
    }

    #[test]
    fn test_strip_leading_json_block() {
        let stripped = strip_leading_json_block(LESSON);
        assert!(stripped.starts_with("# Finite Fields"));
        // Without a block, content is returned unchanged apart from leading
        // whitespace.
        assert_eq!(strip_leading_json_block("  # Heading"), "# Heading");
    }

    #[test]
    fn test_plain_fence_without_language_tag() {
        let md = "```\n{\"keyPoints\": [\"a\"]}\n```\nbody";
        let meta = parse_lesson_metadata(md).unwrap();
        assert_eq!(meta.key_points, vec!["a"]);
    }
}
