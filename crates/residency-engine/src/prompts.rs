//! Prompt templates for lesson generation, grading, and summaries.
//!
//! Templates use `{{placeholder}}` syntax and are rendered by [`render`].
//! An unresolved placeholder is a hard error: every call site binds a fixed
//! variable set, so a miss is a programming mistake and must not silently
//! produce an empty substitution.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever template content
//! changes, so a given artifact can be traced back to the prompt that
//! produced it.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::personas::ProfessorPersona;

/// Prompt version. Bump on any template content change.
pub const PROMPT_VERSION: &str = "2.1.0";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unresolved placeholder \"{name}\" in prompt template")]
    UnresolvedPlaceholder { name: String },
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").expect("placeholder regex is valid"))
}

/// Substitute `{{name}}` placeholders from `vars`. Fails on any placeholder
/// without a binding.
pub fn render(template: &str, vars: &[(&str, String)]) -> Result<String, PromptError> {
    let re = placeholder_re();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let full = caps.get(0).expect("capture 0 always present");
        let name = caps[1].trim();
        let value = vars
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| PromptError::UnresolvedPlaceholder {
                name: name.to_string(),
            })?;
        out.push_str(&template[last..full.start()]);
        out.push_str(value);
        last = full.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

// ── Lesson ────────────────────────────────────────────────────────────────

pub const LESSON_SYSTEM: &str = "\
You are {{persona.name}}, a cryptography professor with the following profile:

TEACHING STYLE:
{{persona.teachingStyle}}

FOCUS AREAS:
{{persona.focusAreas}}

LESSON TONE:
{{persona.lessonTone}}

STRICTNESS LEVEL: {{persona.strictness}}/10

Your task is to generate a complete cryptography lesson. Begin your output \
with a fenced ```json block containing a summary object with these keys: \
\"keyPoints\", \"definitions\", \"coreDerivations\", \"labAPIs\", \"edgeCases\" \
(arrays of strings) and \"attackScenario\" (string). After the fenced block, \
the lesson MUST be in Markdown format and include ALL of the following \
sections — do not omit any:

1. **Formal Explanation** — rigorous, complete, and written in your established tone
2. **Derivation Section** — step-by-step mathematical derivation with no skipped steps
3. **Implementation Lab** — pseudocode or Python/TypeScript code with explicit edge cases
4. **Adversarial Thinking Challenge** — a concrete attack scenario the student must analyze
5. **Mastery Requirements** — an explicit list of what the student must demonstrate to pass{{retryNote}}";

pub const LESSON_USER: &str = "\
Generate a complete lesson for Day {{day}}: **{{topic}}**.

This lesson is part of an intensive cryptography residency. The student is \
expected to achieve mastery.

Governed specification for this day (objectives, constraints, rubric contract):

```json
{{governedSpecsJson}}
```";

// ── Homework ──────────────────────────────────────────────────────────────

pub const HOMEWORK_SYSTEM: &str = "\
You are {{persona.name}}. Generate a homework assignment for the lesson just \
taught. Begin your output with a fenced ```json block of the form \
{\"problems\": [{\"id\", \"type\", \"points\", \"title\"}]} listing every \
problem. After the fenced block, format the assignment as Markdown.

The homework must contain:
1. Three rigorous mathematical problems (proof-style or derivation-style)
2. One implementation problem with explicit edge case requirements
3. One adversarial analysis problem — describe a flawed protocol and ask the student to break it

Where the governed specification overrides these counts, follow the governed \
specification. Be precise about what constitutes a complete answer.{{retryNote}}";

pub const HOMEWORK_USER: &str = "\
The lesson for \"{{topic}}\" established the following structured facts:

```json
{{lessonFactsJson}}
```

Governed specification for this day:

```json
{{governedSpecsJson}}
```

Generate the homework assignment. Problems must exercise the key points, \
definitions, edge cases, and attack scenario above.";

// ── Rubric ────────────────────────────────────────────────────────────────

pub const RUBRIC_SYSTEM: &str = "\
You are {{persona.name}}. Generate a grading rubric for the homework \
assignment.

GRADING BIAS:
{{persona.gradingBias}}

The rubric must:
1. Assign point values to each problem (total = 100 points)
2. List explicit criteria for full credit, partial credit, and zero credit for each problem
3. Include a \"Mastery Gate\" section — the minimum score and conditions required to PASS
4. State the passing threshold: score >= {{passScore}} AND no rubric dimension below its minimum threshold

Format as Markdown with clear tables or structured lists.";

pub const RUBRIC_USER: &str = "\
The homework assignment contains the following problems:

```json
{{problemsJson}}
```

Governed specification for this day:

```json
{{governedSpecsJson}}
```

Generate the grading rubric covering every problem listed above.";

// ── Grading ───────────────────────────────────────────────────────────────

pub const GRADING_SYSTEM: &str = "\
You are {{persona.name}}, grading a cryptography homework submission.

GRADING BIAS:
{{persona.gradingBias}}

STRICTNESS LEVEL: {{persona.strictness}}/10 — {{strictnessDescription}}

Grade the submission against the rubric. The passing threshold is \
{{passScore}}/100.

Respond with ONLY a JSON object — no prose before or after — of the exact \
form: {\"score\": <integer 0-100>, \"pass\": <boolean>, \"feedback\": \
\"<specific, actionable feedback>\"}";

pub const GRADING_USER: &str = "\
LESSON:

{{lesson}}

RUBRIC:

{{rubric}}

STUDENT SUBMISSION:

{{submission}}";

// ── Summary ───────────────────────────────────────────────────────────────

pub const SUMMARY_SYSTEM: &str = "\
You are a concise academic coordinator. Generate a 2-3 sentence status \
summary for the residency log in Markdown. Be factual and professional.";

// ── Builders ──────────────────────────────────────────────────────────────

/// The retry instruction injected into the lesson prompt on attempt > 1.
/// Prompt content only; it never affects control flow.
pub fn lesson_retry_note(attempt: u32, failure_approach: &str) -> String {
    if attempt <= 1 {
        return String::new();
    }
    format!(
        "\n\nIMPORTANT: This is attempt #{attempt}. The student previously failed this \
         lesson. You MUST change your pedagogical framing entirely. Do NOT reuse phrasing, \
         structure, or examples from the prior attempt. Address likely conceptual weaknesses \
         directly. {failure_approach}"
    )
}

pub fn homework_retry_note(attempt: u32) -> String {
    if attempt <= 1 {
        return String::new();
    }
    format!(
        "\n\nThis is attempt #{attempt}. Construct entirely new problems. Vary the \
         difficulty distribution and problem types from the prior attempt."
    )
}

fn persona_vars(persona: &ProfessorPersona) -> Vec<(&'static str, String)> {
    let focus_areas = persona
        .focus_areas
        .iter()
        .map(|a| format!("- {a}"))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ("persona.name", persona.name.clone()),
        ("persona.teachingStyle", persona.teaching_style.clone()),
        ("persona.focusAreas", focus_areas),
        ("persona.lessonTone", persona.lesson_tone.clone()),
        ("persona.strictness", persona.strictness.to_string()),
        ("persona.gradingBias", persona.grading_bias.clone()),
    ]
}

pub fn build_lesson_system(
    persona: &ProfessorPersona,
    attempt: u32,
) -> Result<String, PromptError> {
    let mut vars = persona_vars(persona);
    vars.push((
        "retryNote",
        lesson_retry_note(attempt, &persona.failure_approach),
    ));
    render(LESSON_SYSTEM, &vars)
}

pub fn build_lesson_user(
    day: u32,
    topic: &str,
    governed_json: &str,
) -> Result<String, PromptError> {
    render(
        LESSON_USER,
        &[
            ("day", day.to_string()),
            ("topic", topic.to_string()),
            ("governedSpecsJson", governed_json.to_string()),
        ],
    )
}

pub fn build_homework_system(
    persona: &ProfessorPersona,
    attempt: u32,
) -> Result<String, PromptError> {
    let mut vars = persona_vars(persona);
    vars.push(("retryNote", homework_retry_note(attempt)));
    render(HOMEWORK_SYSTEM, &vars)
}

pub fn build_homework_user(
    topic: &str,
    lesson_facts_json: &str,
    governed_json: &str,
) -> Result<String, PromptError> {
    render(
        HOMEWORK_USER,
        &[
            ("topic", topic.to_string()),
            ("lessonFactsJson", lesson_facts_json.to_string()),
            ("governedSpecsJson", governed_json.to_string()),
        ],
    )
}

pub fn build_rubric_system(
    persona: &ProfessorPersona,
    pass_score: u32,
) -> Result<String, PromptError> {
    let mut vars = persona_vars(persona);
    vars.push(("passScore", pass_score.to_string()));
    render(RUBRIC_SYSTEM, &vars)
}

pub fn build_rubric_user(problems_json: &str, governed_json: &str) -> Result<String, PromptError> {
    render(
        RUBRIC_USER,
        &[
            ("problemsJson", problems_json.to_string()),
            ("governedSpecsJson", governed_json.to_string()),
        ],
    )
}

pub fn build_grading_system(
    persona: &ProfessorPersona,
    strictness_description: &str,
    pass_score: u32,
) -> Result<String, PromptError> {
    let mut vars = persona_vars(persona);
    vars.push((
        "strictnessDescription",
        strictness_description.to_string(),
    ));
    vars.push(("passScore", pass_score.to_string()));
    render(GRADING_SYSTEM, &vars)
}

pub fn build_grading_user(
    lesson: &str,
    rubric: &str,
    submission: &str,
) -> Result<String, PromptError> {
    render(
        GRADING_USER,
        &[
            ("lesson", lesson.to_string()),
            ("rubric", rubric.to_string()),
            ("submission", submission.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personas::{PersonaSet, ProfessorId};

    #[test]
    fn test_render_substitutes_bindings() {
        let out = render(
            "Day {{day}}: {{ topic }}",
            &[("day", "3".into()), ("topic", "Hash Functions".into())],
        )
        .unwrap();
        assert_eq!(out, "Day 3: Hash Functions");
    }

    #[test]
    fn test_render_fails_on_unresolved_placeholder() {
        let err = render("Hello {{missing}}", &[]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_retry_notes_empty_on_first_attempt() {
        assert!(lesson_retry_note(1, "rebuild from lemmas").is_empty());
        assert!(homework_retry_note(1).is_empty());
    }

    #[test]
    fn test_retry_notes_present_on_second_attempt() {
        let note = lesson_retry_note(2, "rebuild from lemmas");
        assert!(note.contains("attempt #2"));
        assert!(note.contains("rebuild from lemmas"));
        assert!(homework_retry_note(3).contains("attempt #3"));
    }

    #[test]
    fn test_lesson_system_binds_persona() {
        let personas = PersonaSet::builtin().unwrap();
        let persona = personas.get(ProfessorId::Euclid);
        let prompt = build_lesson_system(persona, 1).unwrap();
        assert!(prompt.contains(&persona.name));
        assert!(prompt.contains("9/10"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_all_templates_render_without_leftover_placeholders() {
        let personas = PersonaSet::builtin().unwrap();
        let persona = personas.get(ProfessorId::Nakamoto);
        let rendered = [
            build_lesson_system(persona, 2).unwrap(),
            build_lesson_user(1, "Finite Fields", "{}").unwrap(),
            build_homework_system(persona, 2).unwrap(),
            build_homework_user("Finite Fields", "{}", "{}").unwrap(),
            build_rubric_system(persona, 80).unwrap(),
            build_rubric_user("{}", "{}").unwrap(),
            build_grading_system(persona, "high standards", 80).unwrap(),
            build_grading_user("lesson", "rubric", "submission").unwrap(),
        ];
        for prompt in rendered {
            assert!(!placeholder_re().is_match(&prompt), "leftover in: {prompt}");
        }
    }
}
