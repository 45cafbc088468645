//! Grading engine.
//!
//! Sends lesson + rubric + submission to the completion service with a
//! strictness-calibrated instruction and parses a strict JSON verdict. The
//! model's `pass` boolean can only veto, never grant: the deterministic
//! threshold is authoritative.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::openai_bridge::{CompletionError, CompletionRequest, CompletionService};
use crate::personas::ProfessorPersona;
use crate::prompts::{self, PromptError};
use crate::router::{route_task, TaskType};

/// The enforced passing threshold.
pub const PASSING_SCORE: u32 = 80;

/// A graded verdict after deterministic enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    pub score: u32,
    pub pass: bool,
    pub feedback: String,
}

/// The persisted grading record for a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub score: u32,
    pub pass: bool,
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
}

impl GradingRecord {
    pub fn from_result(result: GradingResult) -> Self {
        Self {
            score: result.score,
            pass: result.pass,
            feedback: result.feedback,
            graded_at: Utc::now(),
        }
    }

    pub fn write(&self, day_dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(day_dir)?;
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(day_dir.join("grading.json"), json)
    }
}

/// Grading contract violations. Never silently defaulted: the raw payload
/// rides along for diagnosis.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("Failed to parse grading response as JSON.\nRaw: {raw}")]
    NotJson { raw: String },

    #[error("Malformed grading JSON structure ({reason}).\nRaw: {raw}")]
    Malformed { reason: String, raw: String },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Map a strictness level to the qualitative grading instruction.
pub fn strictness_description(level: u8) -> &'static str {
    if level >= 9 {
        "near-zero tolerance for gaps — only exceptional work passes"
    } else if level >= 7 {
        "high standards — minor hand-waving will cost significant points"
    } else if level >= 5 {
        "moderate standards — clear understanding required for passing"
    } else {
        "accessible standards — good faith effort with correct core ideas can pass"
    }
}

/// Strip optional surrounding code-fence markers from a model response.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse the model's verdict, rejecting anything that is not exactly
/// `{score: int, pass: bool, feedback: string}`.
fn parse_verdict(raw: &str) -> Result<(u32, bool, String), GradingError> {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|_| GradingError::NotJson {
            raw: raw.to_string(),
        })?;

    let malformed = |reason: &str| GradingError::Malformed {
        reason: reason.to_string(),
        raw: raw.to_string(),
    };

    let object = value.as_object().ok_or_else(|| malformed("not an object"))?;
    let score = object
        .get("score")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| malformed("\"score\" missing or not an integer"))?;
    if !(0..=100).contains(&score) {
        return Err(malformed("\"score\" outside 0..=100"));
    }
    let pass = object
        .get("pass")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| malformed("\"pass\" missing or not a boolean"))?;
    let feedback = object
        .get("feedback")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed("\"feedback\" missing or not a string"))?;

    Ok((score as u32, pass, feedback.to_string()))
}

/// Apply the deterministic passing rule. The model's boolean can veto a
/// pass but never grant one below the threshold; a vetoed model pass gets
/// an enforcement note appended so the record is not self-contradictory.
fn enforce(score: u32, model_pass: bool, feedback: String) -> GradingResult {
    let pass = score >= PASSING_SCORE && model_pass;
    let feedback = if model_pass && !pass {
        format!(
            "{feedback}\n\n[Grade enforcement] Score {score} is below the passing threshold \
             of {PASSING_SCORE}; the verdict is recorded as FAIL."
        )
    } else {
        feedback
    };
    GradingResult {
        score,
        pass,
        feedback,
    }
}

/// Grade a submission against a lesson and rubric.
pub async fn grade(
    llm: &dyn CompletionService,
    persona: &ProfessorPersona,
    lesson: &str,
    rubric: &str,
    submission: &str,
) -> Result<GradingResult, GradingError> {
    info!(professor = %persona.id, model = route_task(TaskType::Grading), "Grading submission");

    let request = CompletionRequest {
        task: TaskType::Grading,
        model: route_task(TaskType::Grading).to_string(),
        system_prompt: prompts::build_grading_system(
            persona,
            strictness_description(persona.strictness),
            PASSING_SCORE,
        )?,
        user_prompt: prompts::build_grading_user(lesson, rubric, submission)?,
        temperature: 0.1,
        max_tokens: 1024,
    };

    let raw = llm.complete(&request).await?;
    let (score, model_pass, feedback) = parse_verdict(&raw)?;
    let result = enforce(score, model_pass, feedback);

    info!(score = result.score, pass = result.pass, "Grading complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictness_bands() {
        assert!(strictness_description(10).contains("near-zero"));
        assert!(strictness_description(9).contains("near-zero"));
        assert!(strictness_description(7).contains("high standards"));
        assert!(strictness_description(5).contains("moderate"));
        assert!(strictness_description(3).contains("accessible"));
    }

    #[test]
    fn test_parse_plain_json() {
        let (score, pass, feedback) =
            parse_verdict(r#"{"score": 85, "pass": true, "feedback": "Solid work."}"#).unwrap();
        assert_eq!(score, 85);
        assert!(pass);
        assert_eq!(feedback, "Solid work.");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"score\": 72, \"pass\": false, \"feedback\": \"Gaps.\"}\n```";
        let (score, pass, _) = parse_verdict(raw).unwrap();
        assert_eq!(score, 72);
        assert!(!pass);
    }

    #[test]
    fn test_non_json_is_a_distinct_error() {
        let err = parse_verdict("The student did well, I'd say 85/100.").unwrap_err();
        assert!(matches!(err, GradingError::NotJson { .. }));
        assert!(err.to_string().contains("85/100"));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let err =
            parse_verdict(r#"{"score": "85", "pass": true, "feedback": "ok"}"#).unwrap_err();
        assert!(matches!(err, GradingError::Malformed { .. }));

        let err = parse_verdict(r#"{"score": 85, "pass": "yes", "feedback": "ok"}"#).unwrap_err();
        assert!(matches!(err, GradingError::Malformed { .. }));

        let err = parse_verdict(r#"{"score": 85, "pass": true}"#).unwrap_err();
        assert!(matches!(err, GradingError::Malformed { .. }));
    }

    #[test]
    fn test_score_out_of_range_rejected() {
        let err =
            parse_verdict(r#"{"score": 140, "pass": true, "feedback": "ok"}"#).unwrap_err();
        assert!(matches!(err, GradingError::Malformed { .. }));
    }

    #[test]
    fn test_low_score_overrides_model_pass() {
        let result = enforce(79, true, "Impressive throughout.".into());
        assert!(!result.pass);
        assert!(result.feedback.contains("Grade enforcement"));
        assert!(result.feedback.contains("79"));
    }

    #[test]
    fn test_model_veto_is_honored() {
        let result = enforce(85, false, "Misses the core reduction.".into());
        assert!(!result.pass);
        // The model already said fail; no enforcement note needed.
        assert!(!result.feedback.contains("Grade enforcement"));
    }

    #[test]
    fn test_pass_requires_both() {
        assert!(enforce(80, true, String::new()).pass);
        assert!(enforce(100, true, String::new()).pass);
        assert!(!enforce(80, false, String::new()).pass);
        assert!(!enforce(79, true, String::new()).pass);
    }

    #[test]
    fn test_grading_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let record = GradingRecord::from_result(GradingResult {
            score: 65,
            pass: false,
            feedback: "Derivation incomplete.".into(),
        });
        record.write(dir.path()).unwrap();
        let raw = fs::read_to_string(dir.path().join("grading.json")).unwrap();
        let back: GradingRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.score, 65);
        assert!(!back.pass);
        assert!(raw.contains("gradedAt"));
    }
}
