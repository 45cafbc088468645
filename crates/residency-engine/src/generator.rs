//! Generation pipeline: lesson → homework → rubric for one day + attempt.
//!
//! Two invariants drive the shape of this module:
//!
//! 1. Per-artifact idempotence: an artifact already on disk is reused
//!    verbatim and the completion service is not called for it, so a crash
//!    mid-pipeline loses no completed work and a rerun is safe.
//! 2. Retry narrowing: when the day's previous attempt failed grading,
//!    only `homework.md` is regenerated; `lesson.md` and `rubric.md` stay
//!    byte-identical so the retained rubric keeps governing the new
//!    problems.
//!
//! Each stage's prompt is conditioned on structured facts extracted from
//! the previous stage's output, not on raw text reuse.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::curriculum::GovernedDaySpec;
use crate::extract::{self, HomeworkProblemList, LessonMetadata};
use crate::openai_bridge::{CompletionRequest, CompletionService};
use crate::personas::ProfessorPersona;
use crate::prompts;
use crate::router::{route_task, TaskType};

pub const LESSON_FILE: &str = "lesson.md";
pub const HOMEWORK_FILE: &str = "homework.md";
pub const RUBRIC_FILE: &str = "rubric.md";
pub const GRADING_FILE: &str = "grading.json";

/// What to generate: one day at one attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub day: u32,
    pub topic: String,
    pub attempt: u32,
}

/// The three text artifacts for a day + attempt.
#[derive(Debug, Clone)]
pub struct GeneratedLesson {
    pub lesson: String,
    pub homework: String,
    pub rubric: String,
}

/// Tolerant view of a prior grading.json; junk reads as "no failed grade".
#[derive(Deserialize)]
struct PriorGrading {
    pass: Option<bool>,
}

pub struct GenerationPipeline<'a> {
    llm: &'a dyn CompletionService,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(llm: &'a dyn CompletionService) -> Self {
        Self { llm }
    }

    /// Produce all three artifacts, choosing the narrowed-retry path when
    /// the prior grade failed and the lesson/rubric pair is intact.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        persona: &ProfessorPersona,
        governed: &GovernedDaySpec,
        out_dir: &Path,
    ) -> Result<GeneratedLesson> {
        if self.failed_grade_on_disk(out_dir)
            && out_dir.join(LESSON_FILE).exists()
            && out_dir.join(RUBRIC_FILE).exists()
        {
            info!(
                day = request.day,
                attempt = request.attempt,
                "Prior attempt failed — regenerating homework only"
            );
            return self.generate_homework_only(request, persona, governed, out_dir).await;
        }
        self.generate_full(request, persona, governed, out_dir).await
    }

    /// The narrowed retry: lesson and rubric are read back verbatim; only
    /// the homework is regenerated, under the same governed spec.
    pub async fn generate_homework_only(
        &self,
        request: &GenerationRequest,
        persona: &ProfessorPersona,
        governed: &GovernedDaySpec,
        out_dir: &Path,
    ) -> Result<GeneratedLesson> {
        let lesson = read_artifact(out_dir, LESSON_FILE)?;
        let rubric = read_artifact(out_dir, RUBRIC_FILE)?;
        let governed_json = governed_json(governed)?;

        let metadata = extract::parse_lesson_metadata(&lesson).unwrap_or_default();
        let homework_request =
            self.homework_request(request, persona, &metadata, &governed_json)?;
        let homework = self.llm.complete(&homework_request).await?;
        write_artifact(out_dir, HOMEWORK_FILE, &homework)?;

        check_rubric_coverage(&homework, governed);

        Ok(GeneratedLesson {
            lesson,
            homework,
            rubric,
        })
    }

    /// The full three-stage sequence, with per-artifact reuse.
    async fn generate_full(
        &self,
        request: &GenerationRequest,
        persona: &ProfessorPersona,
        governed: &GovernedDaySpec,
        out_dir: &Path,
    ) -> Result<GeneratedLesson> {
        info!(
            day = request.day,
            topic = %request.topic,
            attempt = request.attempt,
            professor = %persona.id,
            model = route_task(TaskType::Lesson),
            "Generating lesson artifacts"
        );
        let governed_json = governed_json(governed)?;

        let lesson_request = CompletionRequest {
            task: TaskType::Lesson,
            model: route_task(TaskType::Lesson).to_string(),
            system_prompt: prompts::build_lesson_system(persona, request.attempt)?,
            user_prompt: prompts::build_lesson_user(request.day, &request.topic, &governed_json)?,
            temperature: 0.2,
            max_tokens: 4096,
        };
        let lesson = self
            .reuse_or_complete(out_dir, LESSON_FILE, lesson_request)
            .await?;

        // Homework is conditioned on facts extracted from the lesson; a
        // missing or malformed summary block degrades the prompt, never the
        // run.
        let metadata = extract::parse_lesson_metadata(&lesson).unwrap_or_default();
        if metadata.is_empty() {
            warn!(day = request.day, "Lesson carried no structured summary — homework prompt degraded");
        }
        let homework_request =
            self.homework_request(request, persona, &metadata, &governed_json)?;
        let homework = self
            .reuse_or_complete(out_dir, HOMEWORK_FILE, homework_request)
            .await?;

        // Rubric is conditioned on the homework's extracted problem list.
        let problems = extract::parse_homework_problems(&homework).unwrap_or_default();
        let rubric_request = CompletionRequest {
            task: TaskType::Lesson,
            model: route_task(TaskType::Lesson).to_string(),
            system_prompt: prompts::build_rubric_system(persona, governed.rubric.passing_score)?,
            user_prompt: prompts::build_rubric_user(
                &serde_json::to_string_pretty(&problems)?,
                &governed_json,
            )?,
            temperature: 0.2,
            max_tokens: 2048,
        };
        let rubric = self
            .reuse_or_complete(out_dir, RUBRIC_FILE, rubric_request)
            .await?;

        Ok(GeneratedLesson {
            lesson,
            homework,
            rubric,
        })
    }

    fn homework_request(
        &self,
        request: &GenerationRequest,
        persona: &ProfessorPersona,
        metadata: &LessonMetadata,
        governed_json: &str,
    ) -> Result<CompletionRequest> {
        Ok(CompletionRequest {
            task: TaskType::Lesson,
            model: route_task(TaskType::Lesson).to_string(),
            system_prompt: prompts::build_homework_system(persona, request.attempt)?,
            user_prompt: prompts::build_homework_user(
                &request.topic,
                &serde_json::to_string_pretty(metadata)?,
                governed_json,
            )?,
            temperature: 0.2,
            max_tokens: 2048,
        })
    }

    /// Reuse an artifact already on disk, otherwise generate it and persist
    /// immediately.
    async fn reuse_or_complete(
        &self,
        out_dir: &Path,
        file: &str,
        request: CompletionRequest,
    ) -> Result<String> {
        let path = out_dir.join(file);
        if path.exists() {
            info!(artifact = file, "Reusing artifact already on disk");
            return read_artifact(out_dir, file);
        }
        let text = self.llm.complete(&request).await?;
        write_artifact(out_dir, file, &text)?;
        Ok(text)
    }

    /// A failed grade on disk selects the narrowed-retry path. Any read or
    /// parse problem counts as "no failed grade".
    fn failed_grade_on_disk(&self, out_dir: &Path) -> bool {
        let Ok(raw) = fs::read_to_string(out_dir.join(GRADING_FILE)) else {
            return false;
        };
        matches!(
            serde_json::from_str::<PriorGrading>(&raw),
            Ok(PriorGrading { pass: Some(false) })
        )
    }
}

fn governed_json(governed: &GovernedDaySpec) -> Result<String> {
    serde_json::to_string_pretty(governed).context("failed to serialize governed spec")
}

fn read_artifact(out_dir: &Path, file: &str) -> Result<String> {
    let path = out_dir.join(file);
    fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_artifact(out_dir: &Path, file: &str, text: &str) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(file);
    fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!(artifact = file, bytes = text.len(), "Artifact persisted");
    Ok(())
}

/// After a homework-only retry the retained rubric is trusted to still fit
/// the new problems. Verify what can be verified cheaply and warn on
/// mismatch; this never fails the run.
fn check_rubric_coverage(homework: &str, governed: &GovernedDaySpec) {
    let Some(problems) = extract::parse_homework_problems(homework) else {
        warn!("Regenerated homework carried no problem list — rubric coverage unverified");
        return;
    };
    warn_on_point_mismatch(&problems, governed);
}

fn warn_on_point_mismatch(problems: &HomeworkProblemList, governed: &GovernedDaySpec) {
    let total = problems.total_points();
    if total != 0 && total != governed.rubric.total_points {
        warn!(
            homework_points = total,
            rubric_points = governed.rubric.total_points,
            "Regenerated homework points do not match the retained rubric total"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_grade_detection() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline_dir = dir.path();

        struct NoLlm;
        #[async_trait::async_trait]
        impl CompletionService for NoLlm {
            async fn complete(
                &self,
                _request: &CompletionRequest,
            ) -> Result<String, crate::openai_bridge::CompletionError> {
                unreachable!("no completion expected")
            }
        }
        let pipeline = GenerationPipeline::new(&NoLlm);

        // No file at all.
        assert!(!pipeline.failed_grade_on_disk(pipeline_dir));

        // Passed grade.
        fs::write(
            pipeline_dir.join(GRADING_FILE),
            r#"{"score": 92, "pass": true, "feedback": "ok"}"#,
        )
        .unwrap();
        assert!(!pipeline.failed_grade_on_disk(pipeline_dir));

        // Failed grade.
        fs::write(
            pipeline_dir.join(GRADING_FILE),
            r#"{"score": 61, "pass": false, "feedback": "gaps"}"#,
        )
        .unwrap();
        assert!(pipeline.failed_grade_on_disk(pipeline_dir));

        // Corrupt file degrades to "no failed grade".
        fs::write(pipeline_dir.join(GRADING_FILE), "{ nope").unwrap();
        assert!(!pipeline.failed_grade_on_disk(pipeline_dir));
    }
}
