//! Day-cycle orchestration: ties the state machine, curriculum, pipeline,
//! grading engine, and commit publisher together.
//!
//! Ordering is the crash-safety argument: artifact generation is re-entrant
//! and idempotent, the commit happens before the state write, and the state
//! write in one run is the single durable checkpoint. Any failure leaves
//! the system safely retryable by rerunning the same invocation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::info;

use crate::config::EngineConfig;
use crate::curriculum::{Curriculum, GovernedDaySpec};
use crate::generator::{GenerationPipeline, GenerationRequest, HOMEWORK_FILE, LESSON_FILE, RUBRIC_FILE};
use crate::github_bridge::{CommitFile, CommitPublisher, CommitResult};
use crate::grading::{self, GradingRecord};
use crate::openai_bridge::{CompletionRequest, CompletionService};
use crate::personas::{PersonaSet, ProfessorId};
use crate::prompts;
use crate::router::{route_task, TaskType};
use crate::state::{HistoryEntry, LessonStatus, StateStore};

/// Everything a day cycle needs, wired once at startup.
pub struct EngineContext<'a> {
    pub config: &'a EngineConfig,
    pub curriculum: &'a Curriculum,
    pub personas: &'a PersonaSet,
    pub llm: &'a dyn CompletionService,
    pub publisher: &'a dyn CommitPublisher,
}

/// Typed outcome of one day-cycle invocation.
#[derive(Debug)]
pub enum DayCycleOutcome {
    /// Artifacts generated, committed, and the state advanced to Assigned.
    Assigned {
        day: u32,
        attempt: u32,
        commit: CommitResult,
    },
    /// The guard fired: status was not NotStarted, nothing was touched.
    NothingToDo { status: LessonStatus },
    /// No curriculum entry for the current day: the residency is done.
    ResidencyComplete { last_day: u32 },
}

/// Directory label for a day: `day-001`, `day-002`, ...
pub fn day_label(day: u32) -> String {
    format!("day-{day:03}")
}

fn day_dir(config: &EngineConfig, day: u32) -> PathBuf {
    config.residency_dir.join(day_label(day))
}

/// Run one generation/commit cycle for the current day.
pub async fn run_day_cycle(ctx: &EngineContext<'_>) -> Result<DayCycleOutcome> {
    let store = StateStore::new(&ctx.config.residency_dir);
    let mut state = store.load()?;
    info!(
        day = state.current_day,
        lesson = %state.current_lesson_id,
        status = %state.status,
        attempt = state.attempt,
        "Loaded residency state"
    );

    // Idempotent guard: anything other than NotStarted is a clean no-op.
    if state.status != LessonStatus::NotStarted {
        info!(status = %state.status, "Nothing to do — day cycle only runs from NOT_STARTED");
        return Ok(DayCycleOutcome::NothingToDo {
            status: state.status,
        });
    }

    // No curriculum entry means the residency has finished. Success, not
    // failure.
    if ctx.curriculum.is_complete(state.current_day) {
        let last_day = ctx.curriculum.last_day();
        info!(
            day = state.current_day,
            last_day, "Residency complete — no curriculum entry for this day"
        );
        return Ok(DayCycleOutcome::ResidencyComplete { last_day });
    }

    let lesson_def = ctx
        .curriculum
        .lesson_by_day(state.current_day)
        .with_context(|| format!("no curriculum lesson for day {}", state.current_day))?;

    let professor = state.professor.unwrap_or(lesson_def.default_professor);
    let persona = ctx.personas.get(professor);
    info!(
        lesson = %lesson_def.lesson_id,
        topic = %lesson_def.topic,
        professor = %professor,
        "Lesson resolved"
    );

    let governed = ctx
        .curriculum
        .governed_for_day(state.current_day)
        .cloned()
        .unwrap_or_else(|| GovernedDaySpec::default_for(state.current_day));

    let request = GenerationRequest {
        day: state.current_day,
        topic: lesson_def.topic.clone(),
        attempt: state.attempt,
    };
    let pipeline = GenerationPipeline::new(ctx.llm);
    let generated = pipeline
        .generate(&request, persona, &governed, &day_dir(ctx.config, state.current_day))
        .await?;

    // One atomic commit for all three artifacts.
    let label = day_label(state.current_day);
    let files = [
        (LESSON_FILE, &generated.lesson),
        (HOMEWORK_FILE, &generated.homework),
        (RUBRIC_FILE, &generated.rubric),
    ]
    .map(|(name, content)| CommitFile {
        path: format!("residency/{label}/{name}"),
        content: content.clone(),
    });
    let message = format!(
        "[Residency] Day {}: {} — {} (attempt {})",
        state.current_day, lesson_def.topic, professor, state.attempt
    );
    let commit = ctx.publisher.commit(&files, &message).await?;

    // The durable checkpoint: history entry + status, saved together.
    state.push_history(HistoryEntry {
        day: state.current_day,
        lesson_id: lesson_def.lesson_id.clone(),
        attempt: state.attempt,
        status: LessonStatus::Assigned,
        commit_sha: Some(commit.sha.clone()),
        timestamp: Utc::now(),
    });
    state.advance(LessonStatus::Assigned)?;
    state.professor = Some(professor);
    state.last_commit_sha = Some(commit.sha.clone());
    store.save(&state)?;
    info!(sha = %commit.sha, "State saved — status=ASSIGNED");

    // Human-readable status note referencing the commit.
    let summary = generate_summary(
        ctx.llm,
        state.current_day,
        &lesson_def.topic,
        &persona.name,
        &commit.url,
    )
    .await?;
    let short_sha = &commit.sha[..7.min(commit.sha.len())];
    store.append_summary(&format!(
        "## Day {} — {}\n\n- **Professor:** {}\n- **Attempt:** {}\n- **Status:** ASSIGNED\n\
         - **Commit:** [{}]({})\n\n### Summary\n\n{}",
        state.current_day, lesson_def.topic, professor, state.attempt, short_sha, commit.url,
        summary
    ))?;

    Ok(DayCycleOutcome::Assigned {
        day: state.current_day,
        attempt: state.attempt,
        commit,
    })
}

async fn generate_summary(
    llm: &dyn CompletionService,
    day: u32,
    topic: &str,
    professor_name: &str,
    commit_url: &str,
) -> Result<String> {
    let request = CompletionRequest {
        task: TaskType::Summary,
        model: route_task(TaskType::Summary).to_string(),
        system_prompt: prompts::SUMMARY_SYSTEM.to_string(),
        user_prompt: format!(
            "Day {day} lesson generated on topic \"{topic}\" by {professor_name}. \
             Committed to GitHub: {commit_url}. Status: ASSIGNED."
        ),
        temperature: 1.0,
        max_tokens: 200,
    };
    Ok(llm.complete(&request).await?)
}

/// Grade a submission for a day and persist the record. A failed grade is
/// the one and only place the attempt counter is bumped, always together
/// with the status reset that re-arms the day cycle.
pub async fn grade_day(
    config: &EngineConfig,
    personas: &PersonaSet,
    llm: &dyn CompletionService,
    day: u32,
    submission: &str,
) -> Result<GradingRecord> {
    if submission.trim().is_empty() {
        bail!("Submission content is empty.");
    }

    let dir = day_dir(config, day);
    let lesson = read_required(&dir, LESSON_FILE)?;
    let rubric = read_required(&dir, RUBRIC_FILE)?;

    let store = StateStore::new(&config.residency_dir);
    let mut state = store.load()?;
    let professor = state.professor.unwrap_or(ProfessorId::Euclid);
    let persona = personas.get(professor);
    info!(day, professor = %professor, "Grading submission for day");

    let result = grading::grade(llm, persona, &lesson, &rubric, submission).await?;
    let record = GradingRecord::from_result(result);
    record
        .write(&dir)
        .with_context(|| format!("failed to write grading record for day {day}"))?;
    info!(score = record.score, pass = record.pass, "Grading record written");

    if !record.pass {
        state.record_failed_grade()?;
        store.save(&state)?;
        info!(
            attempt = state.attempt,
            "Homework failed — state re-armed for a homework-only retry"
        );
    }

    Ok(record)
}

fn read_required(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    if !path.exists() {
        bail!("{file} not found at {}", path.display());
    }
    std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
}
