//! Residency state machine: the persisted day/attempt/status record, its
//! legal transitions, and the append-only history log.
//!
//! The engine itself drives only two transitions: `NotStarted → Assigned`
//! on successful generation+commit, and the failed-grade reset back to
//! `NotStarted` with `attempt += 1`. `Submitted` and `Pass` are set by
//! collaborators outside this process.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::personas::ProfessorId;

/// Lifecycle status of the current day's lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonStatus {
    NotStarted,
    Assigned,
    Submitted,
    Pass,
    Fail,
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Legal edges of the lesson lifecycle:
/// ```text
/// NotStarted → Assigned
/// Assigned   → Submitted | Fail
/// Submitted  → Pass | Fail
/// Fail       → NotStarted   (retry, attempt += 1)
/// ```
fn is_legal_transition(from: LessonStatus, to: LessonStatus) -> bool {
    use LessonStatus::*;
    matches!(
        (from, to),
        (NotStarted, Assigned)
            | (Assigned, Submitted)
            | (Assigned, Fail)
            | (Submitted, Pass)
            | (Submitted, Fail)
            | (Fail, NotStarted)
    )
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, Error)]
#[error("Illegal lesson status transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: LessonStatus,
    pub to: LessonStatus,
}

/// One immutable entry in the residency history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub day: u32,
    pub lesson_id: String,
    pub attempt: u32,
    pub status: LessonStatus,
    pub commit_sha: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The single mutable root, persisted as ground truth between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidencyState {
    pub current_day: u32,
    pub current_lesson_id: String,
    pub attempt: u32,
    pub status: LessonStatus,
    /// Professor override; when absent, the lesson's default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professor: Option<ProfessorId>,
    pub last_commit_sha: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ResidencyState {
    /// The state created by the explicit initializer: day 1, attempt 1,
    /// nothing generated yet.
    pub fn initial() -> Self {
        Self {
            current_day: 1,
            current_lesson_id: "FF-001".into(),
            attempt: 1,
            status: LessonStatus::NotStarted,
            professor: None,
            last_commit_sha: None,
            history: Vec::new(),
        }
    }

    /// Move to a new status, enforcing the transition table.
    pub fn advance(&mut self, to: LessonStatus) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.status, to) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        tracing::debug!(from = %self.status, to = %to, day = self.current_day, "Status transition");
        self.status = to;
        Ok(())
    }

    /// Apply a failed grade: status returns to `NotStarted` and the attempt
    /// counter increments, always together, never separately.
    pub fn record_failed_grade(&mut self) -> Result<(), IllegalTransition> {
        if self.status != LessonStatus::Fail {
            self.advance(LessonStatus::Fail)?;
        }
        self.advance(LessonStatus::NotStarted)?;
        self.attempt += 1;
        Ok(())
    }

    /// Append to the history log. Prior entries are never touched.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state.json not found at {0}. Run `residency-engine init` first.")]
    NotFound(PathBuf),

    #[error("state.json already exists at {0} — refusing to overwrite")]
    AlreadyInitialized(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Persistence for the residency state: `state.json` is read fully and
/// rewritten fully on every mutation; `state.md` only ever grows.
pub struct StateStore {
    state_path: PathBuf,
    summary_path: PathBuf,
}

impl StateStore {
    pub fn new(residency_dir: &Path) -> Self {
        Self {
            state_path: residency_dir.join("state.json"),
            summary_path: residency_dir.join("state.md"),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load the persisted state. A missing file is a hard error: normal runs
    /// never fabricate state.
    pub fn load(&self) -> Result<ResidencyState, StateError> {
        if !self.state_path.exists() {
            return Err(StateError::NotFound(self.state_path.clone()));
        }
        let raw = fs::read_to_string(&self.state_path).map_err(|source| StateError::Io {
            path: self.state_path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StateError::Parse {
            path: self.state_path.clone(),
            source,
        })
    }

    /// Persist the full state record.
    pub fn save(&self, state: &ResidencyState) -> Result<(), StateError> {
        if let Some(dir) = self.state_path.parent() {
            fs::create_dir_all(dir).map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|source| StateError::Parse {
            path: self.state_path.clone(),
            source,
        })?;
        fs::write(&self.state_path, json).map_err(|source| StateError::Io {
            path: self.state_path.clone(),
            source,
        })
    }

    /// Create the initial state. The only code path that may bring a state
    /// file into existence.
    pub fn init(&self) -> Result<ResidencyState, StateError> {
        if self.state_path.exists() {
            return Err(StateError::AlreadyInitialized(self.state_path.clone()));
        }
        let state = ResidencyState::initial();
        self.save(&state)?;
        Ok(state)
    }

    /// Append a timestamped entry to the human-readable `state.md` log.
    pub fn append_summary(&self, summary: &str) -> Result<(), StateError> {
        if let Some(dir) = self.summary_path.parent() {
            fs::create_dir_all(dir).map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.summary_path)
            .map_err(|source| StateError::Io {
                path: self.summary_path.clone(),
                source,
            })?;
        let entry = format!(
            "\n---\n\n**[{}]**\n\n{}\n",
            Utc::now().to_rfc3339(),
            summary
        );
        file.write_all(entry.as_bytes())
            .map_err(|source| StateError::Io {
                path: self.summary_path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ResidencyState::initial();
        assert_eq!(state.current_day, 1);
        assert_eq!(state.current_lesson_id, "FF-001");
        assert_eq!(state.attempt, 1);
        assert_eq!(state.status, LessonStatus::NotStarted);
        assert!(state.professor.is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_legal_assignment_transition() {
        let mut state = ResidencyState::initial();
        state.advance(LessonStatus::Assigned).unwrap();
        assert_eq!(state.status, LessonStatus::Assigned);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut state = ResidencyState::initial();
        let err = state.advance(LessonStatus::Pass).unwrap_err();
        assert_eq!(err.from, LessonStatus::NotStarted);
        assert_eq!(err.to, LessonStatus::Pass);

        // No backward edge out of Assigned.
        state.advance(LessonStatus::Assigned).unwrap();
        assert!(state.advance(LessonStatus::NotStarted).is_err());
    }

    #[test]
    fn test_failed_grade_bumps_attempt_exactly_once() {
        let mut state = ResidencyState::initial();
        state.advance(LessonStatus::Assigned).unwrap();
        state.record_failed_grade().unwrap();
        assert_eq!(state.attempt, 2);
        assert_eq!(state.status, LessonStatus::NotStarted);
    }

    #[test]
    fn test_failed_grade_from_submitted() {
        let mut state = ResidencyState::initial();
        state.advance(LessonStatus::Assigned).unwrap();
        state.advance(LessonStatus::Submitted).unwrap();
        state.record_failed_grade().unwrap();
        assert_eq!(state.attempt, 2);
        assert_eq!(state.status, LessonStatus::NotStarted);
    }

    #[test]
    fn test_history_is_append_only() {
        let mut state = ResidencyState::initial();
        for n in 1..=3 {
            state.push_history(HistoryEntry {
                day: n,
                lesson_id: format!("L-{n:03}"),
                attempt: 1,
                status: LessonStatus::Assigned,
                commit_sha: Some(format!("sha{n}")),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[0].lesson_id, "L-001");
        assert_eq!(state.history[0].commit_sha.as_deref(), Some("sha1"));
    }

    #[test]
    fn test_status_serde_screaming_snake() {
        let json = serde_json::to_string(&LessonStatus::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
        let back: LessonStatus = serde_json::from_str("\"ASSIGNED\"").unwrap();
        assert_eq!(back, LessonStatus::Assigned);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut state = store.init().unwrap();
        state.advance(LessonStatus::Assigned).unwrap();
        state.last_commit_sha = Some("deadbeef".into());
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.status, LessonStatus::Assigned);
        assert_eq!(loaded.last_commit_sha.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_load_without_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let err = store.load().unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
        assert!(err.to_string().contains("init"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.init().unwrap();
        let err = store.init().unwrap_err();
        assert!(matches!(err, StateError::AlreadyInitialized(_)));
    }

    #[test]
    fn test_append_summary_grows_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.append_summary("## Day 1 — Finite Fields").unwrap();
        store.append_summary("## Day 2 — Group Theory").unwrap();
        let log = fs::read_to_string(dir.path().join("state.md")).unwrap();
        assert!(log.contains("Day 1"));
        assert!(log.contains("Day 2"));
        assert!(log.find("Day 1").unwrap() < log.find("Day 2").unwrap());
    }
}
