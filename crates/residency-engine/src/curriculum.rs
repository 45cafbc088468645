//! Curriculum and governed per-day specs.
//!
//! The curriculum is loaded once at process start into an immutable value
//! and passed by reference into the orchestration entry points. A day with
//! no curriculum entry means the residency is complete: a success signal,
//! not an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::personas::ProfessorId;

/// Score threshold applied when neither the lesson nor a governed spec
/// overrides it.
pub const DEFAULT_PASS_SCORE: u32 = 80;

/// One curriculum entry. `day` is the unique key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumLesson {
    pub lesson_id: String,
    pub day: u32,
    pub topic: String,
    #[serde(rename = "defaultProfessorId")]
    pub default_professor: ProfessorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_score: Option<u32>,
}

/// Category of a governed learning objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveCategory {
    Concept,
    Derivation,
    Computation,
    Implementation,
    Adversarial,
    Review,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedObjective {
    pub id: String,
    pub category: ObjectiveCategory,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GovernedProblemCounts {
    pub math: u32,
    pub implementation: u32,
    pub adversarial: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timebox_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_counts: Option<GovernedProblemCounts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedRubricDimension {
    pub id: String,
    pub name: String,
    pub points: u32,
    pub minimum_points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedRubricSpec {
    pub total_points: u32,
    pub passing_score: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<GovernedRubricDimension>,
    pub mastery_gate: String,
}

/// Optional structured enrichment for one day: objectives, constraints, and
/// the rubric contract the generated artifacts must honor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedDaySpec {
    pub day: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<GovernedObjective>,
    #[serde(default)]
    pub constraints: GovernedConstraints,
    pub rubric: GovernedRubricSpec,
}

impl GovernedDaySpec {
    /// The defaults applied when a day has no governed entry: three math
    /// problems, one implementation problem, one adversarial problem, and a
    /// pass score of 80/100.
    pub fn default_for(day: u32) -> Self {
        Self {
            day,
            objectives: Vec::new(),
            constraints: GovernedConstraints {
                problem_counts: Some(GovernedProblemCounts {
                    math: 3,
                    implementation: 1,
                    adversarial: 1,
                }),
                ..GovernedConstraints::default()
            },
            rubric: GovernedRubricSpec {
                total_points: 100,
                passing_score: DEFAULT_PASS_SCORE,
                dimensions: Vec::new(),
                mastery_gate: format!(
                    "Score at least {DEFAULT_PASS_SCORE}/100 with no rubric dimension below \
                     its minimum threshold."
                ),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum CurriculumError {
    #[error("Curriculum file not found: {0}. Create curriculum/curriculum.json first.")]
    NotFound(PathBuf),

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

    #[error("{0} must be a JSON array of lessons or an object with a \"lessons\" array")]
    InvalidShape(PathBuf),
}

/// Wrapper shape of `curriculum.json` when it is not a bare array.
#[derive(Deserialize)]
struct CurriculumFile {
    lessons: Vec<CurriculumLesson>,
}

/// Shape of the optional `homework-specs.json` governed-spec file.
#[derive(Deserialize)]
struct GovernedSpecsFile {
    days: Vec<GovernedDaySpec>,
}

/// The immutable curriculum: lessons sorted by day plus optional governed
/// specs keyed by day.
#[derive(Debug, Clone)]
pub struct Curriculum {
    lessons: Vec<CurriculumLesson>,
    governed: BTreeMap<u32, GovernedDaySpec>,
}

impl Curriculum {
    /// Load `curriculum.json` (and `homework-specs.json` when present)
    /// from the curriculum directory.
    pub fn load(dir: &Path) -> Result<Self, CurriculumError> {
        let curriculum_path = dir.join("curriculum.json");
        if !curriculum_path.exists() {
            return Err(CurriculumError::NotFound(curriculum_path));
        }
        let raw = fs::read_to_string(&curriculum_path).map_err(|source| CurriculumError::Io {
            path: curriculum_path.clone(),
            source,
        })?;

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| CurriculumError::Parse {
                path: curriculum_path.clone(),
                source,
            })?;

        let lessons = if value.is_array() {
            serde_json::from_value::<Vec<CurriculumLesson>>(value)
        } else if value.is_object() && value.get("lessons").is_some() {
            serde_json::from_value::<CurriculumFile>(value).map(|f| f.lessons)
        } else {
            return Err(CurriculumError::InvalidShape(curriculum_path));
        }
        .map_err(|source| CurriculumError::Parse {
            path: curriculum_path,
            source,
        })?;

        let mut curriculum = Self::from_lessons(lessons);

        let specs_path = dir.join("homework-specs.json");
        if specs_path.exists() {
            let raw = fs::read_to_string(&specs_path).map_err(|source| CurriculumError::Io {
                path: specs_path.clone(),
                source,
            })?;
            let file: GovernedSpecsFile =
                serde_json::from_str(&raw).map_err(|source| CurriculumError::Parse {
                    path: specs_path,
                    source,
                })?;
            for spec in file.days {
                curriculum.governed.insert(spec.day, spec);
            }
        }

        Ok(curriculum)
    }

    pub fn from_lessons(mut lessons: Vec<CurriculumLesson>) -> Self {
        lessons.sort_by_key(|l| l.day);
        Self {
            lessons,
            governed: BTreeMap::new(),
        }
    }

    pub fn with_governed(mut self, spec: GovernedDaySpec) -> Self {
        self.governed.insert(spec.day, spec);
        self
    }

    pub fn lesson_by_day(&self, day: u32) -> Option<&CurriculumLesson> {
        self.lessons.iter().find(|l| l.day == day)
    }

    /// No entry for the day means the residency has run out of curriculum.
    pub fn is_complete(&self, day: u32) -> bool {
        self.lesson_by_day(day).is_none()
    }

    pub fn last_day(&self) -> u32 {
        self.lessons.last().map(|l| l.day).unwrap_or(0)
    }

    pub fn governed_for_day(&self, day: u32) -> Option<&GovernedDaySpec> {
        self.governed.get(&day)
    }
}
