//! Task-to-model routing.
//!
//! Each task type maps to exactly one model. The match is exhaustive so a
//! new task type cannot ship without a routing decision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a completion call is for. Drives model selection and usage
/// attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Lesson, homework, and rubric generation.
    Lesson,
    /// Submission grading.
    Grading,
    /// Short status summaries for the residency log.
    Summary,
    /// Orchestration-internal calls.
    Orchestration,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lesson => write!(f, "lesson"),
            Self::Grading => write!(f, "grading"),
            Self::Summary => write!(f, "summary"),
            Self::Orchestration => write!(f, "orchestration"),
        }
    }
}

/// Resolve the model used for a task.
///
/// Lesson and grading need the strong model; summaries and orchestration
/// chatter run on the small one.
pub fn route_task(task: TaskType) -> &'static str {
    match task {
        TaskType::Lesson | TaskType::Grading => "gpt-5.2",
        TaskType::Summary | TaskType::Orchestration => "gpt-5-mini",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table() {
        assert_eq!(route_task(TaskType::Lesson), "gpt-5.2");
        assert_eq!(route_task(TaskType::Grading), "gpt-5.2");
        assert_eq!(route_task(TaskType::Summary), "gpt-5-mini");
        assert_eq!(route_task(TaskType::Orchestration), "gpt-5-mini");
    }

    #[test]
    fn test_task_type_display() {
        assert_eq!(TaskType::Lesson.to_string(), "lesson");
        assert_eq!(TaskType::Grading.to_string(), "grading");
    }
}
