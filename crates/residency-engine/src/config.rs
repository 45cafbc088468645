//! Engine configuration, read once from the environment at process start.
//!
//! Credentials stay `Option` here; preflight asserts presence and
//! authorization before any state mutation. Nothing in this module fails
//! or defaults silently.

use std::path::PathBuf;

/// Default OpenAI-compatible completion endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Completion service credential (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    /// Completion endpoint base URL (`OPENAI_BASE_URL`).
    pub openai_base_url: String,
    /// GitHub personal access token (`GITHUB_PAT`).
    pub github_pat: Option<String>,
    /// Target repository owner (`GITHUB_OWNER`).
    pub github_owner: Option<String>,
    /// Target repository name (`GITHUB_REPO`).
    pub github_repo: Option<String>,
    /// Branch the commit publisher targets (`RESIDENCY_BRANCH`).
    pub branch: String,
    /// Root directory for state, artifacts, and the usage ledger
    /// (`RESIDENCY_DIR`).
    pub residency_dir: PathBuf,
    /// Directory holding curriculum.json and homework-specs.json
    /// (`CURRICULUM_DIR`).
    pub curriculum_dir: PathBuf,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.into()),
            github_pat: std::env::var("GITHUB_PAT").ok(),
            github_owner: std::env::var("GITHUB_OWNER").ok(),
            github_repo: std::env::var("GITHUB_REPO").ok(),
            branch: std::env::var("RESIDENCY_BRANCH").unwrap_or_else(|_| "main".into()),
            residency_dir: std::env::var("RESIDENCY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("residency")),
            curriculum_dir: std::env::var("CURRICULUM_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("curriculum")),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            github_pat: None,
            github_owner: None,
            github_repo: None,
            branch: "main".into(),
            residency_dir: PathBuf::from("residency"),
            curriculum_dir: PathBuf::from("curriculum"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = EngineConfig::default();
        assert_eq!(config.branch, "main");
        assert_eq!(config.residency_dir, PathBuf::from("residency"));
        assert_eq!(config.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert!(config.openai_api_key.is_none());
    }
}
