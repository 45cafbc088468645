//! Commit publisher bridge (GitHub REST v3).
//!
//! Publishes a set of files as one commit via the blob → tree → commit →
//! ref-update sequence. The ref update comes last, so a failure anywhere in
//! the sequence leaves the branch untouched and callers can treat the whole
//! thing as a single logical atomic operation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "residency-engine";

/// One file in a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitFile {
    pub path: String,
    pub content: String,
}

/// The published commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub sha: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("GITHUB_PAT, GITHUB_OWNER, and GITHUB_REPO must all be set in environment")]
    MissingCredential,

    #[error("Authentication failed — GITHUB_PAT is invalid or expired (needs \"repo\" scope)")]
    Auth,

    #[error("Forbidden ({endpoint}) — the token lacks the required \"repo\" permissions")]
    Forbidden { endpoint: String },

    #[error("Not found ({endpoint}) — check the repository coordinates and branch")]
    NotFound { endpoint: String },

    #[error("Repository exists but is empty — push an initial commit to create the branch")]
    EmptyRepository,

    #[error("Network error reaching api.github.com: {0}")]
    Network(String),

    #[error("GitHub API error {status} on {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },
}

/// The commit-service seam. Tests substitute recording implementations.
#[async_trait]
pub trait CommitPublisher: Send + Sync {
    async fn commit(
        &self,
        files: &[CommitFile],
        message: &str,
    ) -> Result<CommitResult, PublishError>;
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TreeItem {
    path: String,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: String,
}

#[derive(Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaObject,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Classify a non-success GitHub status into the publish taxonomy.
fn classify_status(status: u16, endpoint: &str, message: &str) -> PublishError {
    match status {
        401 => PublishError::Auth,
        403 => PublishError::Forbidden {
            endpoint: endpoint.to_string(),
        },
        404 => PublishError::NotFound {
            endpoint: endpoint.to_string(),
        },
        422 if message.contains("Git Repository is empty") => PublishError::EmptyRepository,
        _ => PublishError::Api {
            status,
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        },
    }
}

// ── Production client ─────────────────────────────────────────────────────

/// GitHub-backed commit publisher bound to one repository and branch.
pub struct GitHubPublisher {
    http: reqwest::Client,
    pat: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GitHubPublisher {
    pub fn new(pat: String, owner: String, repo: String, branch: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            pat,
            owner,
            repo,
            branch,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, PublishError> {
        match (&config.github_pat, &config.github_owner, &config.github_repo) {
            (Some(pat), Some(owner), Some(repo)) => Ok(Self::new(
                pat.clone(),
                owner.clone(),
                repo.clone(),
                config.branch.clone(),
            )),
            _ => Err(PublishError::MissingCredential),
        }
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{API_BASE}/repos/{}/{}/{tail}", self.owner, self.repo)
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<serde_json::Value, PublishError> {
        let response = request
            .bearer_auth(&self.pat)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(classify_status(status.as_u16(), endpoint, &message));
        }

        response
            .json()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))
    }

    async fn get(&self, tail: &str) -> Result<serde_json::Value, PublishError> {
        self.send_json(self.http.get(self.repo_url(tail)), tail).await
    }

    async fn post(
        &self,
        tail: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PublishError> {
        self.send_json(self.http.post(self.repo_url(tail)).json(&body), tail)
            .await
    }

    async fn patch(
        &self,
        tail: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PublishError> {
        self.send_json(self.http.patch(self.repo_url(tail)).json(&body), tail)
            .await
    }

    fn parse<T: serde::de::DeserializeOwned>(
        value: serde_json::Value,
        endpoint: &str,
    ) -> Result<T, PublishError> {
        serde_json::from_value(value).map_err(|e| PublishError::Api {
            status: 200,
            endpoint: endpoint.to_string(),
            message: format!("unexpected response shape: {e}"),
        })
    }

    async fn latest_commit_sha(&self) -> Result<String, PublishError> {
        let tail = format!("git/refs/heads/{}", self.branch);
        let value = self.get(&tail).await?;
        Ok(Self::parse::<RefResponse>(value, &tail)?.object.sha)
    }

    async fn base_tree_sha(&self, commit_sha: &str) -> Result<String, PublishError> {
        let tail = format!("git/commits/{commit_sha}");
        let value = self.get(&tail).await?;
        Ok(Self::parse::<CommitResponse>(value, &tail)?.tree.sha)
    }

    async fn create_blob(&self, content: &str) -> Result<String, PublishError> {
        let value = self
            .post(
                "git/blobs",
                serde_json::json!({
                    "content": BASE64.encode(content.as_bytes()),
                    "encoding": "base64",
                }),
            )
            .await?;
        Ok(Self::parse::<ShaObject>(value, "git/blobs")?.sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        items: &[TreeItem],
    ) -> Result<String, PublishError> {
        let value = self
            .post(
                "git/trees",
                serde_json::json!({ "base_tree": base_tree, "tree": items }),
            )
            .await?;
        Ok(Self::parse::<ShaObject>(value, "git/trees")?.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, PublishError> {
        let value = self
            .post(
                "git/commits",
                serde_json::json!({
                    "message": message,
                    "tree": tree_sha,
                    "parents": [parent_sha],
                }),
            )
            .await?;
        Ok(Self::parse::<ShaObject>(value, "git/commits")?.sha)
    }

    async fn update_ref(&self, commit_sha: &str) -> Result<(), PublishError> {
        let tail = format!("git/refs/heads/{}", self.branch);
        self.patch(
            &tail,
            serde_json::json!({ "sha": commit_sha, "force": false }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommitPublisher for GitHubPublisher {
    async fn commit(
        &self,
        files: &[CommitFile],
        message: &str,
    ) -> Result<CommitResult, PublishError> {
        debug!(
            count = files.len(),
            owner = %self.owner,
            repo = %self.repo,
            branch = %self.branch,
            "Committing files"
        );

        let parent_sha = self.latest_commit_sha().await?;
        let base_tree = self.base_tree_sha(&parent_sha).await?;

        let mut items = Vec::with_capacity(files.len());
        for file in files {
            debug!(path = %file.path, "Creating blob");
            let blob_sha = self.create_blob(&file.content).await?;
            items.push(TreeItem {
                path: file.path.clone(),
                mode: "100644",
                kind: "blob",
                sha: blob_sha,
            });
        }

        let tree_sha = self.create_tree(&base_tree, &items).await?;
        let commit_sha = self.create_commit(message, &tree_sha, &parent_sha).await?;
        self.update_ref(&commit_sha).await?;

        let url = format!(
            "https://github.com/{}/{}/commit/{commit_sha}",
            self.owner, self.repo
        );
        tracing::info!(sha = %commit_sha, url = %url, "Commit published");
        Ok(CommitResult {
            sha: commit_sha,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_and_permission_errors() {
        assert!(matches!(classify_status(401, "repos/o/r", ""), PublishError::Auth));
        assert!(matches!(
            classify_status(403, "git/blobs", ""),
            PublishError::Forbidden { .. }
        ));
        assert!(matches!(
            classify_status(404, "git/refs/heads/main", ""),
            PublishError::NotFound { .. }
        ));
    }

    #[test]
    fn test_classify_empty_repository() {
        let err = classify_status(422, "git/refs/heads/main", "Git Repository is empty.");
        assert!(matches!(err, PublishError::EmptyRepository));
        // Other 422s stay generic API errors.
        assert!(matches!(
            classify_status(422, "git/trees", "Invalid tree info"),
            PublishError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn test_from_config_requires_all_coordinates() {
        let mut config = EngineConfig::default();
        assert!(GitHubPublisher::from_config(&config).is_err());
        config.github_pat = Some("ghp_x".into());
        config.github_owner = Some("octo".into());
        assert!(GitHubPublisher::from_config(&config).is_err());
        config.github_repo = Some("residency".into());
        assert!(GitHubPublisher::from_config(&config).is_ok());
    }

    #[test]
    fn test_tree_item_wire_shape() {
        let item = TreeItem {
            path: "residency/day-001/lesson.md".into(),
            mode: "100644",
            kind: "blob",
            sha: "abc".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["mode"], "100644");
    }
}
