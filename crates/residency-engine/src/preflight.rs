//! Connectivity preflight for both external services.
//!
//! Runs before any state mutation: if either the completion service or the
//! commit service is unreachable or unauthorized, the invocation aborts with
//! a classified, human-readable message. The two checks are independent and
//! run concurrently.

use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of probing one service.
#[derive(Debug, Clone)]
pub struct ServiceCheck {
    pub service: &'static str,
    pub ok: bool,
    pub message: String,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub all_ok: bool,
    pub checks: Vec<ServiceCheck>,
}

#[derive(Debug, Error)]
#[error("Preflight checks failed. Resolve the following before running:\n{summary}")]
pub struct PreflightFailure {
    summary: String,
}

/// Run both service checks concurrently and log a line per result.
pub async fn run_preflight(config: &EngineConfig) -> PreflightReport {
    info!("Running preflight connectivity checks");
    let (completion, github) = tokio::join!(check_completion(config), check_github(config));

    let checks = vec![completion, github];
    for check in &checks {
        info!(
            service = check.service,
            ok = check.ok,
            latency_ms = check.latency_ms,
            "{}",
            check.message
        );
    }
    PreflightReport {
        all_ok: checks.iter().all(|c| c.ok),
        checks,
    }
}

/// Turn a failed report into a fatal error listing every failure.
pub fn assert_preflight(report: &PreflightReport) -> Result<(), PreflightFailure> {
    if report.all_ok {
        return Ok(());
    }
    let summary = report
        .checks
        .iter()
        .filter(|c| !c.ok)
        .map(|c| format!("  - {}: {}", c.service, c.message))
        .collect::<Vec<_>>()
        .join("\n");
    Err(PreflightFailure { summary })
}

// ── Completion service ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Authenticated GET /models, the lightest endpoint that proves the key
/// works. Consumes zero tokens.
async fn check_completion(config: &EngineConfig) -> ServiceCheck {
    let service = "completion";
    let Some(api_key) = &config.openai_api_key else {
        return ServiceCheck {
            service,
            ok: false,
            message: "OPENAI_API_KEY is not set in environment.".into(),
            latency_ms: None,
        };
    };

    let start = Instant::now();
    let url = format!("{}/models", config.openai_base_url.trim_end_matches('/'));
    let result = reqwest::Client::new()
        .get(&url)
        .bearer_auth(api_key)
        .timeout(CHECK_TIMEOUT)
        .send()
        .await;
    let latency_ms = Some(start.elapsed().as_millis() as u64);

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            return ServiceCheck {
                service,
                ok: false,
                message: classify_completion_transport(&e),
                latency_ms,
            }
        }
    };

    let status = response.status().as_u16();
    if status == 401 || status == 403 {
        return ServiceCheck {
            service,
            ok: false,
            message: "Authentication failed — OPENAI_API_KEY is invalid or revoked.".into(),
            latency_ms,
        };
    }
    if status == 429 {
        return ServiceCheck {
            service,
            ok: false,
            message: "Rate limit exceeded — the account has hit its API quota.".into(),
            latency_ms,
        };
    }
    if !response.status().is_success() {
        return ServiceCheck {
            service,
            ok: false,
            message: format!("Unexpected completion API status {status}."),
            latency_ms,
        };
    }

    match response.json::<ModelList>().await {
        Ok(list) if list.data.is_empty() => ServiceCheck {
            service,
            ok: false,
            message: "API key authenticated but no models returned.".into(),
            latency_ms,
        },
        Ok(list) => ServiceCheck {
            service,
            ok: true,
            message: format!("Authenticated. {} model(s) accessible.", list.data.len()),
            latency_ms,
        },
        Err(e) => ServiceCheck {
            service,
            ok: false,
            message: format!("Malformed /models response: {e}."),
            latency_ms,
        },
    }
}

fn classify_completion_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timed out — completion API did not respond in time.".into()
    } else if err.is_connect() {
        "Network error — cannot reach the completion endpoint. Check your connection.".into()
    } else {
        format!("Unexpected error: {err}")
    }
}

// ── Commit service ────────────────────────────────────────────────────────

/// Two probes: repository access (PAT valid + repo exists) and the target
/// branch ref (branch exists, repo non-empty).
async fn check_github(config: &EngineConfig) -> ServiceCheck {
    let service = "github";
    let (Some(pat), Some(owner), Some(repo)) = (
        &config.github_pat,
        &config.github_owner,
        &config.github_repo,
    ) else {
        let missing = [
            ("GITHUB_PAT", config.github_pat.is_none()),
            ("GITHUB_OWNER", config.github_owner.is_none()),
            ("GITHUB_REPO", config.github_repo.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
        return ServiceCheck {
            service,
            ok: false,
            message: format!("{missing} not set in environment."),
            latency_ms: None,
        };
    };

    let start = Instant::now();
    let client = reqwest::Client::new();

    let repo_endpoint = format!("repos/{owner}/{repo}");
    if let Err(message) = probe_github(&client, pat, &repo_endpoint, config).await {
        return ServiceCheck {
            service,
            ok: false,
            message,
            latency_ms: Some(start.elapsed().as_millis() as u64),
        };
    }

    let ref_endpoint = format!("repos/{owner}/{repo}/git/refs/heads/{}", config.branch);
    match probe_github(&client, pat, &ref_endpoint, config).await {
        Ok(()) => ServiceCheck {
            service,
            ok: true,
            message: format!(
                "Authenticated. Repo \"{owner}/{repo}\" accessible. Branch \"{}\" exists.",
                config.branch
            ),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(message) => ServiceCheck {
            service,
            ok: false,
            message,
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
    }
}

async fn probe_github(
    client: &reqwest::Client,
    pat: &str,
    endpoint: &str,
    config: &EngineConfig,
) -> Result<(), String> {
    let result = client
        .get(format!("https://api.github.com/{endpoint}"))
        .bearer_auth(pat)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .header("User-Agent", "residency-engine")
        .timeout(CHECK_TIMEOUT)
        .send()
        .await;

    let response = match result {
        Ok(r) => r,
        Err(e) if e.is_connect() || e.is_timeout() => {
            return Err(
                "Network error — cannot reach api.github.com. Check your connection.".into(),
            )
        }
        Err(e) => return Err(format!("Unexpected error: {e}")),
    };

    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_github_status(status, endpoint, &body, config))
}

fn classify_github_status(
    status: u16,
    endpoint: &str,
    body: &str,
    config: &EngineConfig,
) -> String {
    match status {
        401 => "Authentication failed — GITHUB_PAT is invalid or expired. Verify the token has \
                'repo' scope."
            .into(),
        403 => format!("Forbidden (GET /{endpoint}) — PAT lacks the required 'repo' permissions."),
        404 if endpoint.contains("refs/heads/") => format!(
            "Branch \"{}\" not found in repo. The repository must have at least one commit on \
             that branch before committing.",
            config.branch
        ),
        404 => format!(
            "Repository not found (GET /{endpoint}). Check GITHUB_OWNER and GITHUB_REPO, and \
             confirm the repo exists."
        ),
        422 if body.contains("Git Repository is empty") => {
            "Repository exists but is empty. Push an initial commit to create the branch.".into()
        }
        _ => format!("GitHub API error {status} (GET /{endpoint})."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_classify_github_statuses() {
        let cfg = config();
        assert!(classify_github_status(401, "repos/o/r", "", &cfg).contains("GITHUB_PAT"));
        assert!(classify_github_status(403, "repos/o/r", "", &cfg).contains("Forbidden"));
        assert!(
            classify_github_status(404, "repos/o/r/git/refs/heads/main", "", &cfg)
                .contains("Branch")
        );
        assert!(classify_github_status(404, "repos/o/r", "", &cfg).contains("Repository not found"));
        assert!(
            classify_github_status(422, "repos/o/r", "Git Repository is empty.", &cfg)
                .contains("empty")
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        let report = run_preflight(&config()).await;
        assert!(!report.all_ok);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks[0].message.contains("OPENAI_API_KEY"));
        assert!(report.checks[1].message.contains("GITHUB_PAT"));
        // No request was made, so no latency was measured.
        assert!(report.checks.iter().all(|c| c.latency_ms.is_none()));
    }

    #[tokio::test]
    async fn test_assert_preflight_lists_failures() {
        let report = run_preflight(&config()).await;
        let err = assert_preflight(&report).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("completion:"));
        assert!(message.contains("github:"));
    }

    #[test]
    fn test_assert_preflight_passes_clean_report() {
        let report = PreflightReport {
            all_ok: true,
            checks: vec![],
        };
        assert!(assert_preflight(&report).is_ok());
    }
}
