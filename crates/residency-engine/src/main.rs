use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use residency_engine::config::EngineConfig;
use residency_engine::curriculum::Curriculum;
use residency_engine::github_bridge::GitHubPublisher;
use residency_engine::openai_bridge::OpenAiBridge;
use residency_engine::orchestrator::{self, DayCycleOutcome, EngineContext};
use residency_engine::personas::PersonaSet;
use residency_engine::preflight::{assert_preflight, run_preflight};
use residency_engine::state::StateStore;

#[derive(Parser)]
#[command(
    name = "residency-engine",
    about = "Autonomous cryptography residency engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the initial residency state. Refuses to overwrite.
    Init,
    /// Check connectivity to the completion and commit services.
    Preflight,
    /// Run one generation/commit cycle for the current day.
    RunDay,
    /// Grade a homework submission for a day.
    Grade {
        /// 1-based residency day.
        day: u32,
        /// Submission file; reads standard input when omitted.
        #[arg(long)]
        submission: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Command::Init => {
            let store = StateStore::new(&config.residency_dir);
            let state = store.init()?;
            info!(
                day = state.current_day,
                lesson = %state.current_lesson_id,
                path = %store.state_path().display(),
                "Residency state initialized"
            );
        }
        Command::Preflight => {
            let report = run_preflight(&config).await;
            assert_preflight(&report)?;
            info!("All preflight checks passed");
        }
        Command::RunDay => {
            // Fail before any state mutation if either service is down.
            let report = run_preflight(&config).await;
            assert_preflight(&report)?;

            let curriculum = Curriculum::load(&config.curriculum_dir)?;
            let personas = PersonaSet::builtin()?;
            let llm = OpenAiBridge::from_config(&config)?;
            let publisher = GitHubPublisher::from_config(&config)?;
            let ctx = EngineContext {
                config: &config,
                curriculum: &curriculum,
                personas: &personas,
                llm: &llm,
                publisher: &publisher,
            };

            match orchestrator::run_day_cycle(&ctx).await? {
                DayCycleOutcome::Assigned {
                    day,
                    attempt,
                    commit,
                } => {
                    info!(day, attempt, url = %commit.url, "Day cycle complete — status ASSIGNED");
                }
                DayCycleOutcome::NothingToDo { status } => {
                    info!(%status, "Nothing to do. To regenerate, set status to NOT_STARTED in state.json");
                }
                DayCycleOutcome::ResidencyComplete { last_day } => {
                    info!(last_day, "Residency complete — nothing left to run");
                }
            }
        }
        Command::Grade { day, submission } => {
            let submission_text = match submission {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read submission {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed to read submission from stdin")?;
                    buffer
                }
            };

            let personas = PersonaSet::builtin()?;
            let llm = OpenAiBridge::from_config(&config)?;
            let record =
                orchestrator::grade_day(&config, &personas, &llm, day, &submission_text).await?;
            info!(day, score = record.score, pass = record.pass, "Submission graded");
        }
    }

    Ok(())
}
