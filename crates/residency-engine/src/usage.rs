//! Token usage and cost ledger.
//!
//! Two sinks, written after every completion call: `usage.json` (append-only
//! machine log) and `usage.md` (rendered report, rewritten each time).
//! Ledger failures are logged and swallowed; accounting must never take
//! down a run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::router::{route_task, TaskType};

/// USD per 1M tokens for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_m: f64,
    pub cached_input_per_m: Option<f64>,
    pub output_per_m: f64,
}

/// Pricing table. `None` for models this ledger cannot price.
pub fn pricing_for(model: &str) -> Option<ModelPricing> {
    match model {
        "gpt-5.2" => Some(ModelPricing {
            input_per_m: 1.75,
            cached_input_per_m: Some(0.175),
            output_per_m: 14.0,
        }),
        "gpt-5.2-pro" => Some(ModelPricing {
            input_per_m: 21.0,
            cached_input_per_m: None,
            output_per_m: 168.0,
        }),
        "gpt-5-mini" => Some(ModelPricing {
            input_per_m: 0.25,
            cached_input_per_m: Some(0.025),
            output_per_m: 2.0,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub cached_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub cached_input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
}

fn round6(n: f64) -> f64 {
    (n * 1_000_000.0).round() / 1_000_000.0
}

/// Price one call. An unknown model is recorded at $0 with a warning rather
/// than failing the run.
pub fn calculate_cost(logical_model: &str, usage: TokenUsage) -> CostBreakdown {
    let Some(pricing) = pricing_for(logical_model) else {
        warn!(model = logical_model, "No pricing for model — cost recorded as $0");
        return CostBreakdown::default();
    };

    let non_cached = usage.prompt_tokens.saturating_sub(usage.cached_tokens);
    let input = non_cached as f64 * (pricing.input_per_m / 1_000_000.0);
    let cached = pricing
        .cached_input_per_m
        .map(|rate| usage.cached_tokens as f64 * (rate / 1_000_000.0))
        .unwrap_or(0.0);
    let output = usage.completion_tokens as f64 * (pricing.output_per_m / 1_000_000.0);

    CostBreakdown {
        input_cost_usd: round6(input),
        cached_input_cost_usd: round6(cached),
        output_cost_usd: round6(output),
        total_cost_usd: round6(input + cached + output),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub task: TaskType,
    pub logical_model: String,
    pub api_model: String,
    pub usage: TokenUsage,
    pub cost: CostBreakdown,
}

/// The on-disk ledger.
pub struct UsageLedger {
    json_path: PathBuf,
    md_path: PathBuf,
}

impl UsageLedger {
    pub fn new(residency_dir: &Path) -> Self {
        Self {
            json_path: residency_dir.join("usage.json"),
            md_path: residency_dir.join("usage.md"),
        }
    }

    /// Record one completion call. Returns the entry for logging; write
    /// failures are warned about, never propagated.
    pub fn record(&self, task: TaskType, api_model: &str, usage: TokenUsage) -> UsageEntry {
        let logical_model = route_task(task).to_string();
        let cost = calculate_cost(&logical_model, usage);
        let entry = UsageEntry {
            timestamp: Utc::now(),
            task,
            logical_model,
            api_model: api_model.to_string(),
            usage,
            cost,
        };

        let mut entries = self.load_entries();
        entries.push(entry.clone());

        if let Some(dir) = self.json_path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!(error = %e, "Failed to create ledger directory");
                return entry;
            }
        }
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.json_path, json) {
                    warn!(error = %e, "Failed to write usage.json");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize usage entries"),
        }
        if let Err(e) = fs::write(&self.md_path, render_markdown(&entries)) {
            warn!(error = %e, "Failed to write usage.md");
        }

        tracing::info!(
            task = %entry.task,
            model = %entry.logical_model,
            tokens = entry.usage.total_tokens,
            cost_usd = entry.cost.total_cost_usd,
            "Usage recorded"
        );
        entry
    }

    fn load_entries(&self) -> Vec<UsageEntry> {
        let Ok(raw) = fs::read_to_string(&self.json_path) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }
}

fn render_markdown(entries: &[UsageEntry]) -> String {
    let mut out = String::from(
        "# API Usage Log\n\n> Auto-generated. Do not edit manually.\n\n---\n\n## Call History\n\n\
         | # | Timestamp | Task | Logical Model | API Model | Prompt | Cached | Completion | Total | Cost (USD) |\n\
         |---|-----------|------|---------------|-----------|--------|--------|------------|-------|------------|\n",
    );

    let mut totals = (TokenUsage::default(), CostBreakdown::default());
    for (i, e) in entries.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | ${:.6} |\n",
            i + 1,
            e.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            e.task,
            e.logical_model,
            e.api_model,
            e.usage.prompt_tokens,
            e.usage.cached_tokens,
            e.usage.completion_tokens,
            e.usage.total_tokens,
            e.cost.total_cost_usd,
        ));
        totals.0.prompt_tokens += e.usage.prompt_tokens;
        totals.0.cached_tokens += e.usage.cached_tokens;
        totals.0.completion_tokens += e.usage.completion_tokens;
        totals.0.total_tokens += e.usage.total_tokens;
        totals.1.input_cost_usd += e.cost.input_cost_usd;
        totals.1.cached_input_cost_usd += e.cost.cached_input_cost_usd;
        totals.1.output_cost_usd += e.cost.output_cost_usd;
        totals.1.total_cost_usd += e.cost.total_cost_usd;
    }

    out.push_str(&format!(
        "\n---\n\n## Totals\n\n| Metric | Value |\n|--------|-------|\n\
         | Total API calls | {} |\n\
         | Total prompt tokens | {} |\n\
         | Total cached tokens | {} |\n\
         | Total completion tokens | {} |\n\
         | **Total tokens** | **{}** |\n\
         | Input cost | ${:.6} |\n\
         | Cached input cost | ${:.6} |\n\
         | Output cost | ${:.6} |\n\
         | **Total cost** | **${:.6}** |\n",
        entries.len(),
        totals.0.prompt_tokens,
        totals.0.cached_tokens,
        totals.0.completion_tokens,
        totals.0.total_tokens,
        totals.1.input_cost_usd,
        totals.1.cached_input_cost_usd,
        totals.1.output_cost_usd,
        totals.1.total_cost_usd,
    ));

    // Per-model breakdown.
    let mut models: Vec<&str> = entries.iter().map(|e| e.logical_model.as_str()).collect();
    models.sort_unstable();
    models.dedup();
    if !models.is_empty() {
        out.push_str(
            "\n---\n\n## Cost by Model\n\n\
             | Logical Model | Calls | Total Tokens | Total Cost |\n\
             |---------------|-------|--------------|------------|\n",
        );
        for model in models {
            let rows: Vec<&UsageEntry> = entries
                .iter()
                .filter(|e| e.logical_model == model)
                .collect();
            let tokens: u64 = rows.iter().map(|e| e.usage.total_tokens).sum();
            let cost: f64 = rows.iter().map(|e| e.cost.total_cost_usd).sum();
            out.push_str(&format!(
                "| {} | {} | {} | ${:.6} |\n",
                model,
                rows.len(),
                tokens,
                cost
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, cached: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            cached_tokens: cached,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_cost_for_strong_model() {
        let cost = calculate_cost("gpt-5.2", usage(1_000_000, 0, 1_000_000));
        assert_eq!(cost.input_cost_usd, 1.75);
        assert_eq!(cost.output_cost_usd, 14.0);
        assert_eq!(cost.total_cost_usd, 15.75);
    }

    #[test]
    fn test_cached_tokens_priced_separately() {
        let cost = calculate_cost("gpt-5.2", usage(1_000_000, 400_000, 0));
        assert_eq!(cost.input_cost_usd, round6(600_000.0 * 1.75 / 1e6));
        assert_eq!(cost.cached_input_cost_usd, round6(400_000.0 * 0.175 / 1e6));
    }

    #[test]
    fn test_model_without_cached_rate() {
        let cost = calculate_cost("gpt-5.2-pro", usage(1_000_000, 500_000, 0));
        assert_eq!(cost.cached_input_cost_usd, 0.0);
        // Non-cached input still priced.
        assert_eq!(cost.input_cost_usd, round6(500_000.0 * 21.0 / 1e6));
    }

    #[test]
    fn test_unknown_model_costs_zero() {
        let cost = calculate_cost("mystery-model", usage(1000, 0, 1000));
        assert_eq!(cost.total_cost_usd, 0.0);
    }

    #[test]
    fn test_ledger_appends_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = UsageLedger::new(dir.path());
        ledger.record(TaskType::Lesson, "gpt-5.2", usage(1000, 0, 500));
        ledger.record(TaskType::Summary, "gpt-5-mini", usage(200, 0, 100));

        let entries: Vec<UsageEntry> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("usage.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].logical_model, "gpt-5.2");

        let md = fs::read_to_string(dir.path().join("usage.md")).unwrap();
        assert!(md.contains("| Total API calls | 2 |"));
        assert!(md.contains("gpt-5-mini"));
    }
}
