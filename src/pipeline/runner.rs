//! Score-gated content pipeline.
//!
//! One run walks a fixed phase sequence:
//!
//! ```text
//! COLLECT -> GENERATE -> REVIEW <-> IMPROVE -> { ACCEPTED | EXHAUSTED }
//! ```
//!
//! The daily quota is checked once before any side effect. Phase outputs
//! are written to the output directory as they are produced, so a failed
//! run keeps its partial artifacts on disk. Every terminal run (accepted,
//! exhausted or failed) is appended to the day's run log and debits the
//! quota write-through.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::agents::{extract_output, AgentRegistry};
use crate::error::{ClientError, PipelineError};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::score::extract_score;
use crate::protocol::TaskState;
use crate::state::StateStore;

/// Logical agent names the pipeline calls, resolved via the registry.
pub const RESEARCH_AGENT: &str = "research";
pub const TRENDS_AGENT: &str = "trends";
pub const HOOK_AGENT: &str = "hook";
pub const CONCEPT_AGENT: &str = "concept";
pub const REVIEWER_AGENT: &str = "reviewer";
pub const IMPROVER_AGENT: &str = "improver";

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Collecting,
    Generating,
    Reviewing,
    Improving,
    Accepted,
    Exhausted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::Generating => "generating",
            Self::Reviewing => "reviewing",
            Self::Improving => "improving",
            Self::Accepted => "accepted",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Record of one pipeline run, appended to the day's run log when terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub topic: String,
    pub status: RunStatus,
    pub score: u32,
    pub iterations: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    /// Phase name → path of the artifact written for that phase.
    pub outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl PipelineRun {
    fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            status: RunStatus::Collecting,
            score: 0,
            iterations: 0,
            started_at: Local::now(),
            finished_at: None,
            outputs: BTreeMap::new(),
            error: None,
        }
    }
}

/// Seam between the pipeline and the agent fleet.
///
/// Production routes through the registry; tests script the replies.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    /// Calls one agent and returns its text output.
    async fn call(&self, agent: &str, message: &str) -> Result<String, PipelineError>;

    /// Whether an optional agent is available. Used for the trend
    /// sub-step, which only runs when a trends agent is registered.
    fn has_agent(&self, _name: &str) -> bool {
        false
    }
}

/// [`AgentCaller`] backed by the agent registry.
pub struct RegistryCaller {
    registry: Arc<AgentRegistry>,
    read_timeout: Duration,
}

impl RegistryCaller {
    pub fn new(registry: Arc<AgentRegistry>, read_timeout: Duration) -> Self {
        Self {
            registry,
            read_timeout,
        }
    }
}

#[async_trait]
impl AgentCaller for RegistryCaller {
    async fn call(&self, agent: &str, message: &str) -> Result<String, PipelineError> {
        let client = self
            .registry
            .get(agent)
            .ok_or_else(|| ClientError::UnknownAgent(agent.to_string()))?;
        let task = client.send_task(message, self.read_timeout).await?;
        if task.status.state == TaskState::Failed {
            return Err(PipelineError::PhaseFailed {
                phase: agent.to_string(),
                message: extract_output(&task)
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            });
        }
        extract_output(&task).ok_or_else(|| PipelineError::PhaseFailed {
            phase: agent.to_string(),
            message: "agent returned no output".to_string(),
        })
    }

    fn has_agent(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }
}

/// Drives pipeline runs against an agent fleet.
pub struct PipelineRunner {
    config: PipelineConfig,
    caller: Arc<dyn AgentCaller>,
    store: StateStore,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, caller: Arc<dyn AgentCaller>) -> Self {
        let store = StateStore::new(&config.state_dir);
        Self {
            config,
            caller,
            store,
        }
    }

    /// State store backing this runner's quota and run log.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Executes one run for `topic`.
    ///
    /// Refuses with `QuotaExhausted` before any agent call or file write
    /// when the daily budget is spent. Phase failures do not return `Err`:
    /// the run comes back with `Failed` status and the error message, and
    /// still counts against the quota.
    pub async fn run(&self, topic: &str) -> Result<PipelineRun, PipelineError> {
        let today = Local::now().date_naive();
        let used = self.store.load_quota().await?.effective_count(today);
        if used >= self.config.max_daily_runs {
            return Err(PipelineError::QuotaExhausted {
                used,
                limit: self.config.max_daily_runs,
            });
        }

        info!(topic, used, limit = self.config.max_daily_runs, "pipeline run starting");
        let mut run = PipelineRun::new(topic);

        if let Err(e) = self.execute(&mut run).await {
            warn!(topic, error = %e, "pipeline run failed");
            run.status = RunStatus::Failed;
            run.error = Some(e.to_string());
        }
        run.finished_at = Some(Local::now());

        // one locked write, quota debit first, so a crash cannot leave a
        // logged run whose debit was lost
        self.store.record_run(today, &run).await?;
        info!(topic, status = %run.status, score = run.score, iterations = run.iterations, "pipeline run finished");
        Ok(run)
    }

    async fn execute(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let topic = run.topic.clone();
        let stamp = run.started_at.format("%Y%m%d_%H%M%S").to_string();
        let slug = topic_slug(&topic);

        // COLLECT: research, with trend analysis fanned out when available
        run.status = RunStatus::Collecting;
        let research_prompt = format!(
            "Research the following topic and analyze the competitive landscape:\n\n\
             Topic: {topic}\n\n\
             - top performing existing content\n\
             - title and framing patterns\n\
             - audience complaints and unserved gaps"
        );
        let research = if self.caller.has_agent(TRENDS_AGENT) {
            let trends_prompt = format!("Summarize current trends relevant to the topic: {topic}");
            let (research, trends) = tokio::join!(
                self.caller.call(RESEARCH_AGENT, &research_prompt),
                self.caller.call(TRENDS_AGENT, &trends_prompt),
            );
            let mut research = research?;
            // trend data enriches research but never sinks the run
            match trends {
                Ok(trends) => {
                    research.push_str("\n\n## Trends\n");
                    research.push_str(&trends);
                }
                Err(e) => warn!(error = %e, "trend analysis failed, continuing without it"),
            }
            research
        } else {
            self.caller.call(RESEARCH_AGENT, &research_prompt).await?
        };
        self.write_output(run, "research", "drafts", &format!("{stamp}_{slug}_research.md"), &research)
            .await?;

        // GENERATE: hook and concept concurrently, merged into the draft
        run.status = RunStatus::Generating;
        let excerpt = char_excerpt(&research, 2000);
        let hook_prompt = format!(
            "Topic: {topic}\n\nResearch findings:\n{excerpt}\n\n\
             Based on the above, draft three opening hook candidates."
        );
        let concept_prompt = format!(
            "Topic: {topic}\n\nResearch findings:\n{excerpt}\n\n\
             Based on the above, draft a full script concept."
        );
        let (hook, concept) = tokio::join!(
            self.caller.call(HOOK_AGENT, &hook_prompt),
            self.caller.call(CONCEPT_AGENT, &concept_prompt),
        );
        let (hook, concept) = (hook?, concept?);
        self.write_output(run, "hook", "drafts", &format!("{stamp}_{slug}_hook.md"), &hook)
            .await?;
        self.write_output(run, "concept", "drafts", &format!("{stamp}_{slug}_concept.md"), &concept)
            .await?;

        let mut draft = format!("# {topic}\n\n## Hook\n{hook}\n\n## Script\n{concept}");

        // REVIEW <-> IMPROVE until the gate passes or iterations run out
        while run.iterations < self.config.max_iterations {
            run.iterations += 1;
            run.status = RunStatus::Reviewing;
            let review_prompt =
                format!("Evaluate the following script on a 100-point scale:\n\n{draft}");
            let review = self.caller.call(REVIEWER_AGENT, &review_prompt).await?;
            self.write_output(
                run,
                &format!("review_{}", run.iterations),
                "reviews",
                &format!("{stamp}_{slug}_review_{}.md", run.iterations),
                &review,
            )
            .await?;

            run.score = extract_score(&review);
            info!(
                iteration = run.iterations,
                score = run.score,
                target = self.config.target_score,
                "review scored"
            );

            if run.score >= self.config.target_score {
                run.status = RunStatus::Accepted;
                break;
            }

            if run.iterations < self.config.max_iterations {
                run.status = RunStatus::Improving;
                let improve_prompt = format!(
                    "Improve the following script:\n\n\
                     ## Current script\n{draft}\n\n\
                     ## Review feedback\n{review}"
                );
                draft = self.caller.call(IMPROVER_AGENT, &improve_prompt).await?;
                self.write_output(
                    run,
                    &format!("improve_{}", run.iterations),
                    "drafts",
                    &format!("{stamp}_{slug}_improve_{}.md", run.iterations),
                    &draft,
                )
                .await?;
            }
        }

        if run.status != RunStatus::Accepted {
            // best-effort draft is still worth keeping, flagged for a human
            run.status = RunStatus::Exhausted;
        }

        let final_content = format!(
            "# {topic}\n\n\
             Score: {}/100\n\
             Iterations: {}\n\
             Status: {}\n\n\
             ---\n\n{draft}\n",
            run.score,
            run.iterations,
            if run.status == RunStatus::Accepted {
                "accepted"
            } else {
                "needs review"
            },
        );
        self.write_output(
            run,
            "final",
            "final",
            &format!("{stamp}_{slug}_final_{}pts.md", run.score),
            &final_content,
        )
        .await?;

        Ok(())
    }

    async fn write_output(
        &self,
        run: &mut PipelineRun,
        key: &str,
        subdir: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, PipelineError> {
        let dir = self.config.output_dir.join(subdir);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        fs::write(&path, content).await?;
        run.outputs
            .insert(key.to_string(), path.display().to_string());
        Ok(path)
    }
}

/// Filesystem-safe slug derived from the topic.
fn topic_slug(topic: &str) -> String {
    let slug: String = topic
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(30)
        .collect();
    if slug.trim_matches('_').is_empty() {
        "topic".to_string()
    } else {
        slug
    }
}

/// First `max` characters of `text`, respecting char boundaries.
fn char_excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
