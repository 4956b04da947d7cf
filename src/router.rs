//! Confidence-based routing across registered modes.
//!
//! Every enabled plugin scores the input concurrently under its own time box;
//! the highest confidence wins, ties going to the lower priority value and
//! then to the lexically smaller id. A best score below the activation
//! threshold hands the turn to the fallback mode.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::error::{ModeError, Result};
use crate::mode::{ModeContext, ModeId, SharedPlugin, clamp_confidence, duration_ms};
use crate::registry::ModeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringOutcome {
    Scored,
    Failed,
    Panicked,
    TimedOut,
}

impl ScoringOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scored => "scored",
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub mode_id: ModeId,
    pub priority: u32,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub outcome: ScoringOutcome,
}

impl Candidate {
    pub fn new(mode_id: impl Into<ModeId>, priority: u32, confidence: f64) -> Self {
        Self {
            mode_id: mode_id.into(),
            priority,
            confidence: clamp_confidence(confidence),
            reasoning: Vec::new(),
            outcome: ScoringOutcome::Scored,
        }
    }

    fn zero(mode_id: ModeId, priority: u32, outcome: ScoringOutcome, reason: String) -> Self {
        Self {
            mode_id,
            priority,
            confidence: 0.0,
            reasoning: vec![reason],
            outcome,
        }
    }
}

/// Total order used for ranking: best candidate first.
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.mode_id.cmp(&b.mode_id))
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub winner: ModeId,
    pub confidence: f64,
    /// True when no candidate cleared the threshold.
    pub used_fallback: bool,
    pub ranked: Vec<Candidate>,
    pub reasoning: Vec<String>,
}

impl RoutingDecision {
    pub fn candidate(&self, mode_id: &str) -> Option<&Candidate> {
        self.ranked.iter().find(|c| c.mode_id.as_str() == mode_id)
    }
}

/// Deterministic winner selection over already-collected scores.
pub fn select_winner(
    mut candidates: Vec<Candidate>,
    threshold: f64,
    fallback: &ModeId,
) -> RoutingDecision {
    candidates.sort_by(rank_order);

    let top = candidates.first();
    match top {
        Some(best) if best.confidence >= threshold => RoutingDecision {
            winner: best.mode_id.clone(),
            confidence: best.confidence,
            used_fallback: false,
            reasoning: best.reasoning.clone(),
            ranked: candidates,
        },
        _ => {
            let note = match top {
                Some(best) => format!(
                    "no mode reached activation threshold {:.2} (best: {} at {:.2}); using fallback '{}'",
                    threshold, best.mode_id, best.confidence, fallback
                ),
                None => format!("no enabled modes scored; using fallback '{}'", fallback),
            };
            let fallback_candidate = candidates.iter().find(|c| &c.mode_id == fallback);
            let confidence = fallback_candidate.map_or(0.0, |c| c.confidence);
            let mut reasoning = vec![note];
            if let Some(c) = fallback_candidate {
                reasoning.extend(c.reasoning.iter().cloned());
            }
            RoutingDecision {
                winner: fallback.clone(),
                confidence,
                used_fallback: true,
                reasoning,
                ranked: candidates,
            }
        }
    }
}

pub struct ConfidenceRouter {
    registry: Arc<ModeRegistry>,
    config: RouterConfig,
    fallback: ModeId,
}

impl ConfidenceRouter {
    /// Fails if the registry has no fallback mode.
    pub fn new(registry: Arc<ModeRegistry>, config: RouterConfig) -> Result<Self> {
        let fallback = registry.fallback_id().ok_or(ModeError::MissingFallback)?;
        Ok(Self {
            registry,
            config,
            fallback,
        })
    }

    pub fn fallback(&self) -> &ModeId {
        &self.fallback
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub async fn route(&self, ctx: &ModeContext) -> RoutingDecision {
        let plugins = self.registry.enabled();
        let budget = self.config.scoring_timeout();
        let shared = Arc::new(ctx.clone());

        let candidates = join_all(
            plugins
                .into_iter()
                .map(|plugin| score_with_budget(plugin, Arc::clone(&shared), budget)),
        )
        .await;

        let decision = select_winner(candidates, self.config.activation_threshold, &self.fallback);
        debug!(
            session = %ctx.session_id,
            winner = %decision.winner,
            confidence = decision.confidence,
            fallback = decision.used_fallback,
            candidates = decision.ranked.len(),
            "Routing decided"
        );
        decision
    }
}

/// Scores one plugin on its own task so a scorer that blocks its thread
/// cannot hold up the others. Anything ready after `budget` counts as a
/// timeout.
async fn score_with_budget(
    plugin: SharedPlugin,
    ctx: Arc<ModeContext>,
    budget: Duration,
) -> Candidate {
    let id = plugin.id().clone();
    let priority = plugin.config().priority;

    let started = Instant::now();
    let task = tokio::spawn(async move { plugin.score(&ctx).await });
    let abort = task.abort_handle();
    let outcome = tokio::time::timeout(budget, task).await;
    let late = started.elapsed() > budget;

    match outcome {
        Ok(Ok(Ok(score))) if !late => {
            if score.mode_id != id {
                warn!(mode = %id, reported = %score.mode_id, "Plugin scored under a different id");
            }
            Candidate {
                mode_id: id,
                priority,
                confidence: clamp_confidence(score.confidence),
                reasoning: score.reasoning,
                outcome: ScoringOutcome::Scored,
            }
        }
        Ok(Ok(Err(e))) if !late => {
            warn!(mode = %id, error = %e, "Scoring failed");
            Candidate::zero(id, priority, ScoringOutcome::Failed, format!("scoring failed: {}", e))
        }
        Ok(Err(e)) if !late && e.is_panic() => {
            warn!(mode = %id, "Scoring panicked");
            Candidate::zero(id, priority, ScoringOutcome::Panicked, "scoring panicked".into())
        }
        Ok(Err(e)) if !late => {
            warn!(mode = %id, error = %e, "Scoring task did not finish");
            Candidate::zero(id, priority, ScoringOutcome::Failed, format!("scoring failed: {}", e))
        }
        _ => {
            abort.abort();
            warn!(
                mode = %id,
                budget_ms = duration_ms(budget),
                "Scoring timed out"
            );
            Candidate::zero(id, priority, ScoringOutcome::TimedOut, "scoring timed out".into())
        }
    }
}
