use console::{Style, style};

use crate::error::FailureKind;
use crate::metrics::MetricsSnapshot;
use crate::mode::{ModeConfig, ModeResult};
use crate::router::{RoutingDecision, ScoringOutcome};
use crate::session::ModeHistoryEntry;

pub struct Display;

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    /// One chat turn. `mode` is the config of the mode that handled it.
    pub fn print_result(&self, result: &ModeResult, mode: Option<&ModeConfig>) {
        let label = match mode {
            Some(config) => format!("{} {}", config.symbol, config.name),
            None => result
                .mode_id
                .as_ref()
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
        };

        if let Some(error) = &result.error {
            println!(
                "{} {}",
                style(format!("[{}]", label)).dim(),
                self.failure_style(error.kind).apply_to(&error.message)
            );
            return;
        }

        let summary = result
            .output
            .get("summary")
            .and_then(|v| v.as_str())
            .map_or_else(|| result.output.to_string(), str::to_string);
        println!(
            "{} {}  {}",
            style(format!("[{}]", label)).bold(),
            summary,
            style(format!(
                "({:.2}, {}ms)",
                result.confidence, result.processing_time_ms
            ))
            .dim()
        );

        for suggestion in &result.suggestions {
            println!("  {} {}", style("→").cyan(), suggestion);
        }
        if let Some(next) = &result.next_mode {
            println!("  {}", style(format!("next: {}", next)).dim());
        }
    }

    pub fn print_decision(&self, decision: &RoutingDecision) {
        let verdict = if decision.used_fallback {
            style(format!("{} (fallback)", decision.winner)).yellow().bold()
        } else {
            style(decision.winner.to_string()).green().bold()
        };
        println!("Winner: {}  confidence {:.2}", verdict, decision.confidence);
        println!();

        for candidate in &decision.ranked {
            let marker = if candidate.mode_id == decision.winner {
                style("●").green()
            } else {
                style("○").dim()
            };
            let outcome = match candidate.outcome {
                ScoringOutcome::Scored => String::new(),
                other => format!(" [{}]", other.as_str()),
            };
            println!(
                "  {} {:<14} {:.2}  p{}{}",
                marker,
                candidate.mode_id,
                candidate.confidence,
                candidate.priority,
                style(outcome).red()
            );
        }

        if !decision.reasoning.is_empty() {
            println!();
            for reason in &decision.reasoning {
                println!("  {}", style(reason).dim());
            }
        }
    }

    pub fn print_modes(&self, modes: &[(ModeConfig, bool)]) {
        if modes.is_empty() {
            println!("{}", style("No modes registered.").dim());
            return;
        }

        for (config, enabled) in modes {
            let name = if *enabled {
                style(&config.name).bold()
            } else {
                style(&config.name).dim().strikethrough()
            };
            let fallback = if config.fallback {
                style(" fallback").yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{} {:<14} {}  {}{}",
                config.symbol,
                config.id,
                name,
                style(format!(
                    "[{}] p{} max {}",
                    config.category, config.priority, config.max_concurrent_sessions
                ))
                .dim(),
                fallback
            );
            if !config.description.is_empty() {
                println!("    {}", style(&config.description).dim());
            }
        }
    }

    pub fn print_history(&self, history: &[ModeHistoryEntry]) {
        if history.is_empty() {
            println!("{}", style("No modes activated yet.").dim());
            return;
        }
        for entry in history {
            println!(
                "  {} {}",
                style(entry.timestamp.format("%H:%M:%S")).dim(),
                entry.mode_id
            );
        }
    }

    pub fn print_metrics(&self, snapshot: &MetricsSnapshot) {
        for (mode, stats) in &snapshot.modes {
            println!(
                "  {:<14} {} runs, {:.0}% ok, avg {:.2} conf, {:.0}ms",
                mode,
                stats.invocations,
                stats.success_rate() * 100.0,
                stats.avg_confidence,
                stats.avg_processing_ms
            );
        }
        println!("{}", style(snapshot.summary()).dim());
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", style("→").cyan(), message);
    }

    fn failure_style(&self, kind: FailureKind) -> Style {
        if kind.is_retryable() {
            Style::new().yellow()
        } else if kind == FailureKind::Unavailable {
            Style::new().dim()
        } else {
            Style::new().red().bold()
        }
    }
}
