//! Built-in mode tables.

use super::keyword::{Handoff, ModeDefinition, ScoringWeights};
use super::types::ModeCategory;

pub const GENERAL_MODE: &str = "general";

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn handoff(keywords: &[&str], to: &str) -> Handoff {
    Handoff {
        keywords: words(keywords),
        to: to.to_string(),
    }
}

pub fn general() -> ModeDefinition {
    ModeDefinition {
        id: GENERAL_MODE.into(),
        name: "General".into(),
        symbol: "💬".into(),
        description: "Default conversational mode used when nothing else fits".into(),
        category: ModeCategory::General,
        priority: 1,
        fallback: true,
        weights: ScoringWeights {
            base: 0.3,
            keyword: 0.0,
            trigger: 0.0,
            continuity: 0.0,
        },
        suggestions: words(&["Tell me more about what you want to achieve"]),
        handoffs: vec![
            handoff(&["bug", "error", "crash"], "debugging"),
            handoff(&["plan", "roadmap"], "planning"),
        ],
        ..Default::default()
    }
}

pub fn debugging() -> ModeDefinition {
    ModeDefinition {
        id: "debugging".into(),
        name: "Debugging".into(),
        symbol: "🐛".into(),
        description: "Diagnose failures and narrow down root causes".into(),
        category: ModeCategory::Diagnostic,
        keywords: words(&[
            "fix", "crash", "bug", "error", "debug", "broken", "fails", "failing", "exception",
            "panic", "segfault",
        ]),
        triggers: words(&["stack trace", "doesn't work", "not working"]),
        priority: 10,
        weights: ScoringWeights {
            base: 0.2,
            ..Default::default()
        },
        suggestions: words(&[
            "Reproduce {topic} with the smallest possible input",
            "Check recent changes around {topic}",
        ]),
        handoffs: vec![handoff(&["why", "cause"], "analytical")],
        ..Default::default()
    }
}

pub fn analytical() -> ModeDefinition {
    ModeDefinition {
        id: "analytical".into(),
        name: "Analytical".into(),
        symbol: "🧠".into(),
        description: "Break problems into parts and reason about them".into(),
        category: ModeCategory::Analytical,
        keywords: words(&[
            "analyze", "analyse", "compare", "evaluate", "why", "tradeoff", "tradeoffs",
            "assess", "reason", "logic",
        ]),
        triggers: words(&["pros and cons", "break down", "think through"]),
        priority: 20,
        suggestions: words(&["List the assumptions behind {topic}"]),
        handoffs: vec![handoff(&["decide", "next steps"], "planning")],
        ..Default::default()
    }
}

pub fn planning() -> ModeDefinition {
    ModeDefinition {
        id: "planning".into(),
        name: "Planning".into(),
        symbol: "📋".into(),
        description: "Turn goals into ordered steps".into(),
        category: ModeCategory::Planning,
        keywords: words(&[
            "plan", "roadmap", "schedule", "milestone", "milestones", "steps", "organize",
            "prioritize", "deadline",
        ]),
        triggers: words(&["how should i", "next steps", "step by step"]),
        priority: 30,
        suggestions: words(&["Define the first milestone for {topic}"]),
        handoffs: vec![handoff(&["ideas", "options"], "brainstorming")],
        ..Default::default()
    }
}

pub fn brainstorming() -> ModeDefinition {
    ModeDefinition {
        id: "brainstorming".into(),
        name: "Brainstorming".into(),
        symbol: "💡".into(),
        description: "Generate many options before judging them".into(),
        category: ModeCategory::Creative,
        keywords: words(&[
            "ideas", "idea", "brainstorm", "creative", "imagine", "alternatives", "options",
            "invent",
        ]),
        triggers: words(&["what if", "come up with"]),
        priority: 40,
        suggestions: words(&["Write down five unusual angles on {topic}"]),
        handoffs: vec![handoff(&["choose", "pick", "best"], "analytical")],
        ..Default::default()
    }
}

pub fn negotiating() -> ModeDefinition {
    ModeDefinition {
        id: "negotiating".into(),
        name: "Negotiating".into(),
        symbol: "🤝".into(),
        description: "Prepare positions and find agreement".into(),
        category: ModeCategory::Social,
        keywords: words(&[
            "negotiate", "negotiation", "deal", "offer", "salary", "contract", "agreement",
            "compromise", "counteroffer",
        ]),
        triggers: words(&["meet in the middle", "best alternative"]),
        priority: 50,
        suggestions: words(&["Identify your walk-away point for {topic}"]),
        handoffs: vec![handoff(&["plan", "prepare"], "planning")],
        ..Default::default()
    }
}

pub fn reflecting() -> ModeDefinition {
    ModeDefinition {
        id: "reflecting".into(),
        name: "Reflecting".into(),
        symbol: "🪞".into(),
        description: "Review what happened and draw lessons".into(),
        category: ModeCategory::Reflective,
        keywords: words(&[
            "reflect", "retrospective", "retro", "learned", "lessons", "feel", "journal",
            "review",
        ]),
        triggers: words(&["looking back", "what went well", "what went wrong"]),
        priority: 60,
        suggestions: words(&["Note one thing to keep and one to change about {topic}"]),
        handoffs: vec![handoff(&["next", "improve"], "planning")],
        ..Default::default()
    }
}

/// The default mode set, fallback first.
pub fn builtin_definitions() -> Vec<ModeDefinition> {
    vec![
        general(),
        debugging(),
        analytical(),
        planning(),
        brainstorming(),
        negotiating(),
        reflecting(),
    ]
}
