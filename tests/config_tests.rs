use modeflow::config::EngineConfig;
use modeflow::engine::ModeEngineBuilder;
use modeflow::error::ModeError;
use modeflow::mode::ModeCategory;

#[test]
fn test_default_config() {
    let config = EngineConfig::default();

    assert!((config.router.activation_threshold - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.router.scoring_timeout_ms, 250);
    assert_eq!(config.session.history_limit, 100);
    assert_eq!(config.session.deactivation_timeout_ms, 5_000);
    assert_eq!(config.events.channel_capacity, 256);

    let ids: Vec<&str> = config.modes.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "general",
            "debugging",
            "analytical",
            "planning",
            "brainstorming",
            "negotiating",
            "reflecting"
        ]
    );
}

#[tokio::test]
async fn test_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::load(&dir.path().join("absent.toml"))
        .await
        .unwrap();
    assert_eq!(config.modes.len(), 7);
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modeflow.toml");

    let mut config = EngineConfig::default();
    config.router.activation_threshold = 0.65;
    config.session.history_limit = 10;
    config.modes[1].max_concurrent_sessions = 3;
    config.save(&path).await.unwrap();

    let loaded = EngineConfig::load(&path).await.unwrap();
    assert!((loaded.router.activation_threshold - 0.65).abs() < f64::EPSILON);
    assert_eq!(loaded.session.history_limit, 10);
    assert_eq!(loaded.modes[1].id, "debugging");
    assert_eq!(loaded.modes[1].max_concurrent_sessions, 3);
    assert_eq!(loaded.modes[1].handoffs, config.modes[1].handoffs);
}

#[tokio::test]
async fn test_load_custom_modes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modeflow.toml");
    tokio::fs::write(
        &path,
        r#"
[router]
activation_threshold = 0.4

[[modes]]
id = "chat"
name = "Chat"
fallback = true
priority = 1

[[modes]]
id = "review"
name = "Code Review"
category = "analytical"
keywords = ["review", "diff"]
triggers = ["look at this"]
suggestions = ["Walk through {topic} file by file"]

[modes.weights]
base = 0.05
keyword = 0.3

[[modes.handoffs]]
keywords = ["ship"]
to = "chat"
"#,
    )
    .await
    .unwrap();

    let config = EngineConfig::load(&path).await.unwrap();
    assert_eq!(config.modes.len(), 2);
    let review = &config.modes[1];
    assert_eq!(review.category, ModeCategory::Analytical);
    assert!((review.weights.keyword - 0.3).abs() < f64::EPSILON);
    assert!((review.weights.trigger - 0.3).abs() < f64::EPSILON);
    assert_eq!(review.handoffs[0].to, "chat");

    let engine = ModeEngineBuilder::from_config(config)
        .unwrap()
        .build()
        .unwrap();
    let decision = engine.route("s1", "please review this diff").await;
    assert_eq!(decision.winner.as_str(), "review");
    assert!((decision.confidence - 0.65).abs() < 1e-9);
}

#[tokio::test]
async fn test_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modeflow.toml");
    tokio::fs::write(
        &path,
        r#"
[router]
scoring_timeout_ms = 0

[[modes]]
id = "a"
fallback = true

[[modes]]
id = "b"
fallback = true
max_concurrent_sessions = 0
"#,
    )
    .await
    .unwrap();

    let err = EngineConfig::load(&path).await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ModeError::Config(_)));
    assert!(message.contains("Configuration validation failed"));
    assert!(message.contains("scoring_timeout_ms"));
    assert!(message.contains("max_concurrent_sessions"));
    assert!(message.contains("found 2"));
}

#[tokio::test]
async fn test_load_rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modeflow.toml");
    tokio::fs::write(&path, "[router\nactivation_threshold = ")
        .await
        .unwrap();

    let err = EngineConfig::load(&path).await.unwrap_err();
    assert!(matches!(err, ModeError::Toml(_)));
}
