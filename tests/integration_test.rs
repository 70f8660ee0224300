//! Integration tests for Switchyard
//!
//! These tests drive the public API end to end:
//! - Routing documents loaded from disk in mixed formats
//! - Task resolution through override documents
//! - Routed calls with scripted providers, cache replay and usage log
//! - Failover hook on an exhausted chain

use std::fs;
use std::path::Path;
use std::sync::Arc;

use switchyard_llm::config::ResolutionSource;
use switchyard_llm::providers::{MockProvider, MockReply};
use switchyard_llm::{
    CallResult, Error, FailoverHook, FailureSummary, Message, Options, ProviderKind,
    ProviderRegistry, Router, RouterSettings, RoutingConfig, UsageLog, UsageStatus,
};
use tempfile::TempDir;

fn write_documents(dir: &Path) {
    fs::write(
        dir.join("providers.yaml"),
        "azure:\n  api_key_env: SWITCHYARD_IT_AZURE_KEY\n  endpoint_env: SWITCHYARD_IT_AZURE_ENDPOINT\n\
         openrouter:\n  api_key_env: SWITCHYARD_IT_OPENROUTER_KEY\n\
         gemini:\n  api_key_env: SWITCHYARD_IT_GEMINI_KEY\n",
    )
    .unwrap();
    fs::write(
        dir.join("models.json"),
        r#"{
            "m1": {"provider": "azure", "model": "gpt-4o-mini",
                   "capabilities": {"max_output_tokens": 150}},
            "m2": {"provider": "openrouter", "model": "openai/gpt-4o-mini"},
            "m3": {"provider": "gemini", "model": "gemini-2.5-flash", "api_type": "generate_content"}
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("tiers.toml"),
        "standard = [\"m1\", \"m2\"]\npremium = [\"m2\", \"m1\"]\n",
    )
    .unwrap();
    fs::write(
        dir.join("tasks.yaml"),
        "summarize:\n  tier: premium\n  defaults:\n    temperature: 0.2\n",
    )
    .unwrap();
    fs::write(
        dir.join("fallback.yaml"),
        "retry_limit: 1\nbackoff_sec: 0.0\n",
    )
    .unwrap();
    fs::write(
        dir.join("task_overrides.yaml"),
        "translate:\n  models: [m3, m2]\n",
    )
    .unwrap();
    fs::write(dir.join("tier_overrides.yaml"), "premium: [m2]\n").unwrap();
}

struct Fixture {
    _dir: TempDir,
    router: Router,
    azure: Arc<MockProvider>,
    openrouter: Arc<MockProvider>,
    usage_log: UsageLog,
}

fn fixture(configure: impl FnOnce(&mut RouterSettings)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("config");
    fs::create_dir_all(&docs).unwrap();
    write_documents(&docs);

    let mut settings = RouterSettings::default();
    settings.config_dir = docs;
    settings.cache.dir = Some(dir.path().join("cache"));
    settings.usage_log.path = Some(dir.path().join("usage.jsonl"));
    configure(&mut settings);

    let config = RoutingConfig::load(&settings.config_dir).unwrap();
    let azure = Arc::new(MockProvider::new(ProviderKind::Azure));
    let openrouter = Arc::new(MockProvider::new(ProviderKind::OpenRouter));
    let mut providers = ProviderRegistry::new();
    providers.register(azure.clone());
    providers.register(openrouter.clone());

    let usage_log = UsageLog::at(dir.path().join("usage.jsonl"));
    Fixture {
        router: Router::new(config, settings, providers),
        _dir: dir,
        azure,
        openrouter,
        usage_log,
    }
}

fn messages() -> Vec<Message> {
    vec![Message::user("Summarize: the quick brown fox")]
}

// ============================================================================
// Documents and resolution
// ============================================================================

#[test]
fn test_shipped_documents_are_valid() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let config = RoutingConfig::load(&dir).unwrap();

    assert!(config.has_tier("standard"));
    let resolved = config
        .resolve("summarize_chunk", &Default::default())
        .unwrap();
    assert_eq!(resolved.tier, "fast");
    assert!(!resolved.models.is_empty());
}

#[test]
fn test_resolution_layers() {
    let f = fixture(|_| {});

    let unknown = f.router.resolve("anything").unwrap();
    assert_eq!(unknown.tier, "standard");
    assert_eq!(unknown.models, vec!["m1", "m2"]);
    assert_eq!(unknown.source, ResolutionSource::DefaultTier);

    let summarize = f.router.resolve("summarize").unwrap();
    assert_eq!(summarize.models, vec!["m2"]);
    assert_eq!(summarize.defaults.temperature, Some(0.2));

    let translate = f.router.resolve("translate").unwrap();
    assert_eq!(translate.models, vec!["m3", "m2"]);
    assert_eq!(translate.source, ResolutionSource::TaskOverride);
}

#[test]
fn test_forced_task_override_wins() {
    let f = fixture(|settings| {
        settings
            .force
            .tasks
            .insert("summarize".to_string(), vec!["m1".to_string()]);
    });

    let resolved = f.router.resolve("summarize").unwrap();
    assert_eq!(resolved.models, vec!["m1"]);
    assert_eq!(resolved.source, ResolutionSource::ForcedTask);
}

// ============================================================================
// Routed calls
// ============================================================================

#[tokio::test]
async fn test_call_then_replay_from_cache() {
    let f = fixture(|_| {});
    f.azure
        .push_replies("m1", [MockReply::Text("A fox.".to_string())]);

    let first = f
        .router
        .call("anything", &messages(), &Options::new().with_max_tokens(64))
        .await
        .unwrap();
    let second = f
        .router
        .call_with_details("anything", &messages(), &Options::new().with_max_tokens(512))
        .await
        .unwrap();

    assert_eq!(first, "A fox.");
    assert_eq!(second.content, first);
    assert!(second.cache.unwrap().hit);
    assert_eq!(f.azure.call_count("m1"), 1);

    let records = f.usage_log.read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].chain, vec!["m1"]);
}

#[tokio::test]
async fn test_gemini_candidate_without_client_is_skipped() {
    let f = fixture(|_| {});

    let result = f
        .router
        .call_with_details("translate", &messages(), &Options::new())
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderKind::OpenRouter);
    assert_eq!(result.chain, vec!["m2"]);
    assert_eq!(f.openrouter.call_count("m2"), 1);
}

#[tokio::test]
async fn test_exhausted_chain_without_hook() {
    let f = fixture(|_| {});
    f.azure.push_replies("m1", vec![MockReply::Status(503); 2]);
    f.openrouter.push_replies("m2", vec![MockReply::Status(503); 2]);

    let err = f
        .router
        .call("anything", &messages(), &Options::new())
        .await
        .unwrap_err();

    match err {
        Error::ChainExhausted {
            tried, last_status, ..
        } => {
            assert_eq!(tried, vec!["m1", "m2"]);
            assert_eq!(last_status, Some(503));
        }
        other => panic!("unexpected error: {other}"),
    }

    let records = f.usage_log.read_all().unwrap();
    assert_eq!(records.last().unwrap().status, UsageStatus::Fail);
}

struct CannedReply;

#[async_trait::async_trait]
impl FailoverHook for CannedReply {
    async fn on_exhausted(
        &self,
        task: &str,
        _messages: &[Message],
        _options: &Options,
        summary: &FailureSummary,
    ) -> Option<CallResult> {
        Some(CallResult {
            content: format!("{task} unavailable after {}", summary.tried.join(",")),
            provider: ProviderKind::Gemini,
            model_key: "canned".to_string(),
            model: "canned".to_string(),
            usage: None,
            request_id: None,
            chain: summary.tried.clone(),
            latency_ms: 0,
            finish_reason: None,
            retry: None,
            cache: None,
            routing: None,
        })
    }
}

#[tokio::test]
async fn test_exhausted_chain_uses_hook() {
    let f = fixture(|_| {});
    f.openrouter
        .push_replies("m2", [MockReply::Status(400)]);
    let router = f.router.with_failover(Arc::new(CannedReply));

    let content = router
        .call("summarize", &messages(), &Options::new())
        .await
        .unwrap();
    assert_eq!(content, "summarize unavailable after m2");
}
