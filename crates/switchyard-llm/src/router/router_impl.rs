//! Router implementation
//!
//! This module contains the `Router` struct that resolves tasks to candidate
//! chains and walks them with truncation and transient-error retries.

use super::decision::{classify, decide, AttemptState, NextAction, Outcome, DEFAULT_MAX_TOKENS};
use super::failover::{FailoverHook, FailureSummary};
use super::split::{apply_split, RoutingDecision, RoutingKey};
use crate::cache::{CacheEntry, ContentCache, TaskId};
use crate::completion::{
    CacheInfo, CallResult, Options, ProviderResponse, RetryInfo, TruncationRetry,
};
use crate::config::{ModelConfig, ResolvedTask, RouterSettings, RoutingConfig};
use crate::error::{Error, ErrorClass, Result};
use crate::message::Message;
use crate::providers::{InvocationRequest, ProviderClient, ProviderRegistry};
use crate::sanitize::sanitize;
use crate::telemetry::{UsageLog, UsageRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Task router with failover, response cache and usage log
pub struct Router {
    config: Arc<RoutingConfig>,
    settings: RouterSettings,
    providers: ProviderRegistry,
    cache: ContentCache,
    usage_log: UsageLog,
    failover: Option<Arc<dyn FailoverHook>>,
}

/// Where the candidate loop ended
enum ChainEnd {
    Done(CallResult),
    Exhausted,
}

/// Failure bookkeeping across candidates
#[derive(Default)]
struct Failures {
    tried: Vec<String>,
    last_error: Option<Error>,
    last_status: Option<u16>,
}

impl Failures {
    fn record(&mut self, error: Error) {
        if let Some(status) = error.status() {
            self.last_status = Some(status);
        }
        self.last_error = Some(error);
    }

    /// Record a skipped candidate without masking an earlier provider error
    fn skip(&mut self, error: Error) {
        if self.last_error.is_none() {
            self.last_error = Some(error);
        }
    }
}

impl Router {
    /// Create a router from loaded documents, settings and provider clients
    #[must_use]
    pub fn new(config: RoutingConfig, settings: RouterSettings, providers: ProviderRegistry) -> Self {
        Self {
            config: Arc::new(config),
            cache: ContentCache::new(&settings.cache),
            usage_log: UsageLog::new(&settings.usage_log),
            settings,
            providers,
            failover: None,
        }
    }

    /// Load documents from `settings.config_dir` and build clients from the environment
    pub fn from_settings(settings: RouterSettings) -> Result<Self> {
        let config = RoutingConfig::load(&settings.config_dir)?;
        let providers = ProviderRegistry::from_env(&config.providers)?;
        info!(
            providers = ?providers.available(),
            "Router initialized"
        );
        Ok(Self::new(config, settings, providers))
    }

    /// Install a failover hook
    #[must_use]
    pub fn with_failover(mut self, hook: Arc<dyn FailoverHook>) -> Self {
        self.failover = Some(hook);
        self
    }

    /// Replace the response cache
    #[must_use]
    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the usage log
    #[must_use]
    pub fn with_usage_log(mut self, usage_log: UsageLog) -> Self {
        self.usage_log = usage_log;
        self
    }

    /// Loaded routing documents
    #[must_use]
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Process settings
    #[must_use]
    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Provider clients
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Response cache
    #[must_use]
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Resolve a task to its candidate chain
    pub fn resolve(&self, task: &str) -> Result<ResolvedTask> {
        self.config.resolve(task, &self.settings.force)
    }

    /// Route a call and return the content
    pub async fn call(&self, task: &str, messages: &[Message], options: &Options) -> Result<String> {
        Ok(self.call_with_details(task, messages, options).await?.content)
    }

    /// Route a call and return the content with provenance
    #[instrument(skip(self, messages, options), fields(message_count = messages.len()))]
    pub async fn call_with_details(
        &self,
        task: &str,
        messages: &[Message],
        options: &Options,
    ) -> Result<CallResult> {
        let started = Instant::now();
        let resolved = self.resolve(task)?;
        let options = options.merged_over(&resolved.defaults);

        let task_id = match TaskId::compute(task, messages, &options) {
            Ok(task_id) => Some(task_id),
            Err(e) => {
                warn!(error = %e, "Failed to compute task id, cache bypassed");
                None
            }
        };

        let (candidates, routing) =
            self.order_candidates(&resolved, task, messages.len(), &options, task_id.as_ref());

        debug!(
            tier = %resolved.tier,
            source = ?resolved.source,
            candidates = ?candidates,
            "Resolved candidate chain"
        );

        if let Some(task_id) = &task_id {
            if let Some(entry) = self.cache.lookup(task, task_id) {
                let path = self.cache.path_for(task_id);
                let result = cached_result(entry, task_id.clone(), path, routing, started);
                info!(model_key = %result.model_key, task_id = %task_id, "Cache hit");
                self.usage_log.record(&UsageRecord::success(task, &result));
                return Ok(result);
            }
        }

        let mut failures = Failures::default();
        let end = self
            .run_chain(task, messages, &options, &candidates, &mut failures)
            .await;

        match end {
            ChainEnd::Done(mut result) => {
                result.latency_ms = elapsed_ms(started);
                result.routing = routing;
                result.cache = self.store_result(task, task_id, &result);

                info!(
                    provider = %result.provider,
                    model_key = %result.model_key,
                    latency_ms = result.latency_ms,
                    attempts = result.chain.len(),
                    "Call succeeded"
                );
                self.usage_log.record(&UsageRecord::success(task, &result));
                Ok(result)
            }
            ChainEnd::Exhausted => {
                self.exhausted(task, messages, &options, failures, routing, task_id, started)
                    .await
            }
        }
    }

    fn order_candidates(
        &self,
        resolved: &ResolvedTask,
        task: &str,
        message_count: usize,
        options: &Options,
        task_id: Option<&TaskId>,
    ) -> (Vec<String>, Option<RoutingDecision>) {
        let Some(ratio) = self.settings.split.ratio else {
            return (resolved.models.clone(), None);
        };

        let key = RoutingKey::choose(
            options.routing_key.as_deref(),
            self.settings.split.key.as_deref(),
            task_id,
            task,
            message_count,
        );
        let (ordered, decision) = apply_split(
            &resolved.models,
            |key| self.config.model(key).map(|m| m.provider),
            ratio,
            self.settings.split.provider,
            &key,
        );

        debug!(
            bucket = decision.bucket,
            ratio = decision.ratio,
            preferred = %decision.preferred,
            preferred_first = decision.preferred_first,
            "Applied traffic split"
        );
        (ordered, Some(decision))
    }

    async fn run_chain(
        &self,
        task: &str,
        messages: &[Message],
        options: &Options,
        candidates: &[String],
        failures: &mut Failures,
    ) -> ChainEnd {
        let policy = &self.config.fallback;
        let truncation = &self.settings.truncation;
        let timeout = Duration::from_secs(
            options
                .timeout_secs
                .unwrap_or(self.settings.request_timeout_secs),
        );
        let mut state = AttemptState::default();

        for model_key in candidates {
            let Some(model) = self.config.model(model_key) else {
                warn!(model_key = %model_key, "Candidate missing from model registry");
                continue;
            };
            let Some(client) = self.providers.get(model.provider) else {
                debug!(
                    model_key = %model_key,
                    provider = %model.provider,
                    "Skipping candidate: provider unavailable"
                );
                failures.skip(Error::CredentialUnavailable(model.provider));
                continue;
            };

            failures.tried.push(model_key.clone());
            let mut params = sanitize(model, options);
            state.start_candidate(params.max_tokens, model.capabilities.max_output_tokens);
            let mut retry = RetryInfo::default();

            loop {
                state.total_attempts += 1;
                debug!(
                    task = %task,
                    model_key = %model_key,
                    attempt = state.total_attempts,
                    max_tokens = ?params.max_tokens,
                    "Invoking candidate"
                );

                let request = InvocationRequest {
                    model_key,
                    model,
                    messages,
                    params: &params,
                    timeout,
                };
                let result = invoke_with_timeout(client.as_ref(), &request).await;
                let outcome = Outcome::of(&result);

                match decide(outcome, policy, truncation, &state) {
                    NextAction::Accept | NextAction::AcceptTruncated => {
                        let Ok(response) = result else {
                            // Accept is only decided for Ok results
                            break;
                        };
                        if response.is_truncated() {
                            warn!(model_key = %model_key, "Returning truncated output");
                        }
                        return ChainEnd::Done(success_result(
                            model_key,
                            model,
                            response,
                            failures.tried.clone(),
                            retry,
                        ));
                    }
                    NextAction::RetrySame { delay } => {
                        if let Err(e) = result {
                            warn!(
                                model_key = %model_key,
                                error = %e,
                                retry = state.candidate_retries + 1,
                                delay_ms = delay.as_millis() as u64,
                                "Transient failure, retrying"
                            );
                            failures.record(e);
                        }
                        tokio::time::sleep(delay).await;
                        state.total_wait = state.total_wait.saturating_add(delay);
                        state.candidate_retries += 1;
                        retry.transient_retries += 1;
                    }
                    NextAction::Escalate { max_tokens } => {
                        let from = state
                            .max_tokens
                            .or(state.model_cap)
                            .unwrap_or(DEFAULT_MAX_TOKENS);
                        info!(
                            model_key = %model_key,
                            from_max_tokens = from,
                            to_max_tokens = max_tokens,
                            "Truncated output, retrying with a larger cap"
                        );
                        retry.truncation = Some(TruncationRetry {
                            from_max_tokens: from,
                            to_max_tokens: max_tokens,
                        });
                        params = params.with_max_tokens(max_tokens);
                        state.escalated = true;
                        state.max_tokens = Some(max_tokens);
                    }
                    NextAction::Advance => {
                        let error = candidate_error(result, model_key, &state);
                        warn!(model_key = %model_key, error = %error, "Candidate failed, advancing");
                        failures.record(error);
                        break;
                    }
                    NextAction::StopChain => {
                        let error = candidate_error(result, model_key, &state);
                        warn!(model_key = %model_key, error = %error, "Stopping candidate chain");
                        failures.record(error);
                        return ChainEnd::Exhausted;
                    }
                }
            }
        }

        ChainEnd::Exhausted
    }

    fn store_result(&self, task: &str, task_id: Option<TaskId>, result: &CallResult) -> Option<CacheInfo> {
        let task_id = task_id?;
        if !self.cache.can_read(task) && !self.cache.can_write(task) {
            return None;
        }

        let truncated = result
            .finish_reason
            .as_ref()
            .is_some_and(|reason| reason.is_truncated());
        let path = if truncated {
            None
        } else {
            self.cache
                .store(CacheEntry::from_result(task_id.clone(), task, result))
        };

        Some(CacheInfo {
            task_id: task_id.to_string(),
            hit: false,
            path,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn exhausted(
        &self,
        task: &str,
        messages: &[Message],
        options: &Options,
        failures: Failures,
        routing: Option<RoutingDecision>,
        task_id: Option<TaskId>,
        started: Instant,
    ) -> Result<CallResult> {
        let error_class = failures
            .last_error
            .as_ref()
            .map_or(ErrorClass::ChainExhausted, |e| classify(e, &self.config.fallback));
        let last_error = failures.last_error.as_ref().map(ToString::to_string);

        warn!(
            task = %task,
            tried = ?failures.tried,
            error_class = ?error_class,
            last_status = ?failures.last_status,
            "All candidates failed"
        );

        let cache = task_id.map(|id| CacheInfo {
            task_id: id.to_string(),
            hit: false,
            path: None,
        });
        self.usage_log.record(
            &UsageRecord::failure(task, failures.tried.clone(), elapsed_ms(started))
                .with_error(last_error.clone(), error_class, failures.last_status)
                .with_routing(routing)
                .with_cache(cache),
        );

        if let Some(hook) = &self.failover {
            let summary = FailureSummary {
                task: task.to_string(),
                tried: failures.tried.clone(),
                last_error: last_error.clone(),
                error_class,
                last_status: failures.last_status,
            };
            if let Some(result) = hook.on_exhausted(task, messages, options, &summary).await {
                info!(task = %task, "Failover hook supplied a result");
                return Ok(result);
            }
        }

        Err(Error::ChainExhausted {
            task: task.to_string(),
            tried: failures.tried,
            last_error,
            last_status: failures.last_status,
        })
    }
}

async fn invoke_with_timeout(
    client: &dyn ProviderClient,
    request: &InvocationRequest<'_>,
) -> Result<ProviderResponse> {
    match tokio::time::timeout(request.timeout, client.invoke(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(request.timeout.as_millis() as u64)),
    }
}

/// Error recorded for a candidate that produced no usable output
fn candidate_error(
    result: Result<ProviderResponse>,
    model_key: &str,
    state: &AttemptState,
) -> Error {
    match result {
        Err(e) => e,
        Ok(response) if response.is_truncated() && !response.content.trim().is_empty() => {
            Error::Truncated {
                model_key: model_key.to_string(),
                max_tokens: state.max_tokens.unwrap_or_default(),
            }
        }
        Ok(_) => Error::EmptyContent(model_key.to_string()),
    }
}

fn success_result(
    model_key: &str,
    model: &ModelConfig,
    response: ProviderResponse,
    chain: Vec<String>,
    retry: RetryInfo,
) -> CallResult {
    CallResult {
        content: response.content,
        provider: model.provider,
        model_key: model_key.to_string(),
        model: if response.model.is_empty() {
            model.model.clone()
        } else {
            response.model
        },
        usage: response.usage,
        request_id: response.request_id,
        chain,
        latency_ms: 0,
        finish_reason: response.finish_reason,
        retry: (!retry.is_empty()).then_some(retry),
        cache: None,
        routing: None,
    }
}

fn cached_result(
    entry: CacheEntry,
    task_id: TaskId,
    path: std::path::PathBuf,
    routing: Option<RoutingDecision>,
    started: Instant,
) -> CallResult {
    CallResult {
        content: entry.content,
        provider: entry.provenance.provider,
        model_key: entry.provenance.model_key,
        model: entry.provenance.model,
        usage: entry.usage,
        request_id: None,
        chain: Vec::new(),
        latency_ms: elapsed_ms(started),
        finish_reason: entry.provenance.finish_reason,
        retry: entry.provenance.retry,
        cache: Some(CacheInfo {
            task_id: task_id.to_string(),
            hit: true,
            path: Some(path),
        }),
        routing,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
