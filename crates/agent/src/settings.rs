//! Wiring from [`AppConfig`] to agent options.
//!
//! The configuration file only describes plain settings. The backend client,
//! tools and event bus are live objects and are supplied by the embedding
//! program.

use agentry_cache::InMemoryCache;
use agentry_config::{AppConfig, MemoryKind, MemorySettings};
use agentry_core::cache::Cache;
use agentry_core::error::{Error, Result};
use agentry_core::tool::Tool;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::memory::{
    BufferMemory, Memory, NaiveTokenCounter, SummarizerMemory, TokenBufferMemory,
};
use crate::options::AgentOption;
use crate::react::ReAct;

/// Options for an agent configured by `config`, in application order.
///
/// Streaming writes deltas to stdout.
pub fn agent_options(config: &AppConfig) -> Result<Vec<AgentOption>> {
    config
        .validate()
        .map_err(|e| Error::config(e.to_string()))?;

    let agent = &config.agent;
    let mut options = vec![AgentOption::Model(agent.model.clone())];

    if let Some(n) = agent.max_tokens {
        options.push(AgentOption::MaxTokens(n));
    }
    if let Some(t) = agent.temperature {
        options.push(AgentOption::Temperature(t));
    }
    if let Some(p) = agent.top_p {
        options.push(AgentOption::TopP(p));
    }
    if !agent.stop.is_empty() {
        options.push(AgentOption::Stop(agent.stop.clone()));
    }
    if let Some(p) = agent.presence_penalty {
        options.push(AgentOption::PresencePenalty(p));
    }
    if let Some(p) = agent.frequency_penalty {
        options.push(AgentOption::FrequencyPenalty(p));
    }
    if let Some(user) = &agent.user {
        options.push(AgentOption::User(user.clone()));
    }
    if agent.stream {
        options.push(AgentOption::output(std::io::stdout()));
    }
    if let Some(memory) = memory_policy(&config.memory)? {
        options.push(AgentOption::Memory(Some(memory)));
    }

    debug!(
        model = %agent.model,
        memory = config.memory.kind.as_str(),
        stream = agent.stream,
        options = options.len(),
        "Built agent options from configuration"
    );
    Ok(options)
}

/// The history policy `settings` describe, if any.
pub fn memory_policy(settings: &MemorySettings) -> Result<Option<Arc<dyn Memory>>> {
    let policy: Arc<dyn Memory> = match settings.kind {
        MemoryKind::None => return Ok(None),
        MemoryKind::Buffer => Arc::new(BufferMemory::new(settings.size)),
        MemoryKind::TokenBuffer => {
            Arc::new(TokenBufferMemory::new(settings.max_tokens, counter(settings)?))
        }
        MemoryKind::Summarizer => Arc::new(
            SummarizerMemory::new(settings.max_tokens, counter(settings)?, Vec::new())
                .with_summary_max_tokens(settings.summary_max_tokens),
        ),
    };
    Ok(Some(policy))
}

fn counter(settings: &MemorySettings) -> Result<NaiveTokenCounter> {
    match &settings.tokenizer_model {
        Some(model) => Ok(NaiveTokenCounter::for_model(model)?),
        None => Ok(NaiveTokenCounter::new(settings.token_ratio)),
    }
}

/// A shared response cache when caching is enabled.
pub fn response_cache(config: &AppConfig) -> Option<Arc<dyn Cache>> {
    config
        .cache
        .enabled
        .then(|| Arc::new(InMemoryCache::new()) as Arc<dyn Cache>)
}

/// A reason-act loop around `agent`, honouring `[react]`.
pub fn react_from<A: Agent>(
    config: &AppConfig,
    agent: A,
    tools: impl IntoIterator<Item = Arc<dyn Tool>>,
) -> ReAct<A> {
    let react = ReAct::new(agent, tools);
    match config.react.max_iterations {
        Some(max) => react.with_max_iterations(max),
        None => react,
    }
}
