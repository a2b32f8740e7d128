//! Agent configuration and per-call options.
//!
//! An agent is built from an ordered list of [`AgentOption`]s. `respond`
//! accepts more of them; those are applied to a clone of the agent's
//! [`AgentConfig`], so a single call can never change the agent's base settings.

use agentry_core::client::{ChatRequest, Client};
use agentry_core::event::{DomainEvent, EventBus};
use agentry_core::message::Message;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::memory::Memory;

/// Destination for streamed response deltas.
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

/// Everything an agent needs to issue one model call.
#[derive(Clone, Default)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub logit_bias: BTreeMap<String, i32>,
    pub user: Option<String>,

    /// Backend-specific parameters passed through untouched
    pub custom_params: BTreeMap<String, Value>,

    pub client: Option<Arc<dyn Client>>,

    /// When set, responses are streamed and every delta is written here
    pub output: Option<OutputSink>,

    /// History policy run before each call
    pub memory: Option<Arc<dyn Memory>>,

    pub events: Option<Arc<EventBus>>,
}

/// The deterministic, serializable part of an [`AgentConfig`].
///
/// Live handles (client, sink, event bus) are left out; the memory policy is
/// represented by its own fingerprint because it changes what gets sent.
#[derive(Debug, Serialize)]
pub struct ConfigFingerprint<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    logit_bias: &'a BTreeMap<String, i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    custom_params: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<Value>,
}

impl AgentConfig {
    /// Build a backend request carrying `messages`.
    pub fn to_request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop: self.stop.clone(),
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            logit_bias: self.logit_bias.clone(),
            user: self.user.clone(),
            custom_params: self.custom_params.clone(),
            stream: self.output.is_some(),
        }
    }

    pub fn fingerprint(&self) -> ConfigFingerprint<'_> {
        ConfigFingerprint {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop: &self.stop,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            logit_bias: &self.logit_bias,
            user: self.user.as_deref(),
            custom_params: &self.custom_params,
            memory: self.memory.as_ref().map(|m| m.fingerprint()),
        }
    }

    /// A copy with `options` applied in order.
    pub fn with_options(&self, options: impl IntoIterator<Item = AgentOption>) -> Self {
        let mut config = self.clone();
        for option in options {
            option.apply(&mut config);
        }
        config
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("stop", &self.stop)
            .field("presence_penalty", &self.presence_penalty)
            .field("frequency_penalty", &self.frequency_penalty)
            .field("logit_bias", &self.logit_bias)
            .field("user", &self.user)
            .field("custom_params", &self.custom_params)
            .field("client", &self.client.as_ref().map(|c| c.name()))
            .field("output", &self.output.is_some())
            .field("memory", &self.memory.as_ref().map(|m| m.name()))
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// A single configuration override. Later options win, field by field.
#[derive(Clone)]
pub enum AgentOption {
    Model(String),
    MaxTokens(u32),
    Temperature(f32),
    TopP(f32),
    Stop(Vec<String>),
    PresencePenalty(f32),
    FrequencyPenalty(f32),
    LogitBias(BTreeMap<String, i32>),
    User(String),
    /// Set one backend-specific parameter
    CustomParam(String, Value),
    Client(Arc<dyn Client>),
    /// Stream responses into this sink
    Output(OutputSink),
    /// Drop any configured sink and use plain completions
    NoStreaming,
    /// Install or (with `None`) remove the history policy
    Memory(Option<Arc<dyn Memory>>),
    Events(Arc<EventBus>),
    /// Replace the whole configuration
    Config(AgentConfig),
}

impl AgentOption {
    /// Stream into any writer.
    pub fn output(writer: impl Write + Send + 'static) -> Self {
        AgentOption::Output(Arc::new(Mutex::new(writer)))
    }

    pub fn memory(memory: impl Memory + 'static) -> Self {
        AgentOption::Memory(Some(Arc::new(memory)))
    }

    pub fn apply(self, config: &mut AgentConfig) {
        match self {
            AgentOption::Model(model) => config.model = model,
            AgentOption::MaxTokens(n) => config.max_tokens = Some(n),
            AgentOption::Temperature(t) => config.temperature = Some(t),
            AgentOption::TopP(p) => config.top_p = Some(p),
            AgentOption::Stop(stop) => config.stop = stop,
            AgentOption::PresencePenalty(p) => config.presence_penalty = Some(p),
            AgentOption::FrequencyPenalty(p) => config.frequency_penalty = Some(p),
            AgentOption::LogitBias(bias) => config.logit_bias = bias,
            AgentOption::User(user) => config.user = Some(user),
            AgentOption::CustomParam(key, value) => {
                config.custom_params.insert(key, value);
            }
            AgentOption::Client(client) => config.client = Some(client),
            AgentOption::Output(sink) => config.output = Some(sink),
            AgentOption::NoStreaming => config.output = None,
            AgentOption::Memory(memory) => config.memory = memory,
            AgentOption::Events(bus) => config.events = Some(bus),
            AgentOption::Config(replacement) => *config = replacement,
        }
    }
}

impl std::fmt::Debug for AgentOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentOption::Model(m) => f.debug_tuple("Model").field(m).finish(),
            AgentOption::MaxTokens(n) => f.debug_tuple("MaxTokens").field(n).finish(),
            AgentOption::Temperature(t) => f.debug_tuple("Temperature").field(t).finish(),
            AgentOption::TopP(p) => f.debug_tuple("TopP").field(p).finish(),
            AgentOption::Stop(s) => f.debug_tuple("Stop").field(s).finish(),
            AgentOption::PresencePenalty(p) => f.debug_tuple("PresencePenalty").field(p).finish(),
            AgentOption::FrequencyPenalty(p) => f.debug_tuple("FrequencyPenalty").field(p).finish(),
            AgentOption::LogitBias(b) => f.debug_tuple("LogitBias").field(b).finish(),
            AgentOption::User(u) => f.debug_tuple("User").field(u).finish(),
            AgentOption::CustomParam(k, v) => f.debug_tuple("CustomParam").field(k).field(v).finish(),
            AgentOption::Client(c) => f.debug_tuple("Client").field(&c.name()).finish(),
            AgentOption::Output(_) => f.write_str("Output(..)"),
            AgentOption::NoStreaming => f.write_str("NoStreaming"),
            AgentOption::Memory(m) => f
                .debug_tuple("Memory")
                .field(&m.as_ref().map(|m| m.name()))
                .finish(),
            AgentOption::Events(_) => f.write_str("Events(..)"),
            AgentOption::Config(c) => f.debug_tuple("Config").field(c).finish(),
        }
    }
}
