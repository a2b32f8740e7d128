//! Agents that build user messages from named templates.
//!
//! `listen(name, Some(data))` looks up the template called `name` and renders
//! it with Tera against the JSON object `data`, so `{{ field }}`, `{{ a.b }}`
//! and filters all work.

use agentry_core::error::{Error, Result};
use agentry_core::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::Agent;
use crate::options::{AgentConfig, AgentOption};
use crate::template;

pub struct TemplatedAgent<A> {
    inner: A,
    templates: HashMap<String, String>,
}

impl<A: Agent> TemplatedAgent<A> {
    pub fn new<K, V>(inner: A, templates: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner,
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Render template `name` with `data`, which must be a JSON object.
    pub fn render(&self, name: &str, data: Option<&Value>) -> Result<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| Error::config(format!("template {name:?} not found")))?;
        let data = data.ok_or_else(|| Error::config(format!("template {name:?} needs data")))?;
        if !data.is_object() {
            return Err(Error::config(format!(
                "data for template {name:?} must be an object"
            )));
        }
        template::render(template, data)
    }
}

#[async_trait]
impl<A: Agent + Sync> Agent for TemplatedAgent<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn system(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.inner.system(text, data)
    }

    /// `name` is a template name; the rendered text becomes the user message.
    fn listen(&mut self, name: &str, data: Option<&Value>) -> Result<String> {
        let message = self.render(name, data)?;
        debug!(agent = %self.inner.name(), template = %name, "Rendered template");
        self.inner.listen(&message, None)
    }

    fn inject(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.inner.inject(text, data)
    }

    async fn respond(
        &mut self,
        cancel: &CancellationToken,
        options: Vec<AgentOption>,
    ) -> Result<String> {
        self.inner.respond(cancel, options).await
    }

    fn messages(&self) -> &[Message] {
        self.inner.messages()
    }

    fn append(&mut self, message: Message) {
        self.inner.append(message)
    }

    fn config(&self) -> &AgentConfig {
        self.inner.config()
    }
}
