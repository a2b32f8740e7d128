//! Token-budget window that summarizes what it drops.
//!
//! When the history no longer fits, the messages falling out of the window are
//! handed to a short-lived summarizer agent together with the previous
//! summary, and the new summary is prepended as a system message:
//!
//! ```text
//! SUMMARY:
//! "<json string>"
//! END SUMMARY
//! ```
//!
//! The next time the window moves, that message is recognized, decoded and
//! folded into the fresh summary.

use agentry_core::error::{ParseError, Result};
use agentry_core::message::Message;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Memory;
use super::token::TokenCounter;
use super::token_buffer::partition_by_token_limit;
use crate::agent::{Agent, BaseAgent};
use crate::options::{AgentConfig, AgentOption};
use crate::template;

const SUMMARY_START: &str = "SUMMARY:";
const SUMMARY_END: &str = "END SUMMARY";

/// What a summary template gets to see.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SummaryInput<'a> {
    /// The messages being dropped from the window, oldest first.
    pub messages: &'a [Message],
    /// The summary carried so far; empty on the first pass.
    pub previous_summary: &'a str,
}

pub type SummaryTemplate = Arc<dyn Fn(&SummaryInput<'_>) -> Result<String> + Send + Sync>;

pub struct SummarizerMemory {
    max_tokens: usize,
    counter: Arc<dyn TokenCounter>,
    template: SummaryTemplate,
    summary_max_tokens: u32,
    options: Vec<AgentOption>,
}

impl SummarizerMemory {
    pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 1000;

    /// `options` are applied to the summarizer agent on top of the caller's
    /// configuration, e.g. to summarize with a cheaper model.
    pub fn new(
        max_tokens: usize,
        counter: impl TokenCounter + 'static,
        options: Vec<AgentOption>,
    ) -> Self {
        Self {
            max_tokens,
            counter: Arc::new(counter),
            template: Arc::new(default_template),
            summary_max_tokens: Self::DEFAULT_SUMMARY_MAX_TOKENS,
            options,
        }
    }

    pub fn with_template(
        mut self,
        template: impl Fn(&SummaryInput<'_>) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.template = Arc::new(template);
        self
    }

    /// Output cap for the summarizer agent.
    pub fn with_summary_max_tokens(mut self, max_tokens: u32) -> Self {
        self.summary_max_tokens = max_tokens;
        self
    }

    async fn summarize(
        &self,
        cancel: &CancellationToken,
        config: &AgentConfig,
        input: &SummaryInput<'_>,
    ) -> Result<String> {
        let mut options = Vec::with_capacity(self.options.len() + 4);
        options.push(AgentOption::Config(config.clone()));
        options.extend(self.options.iter().cloned());
        options.push(AgentOption::Memory(None));
        options.push(AgentOption::NoStreaming);
        options.push(AgentOption::MaxTokens(self.summary_max_tokens));

        let mut summarizer = BaseAgent::new("summarizer", options);
        let prompt = (self.template)(input)?;
        summarizer.listen(&prompt, None)?;
        summarizer.respond(cancel, Vec::new()).await
    }
}

#[async_trait]
impl Memory for SummarizerMemory {
    fn name(&self) -> &str {
        "summarizer"
    }

    /// A custom template is a closure and is not part of the fingerprint.
    fn fingerprint(&self) -> Value {
        let overrides = AgentConfig::default().with_options(self.options.iter().cloned());
        json!({
            "policy": self.name(),
            "max_tokens": self.max_tokens,
            "summary_max_tokens": self.summary_max_tokens,
            "counter": self.counter.fingerprint(),
            "options": serde_json::to_value(overrides.fingerprint()).unwrap_or(Value::Null),
        })
    }

    async fn apply(
        &self,
        cancel: &CancellationToken,
        config: &AgentConfig,
        messages: &[Message],
    ) -> Result<Vec<Message>> {
        let (mut retained, dropped) =
            partition_by_token_limit(messages, self.max_tokens, self.counter.as_ref())?;

        if dropped.is_empty() {
            trace!("Summarizer: nothing dropped");
            return Ok(messages.to_vec());
        }

        let mut previous_summary = String::new();
        if let Some(first) = retained.first()
            && first.is_system()
            && first.content.contains(SUMMARY_START)
        {
            previous_summary = parse_summary(&first.content)?;
            // A fresher summary replaces it below
            retained.remove(0);
        }

        let input = SummaryInput {
            messages: &dropped,
            previous_summary: &previous_summary,
        };
        let summary = self.summarize(cancel, config, &input).await?;

        debug!(
            dropped = dropped.len(),
            retained = retained.len(),
            summary_chars = summary.len(),
            "Summarized dropped messages"
        );
        let mut rewritten = Vec::with_capacity(retained.len() + 1);
        rewritten.push(Message::system(summary_message(&summary)?));
        rewritten.extend(retained);
        Ok(rewritten)
    }
}

impl std::fmt::Debug for SummarizerMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerMemory")
            .field("max_tokens", &self.max_tokens)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Render the system message that carries `summary`.
pub fn summary_message(summary: &str) -> Result<String> {
    let encoded = serde_json::to_string(summary)?;
    Ok(format!(
        "\nYou are the assistant. Part of this conversation has been truncated. \
         Here is the summary of the conversation so far:\n\n\
         {SUMMARY_START}\n{encoded}\n{SUMMARY_END}\n"
    ))
}

/// Extract the summary embedded in a system message.
///
/// Returns an empty string when the message carries no summary.
pub fn parse_summary(content: &str) -> std::result::Result<String, ParseError> {
    let Some(start) = content.find(SUMMARY_START) else {
        return Ok(String::new());
    };
    let body_start = start + SUMMARY_START.len();
    let end = content
        .rfind(SUMMARY_END)
        .filter(|&end| end >= body_start)
        .ok_or_else(|| ParseError::MalformedSummary(format!("no {SUMMARY_END} marker")))?;

    serde_json::from_str::<String>(content[body_start..end].trim())
        .map_err(|e| ParseError::MalformedSummary(e.to_string()))
}

const DEFAULT_TEMPLATE: &str = "
As the assistant, your role is to maintain an ongoing, concise summary of the \
entire conversation so far. Fold in the key actions, requests and responses from both \
the previous summary and the new conversation lines.

Pay particular attention to what the user does: a change in their requests, instructions \
or themes matters as much as the content itself.

PREVIOUS SUMMARY: {{ previous_summary | json_encode() }}
END PREVIOUS SUMMARY

NEW LINES:
{% for message in messages %}
{{ message.role }}: {{ message.content | json_encode() }}
{% endfor %}END NEW LINES

Do not simply append to the previous summary. Integrate the new lines into it, keeping \
track of what the user asked for and how the assistant responded, and keep the result \
short.
";

/// Asks for an updated running summary that folds `messages` into the previous one.
pub fn default_template(input: &SummaryInput<'_>) -> Result<String> {
    template::render(DEFAULT_TEMPLATE, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::invariants::assert_retention_invariants;
    use crate::test_helpers::ScriptedClient;
    use agentry_core::error::{BackendError, CountError, Error};
    use agentry_core::message::Role;

    fn char_len(s: &str) -> std::result::Result<usize, CountError> {
        Ok(s.len())
    }

    fn config_with(client: Arc<ScriptedClient>) -> AgentConfig {
        AgentConfig::default().with_options([
            AgentOption::Model("gpt-4".into()),
            AgentOption::Temperature(0.7),
            AgentOption::Client(client),
        ])
    }

    #[test]
    fn summary_marker_roundtrip() {
        let text = "They asked about \"quotes\"\nand newlines. END SUMMARY inside.";
        let message = summary_message(text).unwrap();
        assert!(message.contains("SUMMARY:\n\""));
        assert_eq!(parse_summary(&message).unwrap(), text);
    }

    #[test]
    fn parse_summary_without_marker_is_empty() {
        assert_eq!(parse_summary("You are a helpful assistant.").unwrap(), "");
    }

    #[test]
    fn parse_summary_rejects_broken_payloads() {
        assert!(matches!(
            parse_summary("SUMMARY:\n\"never closed\"\n"),
            Err(ParseError::MalformedSummary(_))
        ));
        assert!(matches!(
            parse_summary("SUMMARY:\nnot json\nEND SUMMARY"),
            Err(ParseError::MalformedSummary(_))
        ));
    }

    #[test]
    fn default_template_quotes_content() {
        let messages = vec![Message::user("say \"hi\""), Message::assistant("hi")];
        let rendered = default_template(&SummaryInput {
            messages: &messages,
            previous_summary: "",
        })
        .unwrap();
        assert!(rendered.contains("PREVIOUS SUMMARY: \"\""));
        assert!(rendered.contains("user: \"say \\\"hi\\\"\""));
        assert!(rendered.contains("assistant: \"hi\""));
        assert!(rendered.contains("NEW LINES:\n\nuser: "));
        assert!(rendered.contains("\"hi\"\nEND NEW LINES"));

        let carried = default_template(&SummaryInput {
            messages: &[],
            previous_summary: "they asked for \"tea\"\nthen left",
        })
        .unwrap();
        assert!(carried.contains(r#"PREVIOUS SUMMARY: "they asked for \"tea\"\nthen left""#));
    }

    #[tokio::test]
    async fn nothing_dropped_returns_input_unchanged() {
        let client = ScriptedClient::new(Vec::<String>::new());
        let messages = vec![Message::system("rules"), Message::user("hi")];
        let memory = SummarizerMemory::new(100, char_len, vec![]);

        let out = memory
            .apply(&CancellationToken::new(), &config_with(client.clone()), &messages)
            .await
            .unwrap();
        assert_eq!(out, messages);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn dropped_messages_are_summarized_into_a_system_message() {
        let client = ScriptedClient::new(["user greeted twice"]);
        let messages = vec![
            Message::system("rules"),
            Message::user("hello there"),
            Message::assistant("hi"),
            Message::user("ok"),
        ];
        // rules(5) + ok(2) + hi(2) = 9; "hello there" does not fit
        let memory = SummarizerMemory::new(9, char_len, vec![]);

        let out = memory
            .apply(&CancellationToken::new(), &config_with(client.clone()), &messages)
            .await
            .unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(parse_summary(&out[0].content).unwrap(), "user greeted twice");
        assert_eq!(
            out[1..],
            [messages[0].clone(), messages[2].clone(), messages[3].clone()]
        );
        assert_retention_invariants(&messages, &out[1..]);

        // The sub-agent inherits the model, drops streaming and caps its output
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.model, "gpt-4");
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.max_tokens, Some(1000));
        assert!(!req.stream);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert!(req.messages[0].content.contains("\"hello there\""));
    }

    #[tokio::test]
    async fn previous_summary_is_folded_in_and_replaced() {
        let client = ScriptedClient::new(["second summary"]);
        let old = Message::system(summary_message("first summary").unwrap());
        let messages = vec![
            old.clone(),
            Message::user("a long question that will not fit"),
            Message::assistant("yes"),
        ];
        let memory = SummarizerMemory::new(old.content.len() + 5, char_len, vec![])
            .with_summary_max_tokens(50);

        let out = memory
            .apply(&CancellationToken::new(), &config_with(client.clone()), &messages)
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(parse_summary(&out[0].content).unwrap(), "second summary");
        assert_eq!(out[1], messages[2]);

        let req = &client.requests()[0];
        assert_eq!(req.max_tokens, Some(50));
        assert!(req.messages[0].content.contains("PREVIOUS SUMMARY: \"first summary\""));
    }

    #[tokio::test]
    async fn plain_leading_system_prompt_is_kept() {
        let client = ScriptedClient::new(["s"]);
        let messages = vec![
            Message::system("You are terse."),
            Message::user("this one gets dropped"),
            Message::user("kept"),
        ];
        let memory = SummarizerMemory::new(20, char_len, vec![]);

        let out = memory
            .apply(&CancellationToken::new(), &config_with(client), &messages)
            .await
            .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[1], messages[0]);
        assert_eq!(out[2], messages[2]);
    }

    #[tokio::test]
    async fn custom_template_and_options() {
        let client = ScriptedClient::new(["s"]);
        let messages = vec![Message::user("dropped message"), Message::user("kept")];
        let memory = SummarizerMemory::new(4, char_len, vec![AgentOption::Model("cheap".into())])
            .with_template(|input| Ok(format!("{} dropped", input.messages.len())));

        memory
            .apply(&CancellationToken::new(), &config_with(client.clone()), &messages)
            .await
            .unwrap();

        let req = &client.requests()[0];
        assert_eq!(req.model, "cheap");
        assert_eq!(req.messages[0].content, "1 dropped");
    }

    #[tokio::test]
    async fn summarizer_failure_is_fatal() {
        let client = ScriptedClient::new(Vec::<String>::new());
        let messages = vec![Message::user("dropped message"), Message::user("kept")];
        let memory = SummarizerMemory::new(4, char_len, vec![]);

        let err = memory
            .apply(&CancellationToken::new(), &config_with(client), &messages)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::ApiError { .. })));
    }
}
