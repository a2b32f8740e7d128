//! ReAct pattern: Thought → Action → Observation loop.
//!
//! The model answers in tagged entries (see [`entry`]). Each turn is parsed and
//! checked before anything happens:
//!
//! - an `Action` must be the last entry of the turn
//! - the model may never write its own `Observation`
//!
//! A turn breaking either rule is answered with a correction and discarded.
//! Otherwise the last entry decides what comes next: `Final Answer` ends the
//! loop, `Action` runs a tool and feeds back `Observation: <result>`, anything
//! else gets a nudge to continue.

pub mod entry;
pub mod prompt;

pub use entry::{Entry, Tag, parse};
pub use prompt::{PromptRenderer, default_system_prompt};

use agentry_core::error::{Error, Result};
use agentry_core::event::DomainEvent;
use agentry_core::event::EventBus;
use agentry_core::tool::{Tool, Toolbox};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::options::AgentOption;

const CONTINUE: &str = "Please continue.";

/// Protocol rules a model turn broke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Violation {
    pub action_not_last: bool,
    pub observation_output: bool,
}

impl Violation {
    /// Check one turn's entries. `None` means the turn is acceptable.
    pub fn check(entries: &[Entry]) -> Option<Self> {
        let mut violation = Self::default();
        for (i, entry) in entries.iter().enumerate() {
            if entry.tag == Tag::Action && i + 1 != entries.len() {
                violation.action_not_last = true;
            } else if entry.tag == Tag::Observation {
                violation.observation_output = true;
            }
        }
        (violation.action_not_last || violation.observation_output).then_some(violation)
    }

    /// The correction sent back to the model.
    pub fn correction(&self) -> String {
        let mut text = String::new();
        if self.action_not_last {
            text.push_str("Please provide an Action as the last entry!");
        }
        if self.observation_output {
            text.push_str(" You are not allowed to provide your own observations!");
        }
        text.trim().to_string()
    }
}

/// Outcome of [`ReAct::answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactResult {
    /// Content of the `Final Answer` entry.
    pub answer: String,
    /// Every accepted entry, in order.
    pub entries: Vec<Entry>,
    /// Model turns taken, rejected ones included.
    pub iterations: usize,
    pub tool_calls_made: usize,
}

pub struct ReAct<A> {
    agent: A,
    toolbox: Toolbox,
    prompt: PromptRenderer,
    initialized: bool,
    max_iterations: Option<u32>,
    events: Option<Arc<EventBus>>,
}

impl<A: Agent> ReAct<A> {
    pub fn new(agent: A, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        Self {
            agent,
            toolbox: Toolbox::new(tools),
            prompt: Arc::new(default_system_prompt),
            initialized: false,
            max_iterations: None,
            events: None,
        }
    }

    /// Replace the system prompt.
    pub fn with_prompt(mut self, render: impl Fn(&Toolbox) -> String + Send + Sync + 'static) -> Self {
        self.prompt = Arc::new(render);
        self
    }

    /// Fail with [`Error::IterationLimit`] after `max` model turns in one
    /// `answer` call. Unbounded by default.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Ask `question` and drive the loop until the model gives a final answer.
    ///
    /// `options` apply to every model call made for this question. Any error
    /// ends the call; the conversation keeps what was exchanged up to that point.
    pub async fn answer(
        &mut self,
        cancel: &CancellationToken,
        question: &str,
        options: Vec<AgentOption>,
    ) -> Result<ReactResult> {
        if !self.initialized {
            let prompt = (self.prompt)(&self.toolbox);
            self.agent.system(&prompt, None)?;
            self.initialized = true;
        }
        self.agent.system(&format!("Question: {question}"), None)?;

        info!(
            agent = %self.agent.name(),
            tools = self.toolbox.len(),
            max_iterations = ?self.max_iterations,
            "ReAct loop starting"
        );

        let mut entries: Vec<Entry> = Vec::new();
        let mut iterations = 0usize;
        let mut tool_calls_made = 0usize;

        loop {
            if let Some(max) = self.max_iterations
                && iterations >= max as usize
            {
                warn!(max, "ReAct loop hit its iteration limit");
                return Err(Error::IterationLimit(max));
            }
            iterations += 1;

            let reply = self.agent.respond(cancel, options.clone()).await?;
            let turn = parse(&reply)?;
            debug!(iteration = iterations, entries = turn.len(), "Parsed model turn");

            if let Some(violation) = Violation::check(&turn) {
                warn!(
                    action_not_last = violation.action_not_last,
                    observation_output = violation.observation_output,
                    "Model broke the protocol, asking it to correct"
                );
                self.publish(DomainEvent::ProtocolViolation {
                    action_not_last: violation.action_not_last,
                    observation_output: violation.observation_output,
                    timestamp: Utc::now(),
                });
                self.agent.listen(&violation.correction(), None)?;
                continue;
            }

            let last = turn.last().cloned();
            entries.extend(turn);

            match last {
                Some(entry) if entry.tag == Tag::FinalAnswer => {
                    info!(iterations, tool_calls = tool_calls_made, "ReAct loop finished");
                    self.publish(DomainEvent::AnswerCompleted {
                        iterations,
                        tool_calls: tool_calls_made,
                        timestamp: Utc::now(),
                    });
                    return Ok(ReactResult {
                        answer: entry.content,
                        entries,
                        iterations,
                        tool_calls_made,
                    });
                }
                Some(entry) if entry.tag == Tag::Action => {
                    let observation = self.dispatch(cancel, &entry).await?;
                    tool_calls_made += 1;
                    self.agent.listen(&format!("Observation: {observation}"), None)?;
                }
                _ => {
                    self.agent.listen(CONTINUE, None)?;
                }
            }
        }
    }

    async fn dispatch(&self, cancel: &CancellationToken, action: &Entry) -> Result<String> {
        let started = Instant::now();
        debug!(tool = %action.argument, "Dispatching action");
        let result = self
            .toolbox
            .work(cancel, &action.argument, &action.content)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.publish(DomainEvent::ToolExecuted {
            tool_name: action.argument.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });
        if let Err(e) = &result {
            warn!(tool = %action.argument, error = %e, "Tool failed");
        }
        result
    }
}

impl<A: Agent> std::fmt::Debug for ReAct<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReAct")
            .field("agent", &self.agent.name())
            .field("toolbox", &self.toolbox)
            .field("initialized", &self.initialized)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::BaseAgent;
    use crate::test_helpers::{BrokenTool, EchoTool, ScriptedClient};
    use agentry_core::error::ToolError;
    use agentry_core::message::{Message, Role};

    fn reactor(client: Arc<ScriptedClient>) -> ReAct<BaseAgent> {
        let agent = BaseAgent::new("react", [AgentOption::Client(client)]);
        ReAct::new(
            agent,
            [Arc::new(EchoTool) as Arc<dyn Tool>, Arc::new(BrokenTool)],
        )
    }

    fn user_messages(agent: &BaseAgent) -> Vec<String> {
        agent
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .collect()
    }

    #[test]
    fn violations() {
        let ok = [Entry::new(Tag::Thought, "t"), Entry::action("echo", "x")];
        assert_eq!(Violation::check(&ok), None);

        let early = [Entry::action("echo", "x"), Entry::action("echo", "y")];
        let v = Violation::check(&early).unwrap();
        assert!(v.action_not_last && !v.observation_output);
        assert_eq!(v.correction(), "Please provide an Action as the last entry!");

        let observed = [Entry::new(Tag::Observation, "made up")];
        assert_eq!(
            Violation::check(&observed).unwrap().correction(),
            "You are not allowed to provide your own observations!"
        );

        let both = [Entry::action("echo", "x"), Entry::new(Tag::Observation, "o")];
        assert_eq!(
            Violation::check(&both).unwrap().correction(),
            "Please provide an Action as the last entry! You are not allowed to provide your own observations!"
        );
    }

    #[tokio::test]
    async fn tool_round_trip_then_final_answer() {
        let client = ScriptedClient::new([
            "Thought: I should echo.\nAction: echo\nhello",
            "Final Answer: it said hello",
        ]);
        let mut react = reactor(client.clone());

        let result = react
            .answer(&CancellationToken::new(), "What does echo say?", vec![])
            .await
            .unwrap();

        assert_eq!(result.answer, "it said hello");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls_made, 1);
        assert_eq!(
            result.entries,
            vec![
                Entry::new(Tag::Thought, "I should echo."),
                Entry::action("echo", "hello"),
                Entry::new(Tag::FinalAnswer, "it said hello"),
            ]
        );

        let messages = react.agent().messages();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("echo: Repeats its input."));
        assert_eq!(messages[1], Message::system("Question: What does echo say?"));
        assert_eq!(user_messages(react.agent()), vec!["Observation: echo: hello"]);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn early_action_is_corrected_without_dispatch() {
        let client = ScriptedClient::new([
            "Action: broken\nx\nAction: echo\ny",
            "Final Answer: done",
        ]);
        let mut react = reactor(client);

        let result = react
            .answer(&CancellationToken::new(), "q", vec![])
            .await
            .unwrap();

        // The broken tool would have failed the call had it been dispatched
        assert_eq!(result.tool_calls_made, 0);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.entries, vec![Entry::new(Tag::FinalAnswer, "done")]);
        assert_eq!(
            user_messages(react.agent()),
            vec!["Please provide an Action as the last entry!"]
        );
    }

    #[tokio::test]
    async fn non_action_turn_gets_a_nudge() {
        let client = ScriptedClient::new(["Thought: hmm", "Final Answer: 7"]);
        let mut react = reactor(client);

        let result = react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap();
        assert_eq!(result.answer, "7");
        assert_eq!(user_messages(react.agent()), vec!["Please continue."]);
    }

    #[tokio::test]
    async fn system_prompt_is_sent_once() {
        let client = ScriptedClient::new(["Final Answer: a", "Final Answer: b"]);
        let mut react = reactor(client);

        react.answer(&CancellationToken::new(), "first", vec![]).await.unwrap();
        react.answer(&CancellationToken::new(), "second", vec![]).await.unwrap();

        let systems: Vec<&str> = react
            .agent()
            .messages()
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(systems.len(), 3);
        assert_eq!(systems[1], "Question: first");
        assert_eq!(systems[2], "Question: second");
    }

    #[tokio::test]
    async fn unknown_tool_is_fatal() {
        let client = ScriptedClient::new(["Action: telnet\nopen"]);
        let mut react = reactor(client);
        let err = react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(name) if name == "telnet"));
    }

    #[tokio::test]
    async fn tool_errors_propagate() {
        let client = ScriptedClient::new(["Action: broken\nx"]);
        let mut react = reactor(client);
        let err = react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn parse_errors_propagate() {
        let client = ScriptedClient::new(["no tags here"]);
        let mut react = reactor(client);
        let err = react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn iteration_limit() {
        let client = ScriptedClient::new(["Thought: a", "Thought: b", "Thought: c"]);
        let mut react = reactor(client.clone()).with_max_iterations(2);
        let err = react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::IterationLimit(2)));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn options_apply_to_every_turn() {
        let client = ScriptedClient::new(["Action: echo\nx", "Final Answer: y"]);
        let mut react = reactor(client.clone());
        react
            .answer(
                &CancellationToken::new(),
                "q",
                vec![AgentOption::Stop(vec!["Observation:".into()])],
            )
            .await
            .unwrap();
        for request in client.requests() {
            assert_eq!(request.stop, vec!["Observation:".to_string()]);
        }
    }

    #[tokio::test]
    async fn events_trace_the_loop() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let client = ScriptedClient::new([
            "Observation: invented",
            "Action: echo\nhi",
            "Final Answer: ok",
        ]);
        let mut react = reactor(client).with_events(bus);
        react.answer(&CancellationToken::new(), "q", vec![]).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::ProtocolViolation { observation_output, .. } => {
                    assert!(*observation_output);
                    seen.push("violation");
                }
                DomainEvent::ToolExecuted { tool_name, success, .. } => {
                    assert_eq!(tool_name, "echo");
                    assert!(*success);
                    seen.push("tool");
                }
                DomainEvent::AnswerCompleted { iterations, tool_calls, .. } => {
                    assert_eq!((*iterations, *tool_calls), (3, 1));
                    seen.push("done");
                }
                _ => {}
            }
        }
        assert_eq!(seen, vec!["violation", "tool", "done"]);
    }

    #[test]
    fn custom_prompt() {
        let react = ReAct::new(BaseAgent::new("r", []), []).with_prompt(|tools| {
            format!("{} tools", tools.len())
        });
        assert_eq!((react.prompt)(react.toolbox()), "0 tools");
    }
}
